use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, anyhow};
use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use http::{HeaderMap, Method, StatusCode};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{
    config::SettingAgent,
    error::Result,
    http::{
        cache,
        client::OriginClient,
        error::{RouteError, RouteResult},
    },
};

/// 缓存代理
///
/// 对应 service worker 的一次注册：install 预缓存静态资源，
/// activate 清除旧的缓存代，之后按 cache-first 策略拦截请求。
/// 生命周期严格有序：install 成功后才会 activate，activate 之前
/// 拦截到的请求全部直通源站。
pub struct CacheAgent {
    settings: SettingAgent,
    bucket_name: String,
    origin: OriginClient,
    /// waitUntil 的等价物：异步缓存写入都挂在这里，
    /// 优雅退出时等它清空，避免写到一半被回收
    tracker: TaskTracker,
    claimed: AtomicBool,
}

impl CacheAgent {
    pub fn new(settings: SettingAgent, origin: OriginClient) -> Self {
        let bucket_name = settings.bucket_name();
        Self {
            settings,
            bucket_name,
            origin,
            tracker: TaskTracker::new(),
            claimed: AtomicBool::new(false),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// 是否已接管请求拦截
    pub fn is_controlling(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Install：创建当前代 bucket，按序预缓存静态资源列表
    ///
    /// 任何一个资源拉取失败（网络错误或非 200）都会让整个 install
    /// 失败。错误由调用方记录，不做重试。
    pub async fn install(&self) -> Result<()> {
        cache::open_bucket(&self.bucket_name);

        for path in &self.settings.precache {
            let response = self
                .origin
                .get(path)
                .await
                .with_context(|| format!("precache fetch failed: {path}"))?;
            if response.status != StatusCode::OK {
                return Err(anyhow!(
                    "precache fetch for {path} returned {}",
                    response.status
                )
                .into());
            }
            cache::insert(&self.bucket_name, path.clone(), response.to_cached());
            debug!("precached {path}");
        }

        info!(
            "install complete: {} assets in bucket {}",
            self.settings.precache.len(),
            self.bucket_name
        );
        Ok(())
    }

    /// Activate：清除所有过期的缓存代并接管请求拦截
    pub fn activate(&self) {
        let stale = cache::purge_stale(&self.bucket_name);
        for name in &stale {
            info!("purged stale cache bucket {name}");
        }
        self.claimed.store(true, Ordering::Release);
        info!("agent activated, controlling bucket {}", self.bucket_name);
    }

    /// 请求拦截
    ///
    /// - 非 GET、命中直通规则、或尚未 activate 的请求：原样转发
    /// - 其余 GET：cache-first；未命中则走网络，200 的响应复制一份
    ///   异步写入缓存后返回原响应
    /// - 网络失败：导航请求回退到缓存中的 fallback 路径，否则返回网关错误
    pub async fn handle_fetch(&self, request: Request<Body>) -> RouteResult<Response<Body>> {
        let method = request.method().clone();
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let navigation = is_navigation(request.headers());
        let headers = request.headers().clone();
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| anyhow!("read request body failed: {e}"))?;

        if !self.is_controlling() || method != Method::GET || self.is_bypass(&path_and_query) {
            debug!("pass through {method} {path_and_query}");
            let response = self
                .origin
                .forward(method, &path_and_query, headers, body)
                .await
                .map_err(|e| {
                    error!("pass-through fetch failed: {e}");
                    RouteError::BadGateway()
                })?;
            return Ok(response.into_response());
        }

        // cache-first：命中则直接返回，不访问网络，也不做新鲜度检查
        if let Some(hit) = cache::lookup(&self.bucket_name, &path_and_query) {
            debug!("cache hit {path_and_query}");
            return Ok(hit.into_response());
        }

        match self
            .origin
            .forward(method, &path_and_query, headers, body)
            .await
        {
            Ok(response) => {
                // 只缓存 200，错误页和重定向原样返回不落缓存
                if response.status == StatusCode::OK {
                    let copy = response.to_cached();
                    let bucket_name = self.bucket_name.clone();
                    let key = path_and_query.clone();
                    self.tracker.spawn(async move {
                        if !cache::insert(&bucket_name, key, copy) {
                            warn!("cache write skipped, bucket {bucket_name} is gone");
                        }
                    });
                }
                Ok(response.into_response())
            }
            Err(err) => {
                if navigation
                    && let Some(fallback) =
                        cache::lookup(&self.bucket_name, &self.settings.fallback_path)
                {
                    warn!(
                        "origin unreachable, serving cached {} for navigation: {err}",
                        self.settings.fallback_path
                    );
                    return Ok(fallback.into_response());
                }
                error!("origin fetch failed: {err}");
                Err(RouteError::BadGateway())
            }
        }
    }

    fn is_bypass(&self, path_and_query: &str) -> bool {
        self.settings
            .bypass
            .iter()
            .any(|rule| rule.matches(path_and_query))
    }

    /// 等待所有在途的缓存写入完成，只在进程退出时调用
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// 判断是否为整页导航请求
///
/// 浏览器加载 HTML 文档时会带上 `Sec-Fetch-Mode: navigate`，
/// 这是 request.mode == "navigate" 在 HTTP 层的对应物。
pub fn is_navigation(headers: &HeaderMap) -> bool {
    headers
        .get("sec-fetch-mode")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|mode| mode == "navigate")
}
