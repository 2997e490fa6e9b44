use std::{net::SocketAddr, sync::Arc, sync::LazyLock, time::Duration};

use axum::{Router, middleware, routing::any};
use axum_server::Handle;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info};

use crate::{
    config::Settings,
    http::{agent::CacheAgent, client::OriginClient},
    middlewares::{add_version, logging_route},
};

// 缓存 bucket 与响应
pub mod cache;
// 缓存代理生命周期
pub mod agent;
// 直通规则
pub mod bypass;
// 源站客户端
pub mod client;
pub mod error;
// 请求拦截入口
pub mod fetch;

/// 已注册的缓存代理
/// 使用监听端口作为键（0 为随机端口的回退键）
pub static AGENTS: LazyLock<DashMap<u16, Arc<CacheAgent>>> = LazyLock::new(DashMap::new);

/// 清除所有全局状态
///
/// 此函数主要用于测试场景，确保测试之间的隔离。
#[allow(dead_code)]
pub fn clear_global_state() {
    AGENTS.clear();
    cache::BUCKETS.clear();
}

/// 注册一个缓存代理并启动监听
///
/// 生命周期约定：install 失败是致命错误，直接向上传播；
/// activate 在 install 成功后同步执行，清除旧缓存代并接管拦截；
/// 服务器在两者都完成后才开始接受请求。
pub async fn make_server(
    settings: &Settings,
) -> anyhow::Result<(Handle<SocketAddr>, Arc<CacheAgent>)> {
    debug!("make_server start with settings: {:?}", settings);

    let origin = OriginClient::new(&settings.origin.url, settings.origin.timeout)?;
    let agent = Arc::new(CacheAgent::new(settings.agent.clone(), origin));

    if let Err(e) = agent.install().await {
        error!("agent install failed: {e:?}");
        return Err(e.into());
    }
    agent.activate();

    let handle = serve_agent(settings, agent.clone())?;
    Ok((handle, agent))
}

/// 注册 agent 并绑定监听地址
fn serve_agent(
    settings: &Settings,
    agent: Arc<CacheAgent>,
) -> anyhow::Result<Handle<SocketAddr>> {
    AGENTS.insert(settings.server.port, agent);

    let mut router = Router::new()
        .route("/", any(fetch::intercept))
        .route("/{*path}", any(fetch::intercept));

    router = router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(add_version))
            .layer(TimeoutLayer::new(Duration::from_secs(
                settings.server.timeout.into(),
            ))),
    );
    router = logging_route(router);

    let addr = format!("{}:{}", settings.server.ip, settings.server.port);
    let addr: SocketAddr = addr.parse()?;

    let handle = Handle::new();
    let handle_clone = handle.clone();

    // 生成一个任务来运行服务器
    tokio::spawn(async move {
        info!("Listening on http://{}", addr);
        if let Err(e) = axum_server::bind(addr)
            .handle(handle_clone)
            .serve(router.into_make_service())
            .await
        {
            error!("server error: {e}");
        }
    });

    Ok(handle)
}

/// 优雅关闭所有服务器
pub async fn shutdown_servers(handles: &mut Vec<Handle<SocketAddr>>) {
    for handle in handles.iter() {
        handle.graceful_shutdown(Some(Duration::from_secs(30)));
    }
    handles.clear();
    info!("All servers have been signaled to shut down");
}

/// 处理配置文件变更
///
/// 配置变更等价于注册一个新版本的 agent：重新走 install / activate
/// 并重启服务器。版本号变了的话，activate 会顺带清掉上一代的 bucket。
///
/// 新 agent 的 install 在旧 agent 下线之前执行。install 失败时
/// 旧的注册保持原样继续服务，和新 worker 安装失败不影响在控
/// worker 的语义一致。
pub async fn handle_config_change(
    result: crate::error::Result<Settings>,
    handles: Arc<Mutex<Vec<Handle<SocketAddr>>>>,
) {
    match result {
        Ok(new_settings) => {
            info!("Config file reloaded, re-registering cache agent...");

            let origin =
                match OriginClient::new(&new_settings.origin.url, new_settings.origin.timeout) {
                    Ok(origin) => origin,
                    Err(e) => {
                        error!("Origin client rebuild failed, keeping current agent: {e:?}");
                        return;
                    }
                };
            let agent = Arc::new(CacheAgent::new(new_settings.agent.clone(), origin));
            if let Err(e) = agent.install().await {
                error!("New agent install failed, keeping current agent: {e:?}");
                return;
            }

            // 新的一代安装成功，才允许旧 agent 下线
            let mut current_handles = handles.lock().await;
            shutdown_servers(&mut current_handles).await;
            AGENTS.clear();
            agent.activate();

            match serve_agent(&new_settings, agent.clone()) {
                Ok(handle) => {
                    current_handles.push(handle);
                    info!(
                        "agent re-registered, current bucket {}",
                        agent.bucket_name()
                    );
                }
                Err(e) => {
                    error!("Failed to restart server: {e:?}");
                }
            }
        }
        Err(e) => {
            error!("Failed to reload config file: {e:?}");
        }
    }
}
