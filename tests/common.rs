//! 集成测试的公共辅助函数和工具
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tempfile::TempDir;

use squirrel::config::Settings;
use squirrel::http;
use squirrel::http::agent::CacheAgent;

pub const HOME_BODY: &str = "<html><body>signals home</body></html>";

/// 每个路径被源站实际处理的次数
#[derive(Clone, Default)]
pub struct OriginHits(pub Arc<DashMap<String, usize>>);

impl OriginHits {
    pub fn get(&self, path: &str) -> usize {
        self.0.get(path).map(|count| *count).unwrap_or(0)
    }
}

async fn origin_handler(State(hits): State<OriginHits>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    *hits.0.entry(path.clone()).or_insert(0) += 1;

    match path.as_str() {
        "/" => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            HOME_BODY,
        )
            .into_response(),
        "/static/css/style.css" => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/css")],
            "body { margin: 0 }",
        )
            .into_response(),
        "/missing.css" => StatusCode::NOT_FOUND.into_response(),
        "/redirect" => (StatusCode::FOUND, [(header::LOCATION, "/")], "").into_response(),
        _ => (StatusCode::OK, format!("origin:{path}")).into_response(),
    }
}

/// 启动测试源站，返回地址、请求计数和关闭句柄
pub async fn start_origin() -> Result<(SocketAddr, OriginHits, axum_server::Handle<SocketAddr>)> {
    let hits = OriginHits::default();
    let app = Router::new()
        .fallback(origin_handler)
        .with_state(hits.clone());

    let handle = axum_server::Handle::new();
    let handle_clone = handle.clone();
    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    tokio::spawn(async move {
        axum_server::bind(addr)
            .handle(handle_clone)
            .serve(app.into_make_service())
            .await
            .expect("origin server failed");
    });

    let addr = handle.listening().await.expect("origin not listening");
    Ok((addr, hits, handle))
}

/// 测试代理配置
#[derive(Debug)]
pub struct TestAgentConfig {
    pub version: String,
    pub precache: Vec<String>,
    /// (kind, pattern)，为空时使用默认直通规则
    pub bypass: Vec<(String, String)>,
}

impl Default for TestAgentConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            precache: vec!["/".to_string(), "/static/css/style.css".to_string()],
            bypass: Vec::new(),
        }
    }
}

/// 创建临时配置文件用于测试
pub fn create_temp_config(origin: SocketAddr, config: &TestAgentConfig) -> Result<PathBuf> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("config.toml");

    // 使 temp_dir 不被自动删除（leak）
    let _ = Box::leak(Box::new(temp_dir));

    write_config(&config_path, origin, config)?;
    Ok(config_path)
}

/// 覆写已存在的配置文件，用于模拟配置变更
pub fn write_config(
    config_path: &std::path::Path,
    origin: SocketAddr,
    config: &TestAgentConfig,
) -> Result<()> {
    let log_folder = config_path
        .parent()
        .expect("config has no parent dir")
        .join("logs");

    let mut content = String::new();
    content.push_str("log_level = \"debug\"\n");
    content.push_str(&format!(
        "log_folder = {:?}\n",
        log_folder.to_str().expect("Invalid path")
    ));
    content.push_str("\n[server]\nip = \"127.0.0.1\"\nport = 0\n");
    content.push_str(&format!("\n[origin]\nurl = \"http://{origin}\"\ntimeout = 5\n"));
    content.push_str(&format!("\n[agent]\nversion = \"{}\"\n", config.version));
    content.push_str(&format!("precache = {:?}\n", config.precache));
    for (kind, pattern) in &config.bypass {
        content.push_str(&format!(
            "\n[[agent.bypass]]\nkind = \"{kind}\"\npattern = \"{pattern}\"\n"
        ));
    }

    std::fs::write(config_path, content)?;
    Ok(())
}

/// 启动测试代理
pub async fn start_agent(
    config_path: &PathBuf,
) -> Result<(axum_server::Handle<SocketAddr>, SocketAddr, Arc<CacheAgent>)> {
    let settings = Settings::new(config_path.to_str().expect("Invalid path"))?;
    let (handle, agent) = http::make_server(&settings).await?;
    let addr = handle.listening().await.expect("agent not listening");
    Ok((handle, addr, agent))
}

/// 测试客户端不跟随重定向，3xx 原样返回便于断言
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("build test client")
}

pub async fn get(addr: SocketAddr, path: &str) -> Result<reqwest::Response> {
    client()
        .get(format!("http://{addr}{path}"))
        .send()
        .await
        .map_err(Into::into)
}

/// 模拟浏览器整页导航
pub async fn navigate(addr: SocketAddr, path: &str) -> Result<reqwest::Response> {
    client()
        .get(format!("http://{addr}{path}"))
        .header("sec-fetch-mode", "navigate")
        .send()
        .await
        .map_err(Into::into)
}

/// 等待异步缓存写入完成
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}
