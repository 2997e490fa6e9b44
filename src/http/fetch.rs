use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::{
    http::{
        AGENTS,
        error::{RouteError, RouteResult},
    },
    utils::parse_port_from_host,
};

/// 拦截所有进入代理的请求
///
/// 通过 Host 头解析端口，找到该端口上注册的 agent 并交给它处理。
/// 端口 0 是测试场景下随机端口的注册键，找不到精确端口时回退。
pub async fn intercept(request: Request<Body>) -> RouteResult<impl IntoResponse> {
    let scheme = request.uri().scheme_str().unwrap_or("http");
    let host = request
        .headers()
        .get("host") // 注意：host 是小写的
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let port = parse_port_from_host(host, scheme).ok_or(RouteError::BadRequest())?;
    debug!("intercept {} {} on port {port}", request.method(), request.uri());

    let agent = {
        let mut port_to_use = port;
        if !AGENTS.contains_key(&port_to_use) {
            port_to_use = 0;
        }
        AGENTS
            .get(&port_to_use)
            .ok_or(RouteError::AgentNotFound())?
            .clone()
    };

    let response: Response<Body> = agent.handle_fetch(request).await?;
    Ok(response)
}
