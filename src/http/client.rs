use std::time::Duration;

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http::{
    HeaderMap, Method, StatusCode,
    header::{CONNECTION, HOST, TE, TRAILER, TRANSFER_ENCODING, UPGRADE},
};
use reqwest::{Client, redirect::Policy};

use crate::{error::Result, http::cache::CachedResponse};

/// 源站客户端
///
/// 持有一个复用连接池的 reqwest 客户端。作为代理不跟随重定向，
/// 3xx 响应原样返回给调用方（并且不会被缓存）。
#[derive(Debug, Clone)]
pub struct OriginClient {
    base: String,
    client: Client,
}

impl OriginClient {
    pub fn new(url: &str, timeout: u16) -> Result<Self> {
        let base = url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout.into()))
            .redirect(Policy::none())
            .build()?;
        Ok(Self { base, client })
    }

    /// GET 一个源站路径，install 阶段预缓存使用
    pub async fn get(&self, path: &str) -> Result<OriginResponse> {
        let url = format!("{}{}", self.base, path);
        let response = self.client.get(&url).send().await?;
        OriginResponse::read(response).await
    }

    /// 将拦截到的请求原样转发到源站
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        mut headers: HeaderMap,
        body: Bytes,
    ) -> Result<OriginResponse> {
        let url = format!("{}{}", self.base, path_and_query);
        strip_hop_headers(&mut headers);
        // reqwest 会根据目标 url 重新生成 Host
        headers.remove(HOST);

        let mut request = self.client.request(method, &url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }
        let response = request.send().await?;
        OriginResponse::read(response).await
    }
}

/// 已读取完整 body 的源站响应
///
/// body 使用 `Bytes`，克隆是廉价的引用计数拷贝，这正是
/// “复制一份写缓存、原样返回给调用方”所需要的语义。
#[derive(Debug)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OriginResponse {
    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_headers(&mut headers);
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// 复制出一份可写入缓存的响应
    pub fn to_cached(&self) -> CachedResponse {
        CachedResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

impl IntoResponse for OriginResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// 去掉逐跳头，它们只对单条连接有效，不应该被转发或缓存
fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [CONNECTION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-authenticate");
    headers.remove("proxy-authorization");
}
