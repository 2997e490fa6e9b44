use std::sync::LazyLock;

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, StatusCode};

/// 全局 bucket 注册表
///
/// 键是 bucket 名称（`{prefix}-{version}`），同一时刻只有一个名称是
/// 当前代，其余均视为过期，在 activate 阶段被清除。
pub static BUCKETS: LazyLock<DashMap<String, Bucket>> = LazyLock::new(DashMap::new);

/// 缓存的响应
///
/// 只保存 GET 请求的 status / headers / body，键是请求的 path + query。
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// 一个版本化的缓存 bucket
#[derive(Debug, Default)]
pub struct Bucket {
    entries: DashMap<String, CachedResponse>,
}

impl Bucket {
    pub fn insert(&self, key: String, response: CachedResponse) {
        self.entries.insert(key, response);
    }

    pub fn lookup(&self, key: &str) -> Option<CachedResponse> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 打开（不存在则创建）指定名称的 bucket
pub fn open_bucket(name: &str) {
    BUCKETS.entry(name.to_string()).or_default();
}

/// 向指定 bucket 写入一条缓存
///
/// bucket 不存在时返回 false（例如写入任务完成前发生了版本切换）。
pub fn insert(bucket_name: &str, key: String, response: CachedResponse) -> bool {
    match BUCKETS.get(bucket_name) {
        Some(bucket) => {
            bucket.insert(key, response);
            true
        }
        None => false,
    }
}

/// 从指定 bucket 查找缓存
pub fn lookup(bucket_name: &str, key: &str) -> Option<CachedResponse> {
    BUCKETS.get(bucket_name).and_then(|bucket| bucket.lookup(key))
}

pub fn contains(bucket_name: &str, key: &str) -> bool {
    BUCKETS
        .get(bucket_name)
        .is_some_and(|bucket| bucket.contains(key))
}

/// 清除除 `keep` 之外的所有 bucket，返回被清除的名称
pub fn purge_stale(keep: &str) -> Vec<String> {
    let stale = BUCKETS
        .iter()
        .map(|entry| entry.key().clone())
        .filter(|name| name != keep)
        .collect::<Vec<_>>();
    for name in &stale {
        BUCKETS.remove(name);
    }
    stale
}
