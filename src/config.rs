use std::fs;

use serde::Deserialize;

use crate::{
    consts::{
        bucket_prefix_default, fallback_path_default, log_folder_default, log_level_default,
        origin_timeout_default, process_timeout,
    },
    error::Result,
    http::bypass::BypassRule,
};

/// 监听地址配置
#[derive(Deserialize, Clone, Debug)]
pub struct SettingServer {
    pub ip: String,
    pub port: u16,
    /// Whole-request timeout in seconds
    #[serde(default = "process_timeout")]
    pub timeout: u16,
}

/// 源站配置
///
/// 缓存未命中以及所有直通请求都会转发到这里。
#[derive(Deserialize, Clone, Debug)]
pub struct SettingOrigin {
    /// Base url of the origin server, e.g. `http://127.0.0.1:8000`
    pub url: String,
    /// Per-request timeout in seconds
    #[serde(default = "origin_timeout_default")]
    pub timeout: u16,
}

/// 缓存代理配置
///
/// `version` 是唯一受支持的整体失效机制：改动它会让 install 写入一个
/// 新的 bucket，activate 时清除所有旧的 bucket。
#[derive(Deserialize, Clone, Debug)]
pub struct SettingAgent {
    /// Cache generation, e.g. `v3`
    pub version: String,
    #[serde(default = "bucket_prefix_default")]
    pub bucket_prefix: String,
    /// Root-relative paths precached at install time, in order
    #[serde(default)]
    pub precache: Vec<String>,
    /// Served from cache when a navigation fetch fails offline
    #[serde(default = "fallback_path_default")]
    pub fallback_path: String,
    /// Requests matching any rule always hit the network and are never cached
    #[serde(default = "default_bypass")]
    pub bypass: Vec<BypassRule>,
}

impl SettingAgent {
    /// 当前代所对应的 bucket 名称
    pub fn bucket_name(&self) -> String {
        format!("{}-{}", self.bucket_prefix, self.version)
    }
}

/// Live-API markers of the upstream app: the analysis endpoint and the
/// generic API prefix must always hit the network.
fn default_bypass() -> Vec<BypassRule> {
    vec![
        BypassRule::Substring {
            pattern: "/analyze".to_string(),
        },
        BypassRule::Prefix {
            pattern: "/api/".to_string(),
        },
    ]
}

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "log_folder_default")]
    pub log_folder: String,
    pub server: SettingServer,
    pub origin: SettingOrigin,
    pub agent: SettingAgent,
}

impl Settings {
    pub fn new(path: &str) -> Result<Settings> {
        let file = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&file)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[server]
ip = "127.0.0.1"
port = 8080

[origin]
url = "http://127.0.0.1:8000"

[agent]
version = "v1"
precache = ["/", "/static/css/style.css"]
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let settings: Settings = toml::from_str(MINIMAL).unwrap();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.server.timeout, 75);
        assert_eq!(settings.origin.timeout, 30);
        assert_eq!(settings.agent.fallback_path, "/");
        assert_eq!(settings.agent.bucket_name(), "squirrel-cache-v1");
        assert_eq!(settings.agent.precache.len(), 2);
    }

    #[test]
    fn default_bypass_covers_live_api_markers() {
        let settings: Settings = toml::from_str(MINIMAL).unwrap();
        let bypass = &settings.agent.bypass;
        assert!(bypass.iter().any(|r| r.matches("/analyze")));
        assert!(bypass.iter().any(|r| r.matches("/api/quotes")));
        assert!(!bypass.iter().any(|r| r.matches("/static/css/style.css")));
    }

    #[test]
    fn bypass_rules_from_toml() {
        let raw = format!(
            "{MINIMAL}\n{}",
            r#"
[[agent.bypass]]
kind = "regex"
pattern = "^/ws/.+$"
"#
        );
        let settings: Settings = toml::from_str(&raw).unwrap();
        assert!(settings.agent.bypass.iter().any(|r| r.matches("/ws/feed")));
        assert!(!settings.agent.bypass.iter().any(|r| r.matches("/ws/")));
    }

    #[test]
    fn version_bump_changes_bucket_name() {
        let mut settings: Settings = toml::from_str(MINIMAL).unwrap();
        let before = settings.agent.bucket_name();
        settings.agent.version = "v2".to_string();
        assert_ne!(before, settings.agent.bucket_name());
    }
}
