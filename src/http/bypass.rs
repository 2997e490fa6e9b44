use regex::Regex;
use serde::{Deserialize, Deserializer};

/// 直通规则
///
/// 命中任意一条规则的请求永远走网络，既不会从缓存读取，
/// 也不会写入缓存。规则在配置文件中以 `kind` + `pattern` 描述。
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BypassRule {
    /// Matches when the request path starts with the pattern
    Prefix { pattern: String },
    /// Matches when the pattern occurs anywhere in the request path
    Substring { pattern: String },
    /// Matches when the compiled regex matches the request path
    Regex {
        #[serde(deserialize_with = "deserialize_regex")]
        pattern: Regex,
    },
}

impl BypassRule {
    /// Check a request path (with query) against this rule
    pub fn matches(&self, target: &str) -> bool {
        match self {
            BypassRule::Prefix { pattern } => target.starts_with(pattern.as_str()),
            BypassRule::Substring { pattern } => target.contains(pattern.as_str()),
            BypassRule::Regex { pattern } => pattern.is_match(target),
        }
    }
}

/// 在反序列化阶段编译正则，配置错误在启动时就会暴露
fn deserialize_regex<'de, D>(deserializer: D) -> Result<Regex, D::Error>
where
    D: Deserializer<'de>,
{
    let pattern = String::deserialize(deserializer)?;
    Regex::new(&pattern).map_err(serde::de::Error::custom)
}
