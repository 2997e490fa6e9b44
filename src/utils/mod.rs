pub mod config_watcher;
pub mod logging;

pub use config_watcher::*;
pub use logging::*;

/// 从 Host 头解析端口
///
/// Host 未携带端口时按 scheme 取默认端口。
pub fn parse_port_from_host(host: &str, scheme: &str) -> Option<u16> {
    let (_, port) = host.split_once(':').unwrap_or((host, ""));
    if port.is_empty() {
        match scheme {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        }
    } else {
        port.parse().ok()
    }
}
