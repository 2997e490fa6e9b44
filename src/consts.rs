use std::env;

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMPILER: &str = env!("SQ_COMPILER");
pub const OS: &str = env::consts::OS;
pub const ARCH: &str = env::consts::ARCH;

// config defaults
pub const LOG_LEVEL_DEFAULT: &str = "info";
pub fn log_level_default() -> String {
    LOG_LEVEL_DEFAULT.to_string()
}

pub const LOG_FOLDER_DEFAULT: &str = "./logs";
pub fn log_folder_default() -> String {
    LOG_FOLDER_DEFAULT.to_string()
}

/// Cache bucket names are `{prefix}-{version}`
pub const BUCKET_PREFIX_DEFAULT: &str = "squirrel-cache";
pub fn bucket_prefix_default() -> String {
    BUCKET_PREFIX_DEFAULT.to_string()
}

/// Served when a navigation fetch fails offline
pub const FALLBACK_PATH_DEFAULT: &str = "/";
pub fn fallback_path_default() -> String {
    FALLBACK_PATH_DEFAULT.to_string()
}

pub const ORIGIN_TIMEOUT_DEFAULT: u16 = 30;
pub fn origin_timeout_default() -> u16 {
    ORIGIN_TIMEOUT_DEFAULT
}

pub const PROCESS_TIMEOUT: u16 = 75;
pub fn process_timeout() -> u16 {
    PROCESS_TIMEOUT
}
