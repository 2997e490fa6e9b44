//! Squirrel 离线缓存代理库
//! 用于导出公共 API 和类型，供集成测试和外部 crate 使用

pub mod cli;
pub mod config;
pub mod consts;
pub mod error;
pub mod http;
pub mod middlewares;
pub mod utils;
