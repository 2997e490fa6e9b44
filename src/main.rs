use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::{
    config::Settings,
    consts::{ARCH, COMPILER, NAME, OS, VERSION},
    utils::{init_logger, start_config_watcher},
};

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod cli;
mod config;
mod consts;
mod error;
mod http;
mod middlewares;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let settings = Settings::new(&args.config).with_context(|| "init config failed")?;

    let _guard = init_logger(settings.log_level.as_str(), settings.log_folder.as_str())
        .with_context(|| "init logger failed")?;

    debug!("settings {:?}", settings);
    info!("{}/{}", NAME, VERSION);
    info!("{}", COMPILER);
    info!("OS: {} {}", OS, ARCH);

    // install -> activate -> 开始拦截
    let (handle, _agent) = http::make_server(&settings).await?;
    let handles = Arc::new(Mutex::new(vec![handle]));

    // 启动配置文件监听，配置变更等价于注册新版本的 agent
    let rt = tokio::runtime::Handle::current();
    let handles_clone = handles.clone();
    let config_path = args.config.clone();
    let stop_tx = start_config_watcher(&args.config, move || {
        let result = Settings::new(&config_path);
        rt.spawn(http::handle_config_change(result, handles_clone.clone()));
    })?;

    info!("Agent started");

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    let mut current_handles = handles.lock().await;
    http::shutdown_servers(&mut current_handles).await;
    drop(current_handles);

    let _ = stop_tx
        .send(())
        .map_err(|err| error!("Send stop_tx failed: {:?}", err));

    // 等待在途的缓存写入完成再退出
    let agents = http::AGENTS
        .iter()
        .map(|entry| entry.value().clone())
        .collect::<Vec<_>>();
    for agent in agents {
        agent.drain().await;
    }

    Ok(())
}
