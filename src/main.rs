use std::fs::File;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use recomd::{application::Application, cli::Cli, config::ConfigManager};

const DAEMON_LOG: &str = "/var/tmp/recomd.log";

fn init_syslog() -> Result<()> {
    let logger = syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "recomd".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))?;

    log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
        .map(|()| log::set_max_level(LevelFilter::Info))
        .map_err(|e| anyhow!("{e}"))
}

fn init_env_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn into_daemon() -> Result<()> {
    let stdout = File::create(DAEMON_LOG).with_context(|| format!("Cannot create {DAEMON_LOG}"))?;
    let stderr = stdout.try_clone()?;
    Daemonize::new()
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .map_err(|e| anyhow!("{e}"))
}

async fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::load(cli.config).await?;
    info!("recomd {} starting", env!("CARGO_PKG_VERSION"));

    Application::builder()
        .with_config_manager(config_manager)
        .build()?
        .run()
        .await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Fork before the runtime spawns its worker threads.
    if cli.daemonize {
        into_daemon()?;
        init_syslog()?;
    } else {
        init_env_logger();
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(run(cli))
}
