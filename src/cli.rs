use clap::Parser;
use std::path::PathBuf;

/// recomd: Modbus/TCP daemon for REC Indovent ventilation units
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: $RECOMD_CONFIG, ~/.config/recomd/config.yml, /etc/recomd/config.yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and log to syslog
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,
}
