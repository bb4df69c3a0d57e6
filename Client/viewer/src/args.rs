use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = "A headless viewer for multi-layout HLS events.")]
pub struct Args {
    /// Top-level multi-layout manifest.
    #[arg(short, long)]
    pub manifest_url: String,
    /// Region metadata service; click-to-switch is disabled without it.
    #[arg(short, long)]
    pub region_service_url: Option<String>,
    #[arg(long)]
    pub token_url: Option<String>,
    #[arg(long)]
    pub api_key: Option<String>,
    /// Bearer token to use instead of the token endpoint.
    #[arg(long)]
    pub token: Option<String>,
    /// Layout to switch to once the manifest is resolved.
    #[arg(long)]
    pub layout: Option<String>,
    /// YAML file with session settings.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
    #[arg(short, long, default_value = "3380")]
    pub port: u16,
}

pub fn parse_args() -> Args {
    Args::parse()
}

pub fn get_log_level_filter(args: &Args) -> LevelFilter {
    match args.log_level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}
