use std::{fmt, path::PathBuf};

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use crate::{models::slack::ChannelKind, writer::OutputFormat};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Slack OAuth access token
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Directory to write one file per channel into, created if missing
    #[arg(long, env = "SLACK_EXPORT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output file format [default: pretty-array]
    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Slack Web API base URL
    #[arg(long, env = "SLACK_API_URL")]
    pub api_url: Option<String>,

    /// Conversation types to export, comma separated [default: all]
    #[arg(long, value_enum, value_delimiter = ',')]
    pub types: Vec<ChannelKind>,

    /// Also export archived channels
    #[arg(long)]
    pub include_archived: bool,

    /// Items requested per page (1-1000)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Number of channels exported concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Log verbosity
    #[arg(short, long, value_name = "LEVEL", default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Off => write!(f, "off"),
        }
    }
}
