use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use config::{Config, File};
use log::debug;
use serde::Deserialize;

use crate::{
    api::slack::{ClientOptions, DEFAULT_API_URL},
    cli::Args,
    models::slack::ChannelKind,
    writer::OutputFormat,
};

/// Contents of `$XDG_CONFIG_HOME/slack-export/config.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub token: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
    pub api_url: Option<String>,
    pub types: Option<Vec<ChannelKind>>,
    pub include_archived: Option<bool>,
    pub page_size: Option<u32>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub min_request_interval_ms: Option<u64>,
    pub default_backoff_secs: Option<u64>,
}

/// Everything a run needs, after merging CLI, environment and config file.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub token: String,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub api_url: String,
    pub types: Vec<ChannelKind>,
    pub include_archived: bool,
    pub page_size: u32,
    pub jobs: usize,
    pub timeout: Duration,
    pub min_request_interval: Duration,
    pub default_backoff: Duration,
}

impl ExportConfig {
    pub fn new(token: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            token: token.into(),
            output_dir: output_dir.into(),
            output_format: OutputFormat::default(),
            api_url: DEFAULT_API_URL.to_string(),
            types: ChannelKind::ALL.to_vec(),
            include_archived: false,
            page_size: 200,
            jobs: 1,
            timeout: Duration::from_secs(30),
            min_request_interval: Duration::ZERO,
            default_backoff: Duration::from_secs(30),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            page_size: self.page_size,
            types: self.types.clone(),
            include_archived: self.include_archived,
            timeout: self.timeout,
        }
    }
}

const CONFIG_FILE_NAME: &str = env!("CARGO_PKG_NAME");

// Function to get the XDG_CONFIG_HOME path
fn get_xdg_config_path() -> Option<PathBuf> {
    // First check XDG_CONFIG_HOME environment variable
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config));
    }

    // If XDG_CONFIG_HOME is not set, fall back to $HOME/.config
    if let Ok(home) = env::var("HOME") {
        return Some(PathBuf::from(home).join(".config"));
    }

    None
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let Some(xdg_config) = get_xdg_config_path() else {
        return Ok(Settings::default());
    };

    let config_path = xdg_config.join(CONFIG_FILE_NAME).join("config.toml");
    if !config_path.exists() {
        return Ok(Settings::default());
    }

    debug!("reading settings from {}", config_path.display());

    Config::builder()
        .add_source(File::from(config_path.clone()).required(false))
        .build()?
        .try_deserialize()
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to deserialize config file {}: {}",
                config_path.display(),
                e
            )
        })
}

/// Command line and environment values win over the config file.
pub fn merge_settings_with_args(args: &Args, settings: Settings) -> anyhow::Result<ExportConfig> {
    let token = args
        .token
        .clone()
        .filter(|token| !token.is_empty())
        .or(settings.token)
        .filter(|token| !token.is_empty())
        .context("no token given, use --token, SLACK_TOKEN or `token` in the config file")?;

    let output_dir = args
        .output_dir
        .clone()
        .or(settings.output_dir)
        .context(
            "no output directory given, use --output-dir, SLACK_EXPORT_DIR or `output_dir` in the config file",
        )?;

    let mut config = ExportConfig::new(token, output_dir);

    macro_rules! apply {
        ($config:expr, $field:ident, $value:expr) => {
            if let Some(value) = $value {
                $config.$field = value;
            }
        };
    }

    apply!(config, output_format, args.output_format.or(settings.output_format));
    apply!(config, api_url, args.api_url.clone().or(settings.api_url));
    apply!(config, page_size, args.page_size.or(settings.page_size));
    apply!(config, jobs, args.jobs.or(settings.jobs));
    apply!(
        config,
        types,
        Some(args.types.clone())
            .filter(|types| !types.is_empty())
            .or(settings.types)
    );
    apply!(config, timeout, settings.timeout_secs.map(Duration::from_secs));
    apply!(
        config,
        min_request_interval,
        settings.min_request_interval_ms.map(Duration::from_millis)
    );
    apply!(
        config,
        default_backoff,
        settings.default_backoff_secs.map(Duration::from_secs)
    );

    config.include_archived = args.include_archived || settings.include_archived.unwrap_or(false);

    if !(1..=1000).contains(&config.page_size) {
        bail!("page size must be between 1 and 1000, got {}", config.page_size);
    }
    if config.jobs == 0 {
        bail!("jobs must be at least 1");
    }
    if config.types.is_empty() {
        bail!("no conversation types selected");
    }

    debug!(
        "merged config: output_dir={} format={} api_url={} types={:?} jobs={}",
        config.output_dir.display(),
        config.output_format,
        config.api_url,
        config.types,
        config.jobs
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::LogLevel;

    /// Arguments as if nothing was given on the command line or in the
    /// environment.
    fn args() -> Args {
        Args {
            token: None,
            output_dir: None,
            output_format: None,
            api_url: None,
            types: Vec::new(),
            include_archived: false,
            page_size: None,
            jobs: None,
            log_level: LogLevel::Info,
        }
    }

    #[test]
    fn test_cli_wins_over_settings() {
        let settings = Settings {
            token: Some("from-file".to_string()),
            output_dir: Some(PathBuf::from("file-dir")),
            output_format: Some(OutputFormat::Jsonl),
            page_size: Some(50),
            ..Settings::default()
        };

        let cli_args = Args {
            token: Some("from-cli".to_string()),
            output_format: Some(OutputFormat::Json),
            ..args()
        };
        let config = merge_settings_with_args(&cli_args, settings).unwrap();

        assert_eq!(config.token, "from-cli");
        assert_eq!(config.output_dir, PathBuf::from("file-dir"));
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.types, ChannelKind::ALL.to_vec());
    }

    #[test]
    fn test_settings_fill_tuning_values() {
        let settings = Settings {
            min_request_interval_ms: Some(1200),
            default_backoff_secs: Some(5),
            timeout_secs: Some(3),
            include_archived: Some(true),
            types: Some(vec![ChannelKind::Im]),
            ..Settings::default()
        };

        let cli_args = Args {
            token: Some("t".to_string()),
            output_dir: Some(PathBuf::from("out")),
            ..args()
        };
        let config = merge_settings_with_args(&cli_args, settings).unwrap();

        assert_eq!(config.min_request_interval, Duration::from_millis(1200));
        assert_eq!(config.default_backoff, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert!(config.include_archived);
        assert_eq!(config.types, vec![ChannelKind::Im]);
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = Settings {
            token: Some("t".to_string()),
            output_dir: Some(PathBuf::from("out")),
            ..Settings::default()
        };

        let with = |page_size, jobs| Args {
            page_size,
            jobs,
            ..args()
        };

        assert!(merge_settings_with_args(&with(Some(0), None), base.clone()).is_err());
        assert!(merge_settings_with_args(&with(Some(1001), None), base.clone()).is_err());
        assert!(merge_settings_with_args(&with(None, Some(0)), base.clone()).is_err());
        assert!(merge_settings_with_args(&args(), Settings::default()).is_err());
        assert!(merge_settings_with_args(&args(), base).is_ok());
    }

    #[test]
    fn test_settings_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
token = "xoxp-123"
output_dir = "/tmp/slack"
output_format = "jsonl"
types = ["public", "private"]
min_request_interval_ms = 1200
"#,
        )
        .unwrap();

        let settings: Settings = Config::builder()
            .add_source(File::from(path))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.token.as_deref(), Some("xoxp-123"));
        assert_eq!(settings.output_format, Some(OutputFormat::Jsonl));
        assert_eq!(
            settings.types,
            Some(vec![ChannelKind::Public, ChannelKind::Private])
        );
        assert_eq!(settings.min_request_interval_ms, Some(1200));
    }
}
