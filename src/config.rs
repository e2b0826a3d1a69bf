use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::remote::Credentials;
use crate::retry::RetryConfig;
use crate::sync::{BatchOptions, SyncConfig};

/// Longest pause between two retries of the same work.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Application configuration, validated.
pub struct Config {
    pub username: String,
    pub password: String,
    pub output_directory: PathBuf,
    pub base_url: String,

    pub retry_delay: Duration,
    pub unit_timeout: Duration,
    pub request_timeout: Duration,

    pub batch_size: usize,
    pub max_retries: u32,

    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("output_directory", &self.output_directory)
            .field("base_url", &self.base_url)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// A value that must be supplied by flag or environment.
fn required(value: Option<String>, flag: &str, env: &str) -> anyhow::Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => anyhow::bail!(
            "{} is required: pass --{} or set {} (a .env file in the working directory also works)",
            env,
            flag,
            env
        ),
    }
}

fn non_zero_secs(secs: u64, flag: &str) -> anyhow::Result<Duration> {
    if secs == 0 {
        anyhow::bail!("--{} must be greater than zero", flag);
    }
    Ok(Duration::from_secs(secs))
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let username = required(cli.username, "username", "USERNAME")?
            .trim()
            .to_string();
        let password = required(cli.password, "password", "PASSWORD")?;
        let output_directory = expand_tilde(
            required(cli.output_directory, "output-directory", "OUTPUT_DIRECTORY")?.trim(),
        );

        if cli.batch_size == 0 {
            anyhow::bail!("--batch-size must be greater than zero");
        }
        let unit_timeout = non_zero_secs(cli.unit_timeout, "unit-timeout")?;
        let request_timeout = non_zero_secs(cli.request_timeout, "request-timeout")?;

        let base_url = cli.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("Invalid AO3 base URL '{}'", cli.base_url);
        }

        Ok(Self {
            username,
            password,
            output_directory,
            base_url,
            retry_delay: Duration::from_secs(cli.retry_delay),
            unit_timeout,
            request_timeout,
            batch_size: cli.batch_size,
            max_retries: cli.max_retries,
            no_progress_bar: cli.no_progress_bar,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            output_directory: self.output_directory.clone(),
            batch: BatchOptions {
                batch_size: self.batch_size,
                unit_timeout: self.unit_timeout,
            },
            retry: RetryConfig {
                max_retries: self.max_retries,
                base_delay: self.retry_delay,
                max_delay: MAX_RETRY_DELAY.max(self.retry_delay),
            },
            no_progress_bar: self.no_progress_bar,
        }
    }
}
