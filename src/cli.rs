use clap::Parser;

use crate::remote::ao3::DEFAULT_BASE_URL;
use crate::sync::batch::DEFAULT_BATCH_SIZE;
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "ao3sync",
    version,
    about = "Mirror your AO3 subscriptions as a local EPUB library"
)]
pub struct Cli {
    /// AO3 username
    #[arg(short = 'u', long, env = "USERNAME")]
    pub username: Option<String>,

    /// AO3 password.
    /// WARNING: passing via --password is visible in process listings.
    /// Prefer the PASSWORD environment variable or a .env file instead.
    #[arg(short = 'p', long, env = "PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Root directory of the local library
    #[arg(short = 'd', long, env = "OUTPUT_DIRECTORY")]
    pub output_directory: Option<String>,

    /// Number of works requested from AO3 at once
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Retries per work on throttling or server errors
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Base delay in seconds before the first retry (doubles on each retry)
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Give up on a single work after this many seconds, retries included
    #[arg(long, default_value_t = 300)]
    pub unit_timeout: u64,

    /// Timeout in seconds for a single HTTP request
    #[arg(long, default_value_t = 60)]
    pub request_timeout: u64,

    /// Log level (RUST_LOG takes precedence when set)
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    #[arg(long, env = "AO3_BASE_URL", default_value = DEFAULT_BASE_URL, hide = true)]
    pub base_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ao3sync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--username", "me", "--password", "pw", "-d", "/lib"]);
        assert_eq!(cli.batch_size, 10);
        assert_eq!(cli.max_retries, 2);
        assert_eq!(cli.retry_delay, 5);
        assert_eq!(cli.unit_timeout, 300);
        assert_eq!(cli.request_timeout, 60);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.no_progress_bar);
        assert_eq!(cli.base_url, "https://archiveofourown.org");
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "-u",
            "me",
            "--output-directory",
            "~/fics",
            "--batch-size",
            "3",
            "--max-retries",
            "0",
            "--log-level",
            "debug",
            "--no-progress-bar",
        ]);
        assert_eq!(cli.username.as_deref(), Some("me"));
        assert_eq!(cli.output_directory.as_deref(), Some("~/fics"));
        assert_eq!(cli.batch_size, 3);
        assert_eq!(cli.max_retries, 0);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(cli.no_progress_bar);
    }

    #[test]
    fn test_rejects_non_numeric_batch_size() {
        assert!(
            Cli::try_parse_from(["ao3sync", "--batch-size", "ten"]).is_err()
        );
    }

    #[test]
    fn test_command_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
