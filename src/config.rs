use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::request::Method;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// fitlog - fitness tracking API client
#[derive(Parser, Debug)]
#[command(name = "fitlog", author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend base URL; request paths are appended verbatim
    #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Per-attempt timeout in milliseconds
    #[arg(long, env = "API_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS, global = true)]
    pub timeout_ms: u64,

    /// Retries after the first attempt
    #[arg(long, env = "API_RETRY_ATTEMPTS", default_value_t = DEFAULT_RETRY_ATTEMPTS, global = true)]
    pub retries: u32,

    /// Linear backoff step in milliseconds
    #[arg(long, env = "API_RETRY_DELAY_MS", default_value_t = DEFAULT_RETRY_DELAY_MS, global = true)]
    pub retry_delay_ms: u64,

    /// Path to the local SQLite store
    #[arg(short = 'd', long, env = "FITLOG_DB_FILE", global = true)]
    pub db_file: Option<String>,

    /// Where tokens are kept (keyring, sqlite, memory)
    #[arg(long, env = "FITLOG_TOKEN_STORE", default_value = "keyring", global = true)]
    pub token_store: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sign in with username and password
    Login {
        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long, env = "FITLOG_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign in with a Google ID token
    GoogleLogin { id_token: String },

    /// Sign out and clear the stored session
    Logout,

    /// Show whether a valid session is stored
    Status,

    /// Print the signed-in user's profile
    Whoami,

    /// Send an authenticated request and print the JSON response
    Request {
        method: Method,

        /// Path relative to the API URL, e.g. /food-logs
        path: String,

        /// JSON body
        #[arg(long)]
        data: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenStoreKind {
    /// OS keychain
    Keyring,
    /// Same SQLite file as the rest of the session
    Sqlite,
    /// Process memory only; nothing survives exit
    Memory,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub api_url: String,

    // Request pipeline
    pub request_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,

    // Local storage
    pub db_file: PathBuf,
    pub token_store: TokenStoreKind,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            db_file: default_db_file(),
            token_store: TokenStoreKind::Keyring,
            log_level: "warn".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Parse CLI arguments after loading `.env`. Priority: CLI > ENV > defaults
    pub fn parse_args() -> CliArgs {
        dotenvy::dotenv().ok();
        CliArgs::parse()
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Config {
            api_url: args.api_url.clone(),
            request_timeout_ms: args.timeout_ms,
            retry_attempts: args.retries,
            retry_delay_ms: args.retry_delay_ms,
            db_file: args
                .db_file
                .as_deref()
                .map(expand_tilde)
                .unwrap_or_else(default_db_file),
            token_store: parse_token_store(&args.token_store),
            log_level: args.log_level.clone(),
            log_format: parse_log_format(&args.log_format),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            anyhow::bail!("API_URL cannot be empty");
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("API_URL must start with http:// or https://: {}", self.api_url);
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("API_TIMEOUT_MS must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Default store location under the user's data directory
fn default_db_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fitlog")
        .join("store.sqlite3")
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse token store kind from string
fn parse_token_store(s: &str) -> TokenStoreKind {
    match s.to_lowercase().as_str() {
        "sqlite" => TokenStoreKind::Sqlite,
        "memory" => TokenStoreKind::Memory,
        _ => TokenStoreKind::Keyring,
    }
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}
