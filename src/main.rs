use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use std::sync::Arc;

use fitlog_client::auth::{KeyValueStore, KeyringStore, MemoryStore, SqliteStore, TokenManager};
use fitlog_client::config::{Command, Config, LogFormat, TokenStoreKind};
use fitlog_client::error::ApiError;
use fitlog_client::http_client::ApiClient;
use fitlog_client::models::request::RequestDescriptor;
use fitlog_client::services::{AuthService, UserService};

/// Keychain service name for stored tokens
const KEYRING_SERVICE: &str = "fitlog";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let args = Config::parse_args();
    let config = Config::from_args(&args);
    config.validate()?;

    init_logging(&config);
    tracing::debug!("Configuration: {:?}", config);

    let tokens = Arc::new(build_token_manager(&config)?);
    let api = Arc::new(ApiClient::new(&config, tokens.clone())?);
    tracing::debug!("API client initialized for {}", api.base_url());

    match args.command {
        Command::Login { username, password } => login(&api, username, password).await,
        Command::GoogleLogin { id_token } => {
            let user = AuthService::new(api.clone())
                .google_login(&id_token)
                .await
                .map_err(report)?;
            print_signed_in(user.as_ref().map(|u| u.username.as_str()));
            Ok(())
        }
        Command::Logout => {
            AuthService::new(api.clone()).logout().await.map_err(report)?;
            println!("Signed out");
            Ok(())
        }
        Command::Status => status(&tokens),
        Command::Whoami => whoami(&api).await,
        Command::Request { method, path, data } => {
            let mut descriptor = RequestDescriptor::new(method, path);
            if let Some(raw) = data {
                let body = serde_json::from_str(&raw).context("--data must be valid JSON")?;
                descriptor = descriptor.with_data(body);
            }

            // Refresh an expired session before the call
            if tokens.get_valid_token().await.is_none() {
                tracing::warn!("No valid session, sending request unauthenticated");
            }

            let response = api.execute(&descriptor).await.map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&response.data)?);
            Ok(())
        }
    }
}

/// Initialize logging to stderr with the configured level and format
fn init_logging(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Wire the secure and ordinary stores selected by configuration
fn build_token_manager(config: &Config) -> Result<TokenManager> {
    let secure: Arc<dyn KeyValueStore>;
    let plain: Arc<dyn KeyValueStore>;
    match config.token_store {
        TokenStoreKind::Memory => {
            secure = Arc::new(MemoryStore::new());
            plain = Arc::new(MemoryStore::new());
        }
        TokenStoreKind::Sqlite => {
            let store = Arc::new(open_sqlite(config)?);
            secure = store.clone();
            plain = store;
        }
        TokenStoreKind::Keyring => {
            secure = Arc::new(KeyringStore::new(KEYRING_SERVICE));
            plain = Arc::new(open_sqlite(config)?);
        }
    }

    TokenManager::new(config.api_url.clone(), secure, plain)
}

fn open_sqlite(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.db_file)
        .with_context(|| format!("Failed to open local store: {}", config.db_file.display()))
}

async fn login(
    api: &Arc<ApiClient>,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let username = match username {
        Some(u) => u,
        None => Input::new()
            .with_prompt("Username")
            .interact_text()
            .context("Failed to read username")?,
    };
    let password = match password {
        Some(p) => p,
        None => Password::new()
            .with_prompt("Password")
            .interact()
            .context("Failed to read password")?,
    };

    let user = AuthService::new(api.clone())
        .login(&username, &password)
        .await
        .map_err(report)?;
    print_signed_in(user.as_ref().map(|u| u.username.as_str()).or(Some(username.as_str())));
    Ok(())
}

fn status(tokens: &TokenManager) -> Result<()> {
    match tokens.session()? {
        None => println!("Not signed in"),
        Some(session) => {
            let expires_in = session.expires_in();
            if tokens.is_authenticated() {
                println!("Signed in, token expires in {}s", expires_in);
            } else if session.refresh_token.is_some() {
                println!("Session expired {}s ago, will refresh on next request", -expires_in);
            } else {
                println!("Session expired, please sign in again");
            }
        }
    }
    Ok(())
}

async fn whoami(api: &Arc<ApiClient>) -> Result<()> {
    let tokens = api.tokens();
    let id = match tokens.cached_user_id() {
        Some(id) => id,
        None => {
            println!("Not signed in");
            return Ok(());
        }
    };

    if tokens.get_valid_token().await.is_none() {
        println!("Session expired, please sign in again");
        return Ok(());
    }

    let user = UserService::new(api.clone()).get(id).await.map_err(report)?;
    if let Err(e) = tokens.save_user(&user) {
        tracing::warn!("Failed to cache user: {}", e);
    }
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

fn print_signed_in(username: Option<&str>) {
    match username {
        Some(name) => println!("Signed in as {}", name),
        None => println!("Signed in"),
    }
}

/// Turn a classified error into a CLI failure with friendly copy
fn report(e: ApiError) -> anyhow::Error {
    tracing::debug!(code = %e.code(), status = e.status(), "Command failed: {}", e);
    anyhow::anyhow!("{} ({}, status {})", e.user_message(), e.code(), e.status())
}
