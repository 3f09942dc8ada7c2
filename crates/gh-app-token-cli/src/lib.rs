//! # gh-app-token CLI
//!
//! Prints a GitHub App installation token for use in CI/CD pipelines.
//!
//! Settings are layered, later sources winning:
//! 1. an optional configuration file (`--config` / `GH_APP_TOKEN_CONFIG`)
//! 2. `GH_APP_TOKEN__*` environment variables, e.g. `GH_APP_TOKEN__APP_ID`
//! 3. the well-known `GITHUB_APP_*` variables and explicit flags
//!
//! Only the requested output is written to stdout; logs and errors go to stderr.

pub mod output;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use gh_app_token_core::{AuthConfig, AuthEngine, AuthError, RepositoryTarget};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use output::{render, OutputFormat};

// ============================================================================
// CLI Structure
// ============================================================================

/// Issue a GitHub App installation token
#[derive(Parser)]
#[command(name = "gh-app-token")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Issue GitHub App installation tokens for CI/CD pipelines")]
#[command(
    long_about = "Signs a GitHub App assertion, exchanges it for an installation access token \
                  and prints the token. Give OWNER REPO to look up the installation from a \
                  repository, or --installation-id to name it directly."
)]
pub struct Cli {
    /// Repository owner (user or organization)
    #[arg(requires = "repo")]
    pub owner: Option<String>,

    /// Repository name
    pub repo: Option<String>,

    /// GitHub App id
    #[arg(long, env = "GITHUB_APP_ID")]
    pub app_id: Option<String>,

    /// Path to the App's PEM private key
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,

    /// The App's PEM private key
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Installation id; skips the repository lookup
    #[arg(long, env = "GITHUB_APP_INSTALLATION_ID")]
    pub installation_id: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL")]
    pub api_url: Option<String>,

    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short, long, env = "GH_APP_TOKEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "token")]
    pub output_format: OutputFormat,

    /// Give up after this many seconds, retries included
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// The repository named on the command line, if any.
    pub fn target(&self) -> Result<Option<RepositoryTarget>, CliError> {
        match (&self.owner, &self.repo) {
            (Some(owner), Some(repo)) => RepositoryTarget::new(owner.as_str(), repo.as_str())
                .map(Some)
                .map_err(|e| CliError::InvalidArgument {
                    arg: "OWNER REPO".to_string(),
                    message: e.to_string(),
                }),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI errors; each maps to its own exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Token request failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Output error: {message}")]
    Output { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Auth(_) => 2,
            Self::InvalidArgument { .. } => 3,
            Self::Output { .. } => 4,
            Self::Io(_) => 5,
        }
    }
}

impl From<config::ConfigError> for CliError {
    fn from(error: config::ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(cli.verbose, cli.json_logs)?;

    let rendered = run(&cli).await?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", rendered)?;
    stdout.flush()?;
    Ok(())
}

/// Obtain a token as `cli` describes and render it.
pub async fn run(cli: &Cli) -> Result<String, CliError> {
    let target = cli.target()?;

    if cli.output_format == OutputFormat::Clone && target.is_none() {
        return Err(CliError::InvalidArgument {
            arg: "--output-format".to_string(),
            message: "clone output needs OWNER and REPO".to_string(),
        });
    }

    let config = load_configuration(cli)?;
    config
        .validate()
        .map_err(|e| CliError::Configuration(e.to_string()))?;

    if target.is_none() && config.installation_id.is_none() {
        return Err(CliError::InvalidArgument {
            arg: "OWNER REPO".to_string(),
            message: "give a repository or --installation-id".to_string(),
        });
    }

    let engine = AuthEngine::from_config(&config).map_err(|e| match e {
        AuthError::InvalidKey { .. } | AuthError::Validation(_) => {
            CliError::Configuration(e.to_string())
        }
        other => CliError::Auth(other),
    })?;
    debug!(app_id = %engine.app_id(), "Engine ready");

    let token = match &target {
        Some(target) => {
            engine
                .get_repository_token(target.owner(), target.repo())
                .await?
        }
        None => engine.get_installation_token(None).await?,
    };
    info!(
        installation_id = %token.installation_id,
        expires_at = %token.expires_at,
        "Issued installation token"
    );

    render(cli.output_format, &token, target.as_ref())
}

// ============================================================================
// Setup
// ============================================================================

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `verbose`.
pub fn initialize_logging(verbose: bool, json: bool) -> Result<(), CliError> {
    let default_filter = if verbose {
        "warn,gh_app_token=debug"
    } else {
        "warn,gh_app_token=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::Configuration(format!("Failed to initialize logging: {}", e)))
}

/// Merge the configuration file, environment and flags into an [`AuthConfig`].
pub fn load_configuration(cli: &Cli) -> Result<AuthConfig, CliError> {
    let mut builder = config::Config::builder();

    if let Some(path) = &cli.config {
        let path = expand_home(path);
        if !path.is_file() {
            return Err(CliError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(config::File::from(path.as_path()).required(true));
    }

    let settings = builder
        .add_source(config::Environment::with_prefix("GH_APP_TOKEN").separator("__"))
        .build()?;
    let mut config: AuthConfig = settings.try_deserialize()?;

    if let Some(app_id) = &cli.app_id {
        config.app_id = Some(app_id.clone());
    }
    // A key given on the command line replaces a key source from the file.
    match (&cli.private_key_path, &cli.private_key) {
        (Some(path), None) => {
            config.private_key_path = Some(path.clone());
            config.private_key = None;
        }
        (None, Some(pem)) => {
            config.private_key = Some(pem.clone());
            config.private_key_path = None;
        }
        (Some(path), Some(pem)) => {
            config.private_key_path = Some(path.clone());
            config.private_key = Some(pem.clone());
        }
        (None, None) => {}
    }
    if let Some(id) = &cli.installation_id {
        config.installation_id = Some(id.clone());
    }
    if let Some(url) = &cli.api_url {
        config.github_api_url = url.clone();
    }
    if let Some(secs) = cli.timeout {
        config.call_timeout_seconds = Some(secs);
    }

    config.private_key_path = config.private_key_path.as_deref().map(expand_home);

    Ok(config)
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
