//! Rendering of an issued token for stdout.

use chrono::{DateTime, Utc};
use gh_app_token_core::{IssuedToken, RepositoryTarget};
use serde::Serialize;

use crate::CliError;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

/// How the token is printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// The bare token
    Token,
    /// A JSON document with the token and its expiry
    Json,
    /// `GITHUB_TOKEN=<token>`, for appending to an env file
    Env,
    /// A `git clone` command authenticated with the token
    Clone,
}

#[derive(Serialize)]
struct TokenDocument<'a> {
    token: &'a str,
    token_type: &'static str,
    expires_at: DateTime<Utc>,
    installation_id: u64,
}

/// Render `token` in `format`.
///
/// `target` is required for [`OutputFormat::Clone`].
pub fn render(
    format: OutputFormat,
    token: &IssuedToken,
    target: Option<&RepositoryTarget>,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Token => Ok(token.token.clone()),
        OutputFormat::Json => {
            let document = TokenDocument {
                token: &token.token,
                token_type: "installation",
                expires_at: token.expires_at,
                installation_id: token.installation_id.as_u64(),
            };
            serde_json::to_string_pretty(&document).map_err(|e| CliError::Output {
                message: format!("Failed to encode JSON output: {}", e),
            })
        }
        OutputFormat::Env => Ok(format!("GITHUB_TOKEN={}", token.token)),
        OutputFormat::Clone => {
            let target = target.ok_or_else(|| CliError::InvalidArgument {
                arg: "--output-format".to_string(),
                message: "clone output needs OWNER and REPO".to_string(),
            })?;
            Ok(format!(
                "git clone https://x-access-token:{}@github.com/{}/{}.git",
                token.token,
                target.owner(),
                target.repo()
            ))
        }
    }
}
