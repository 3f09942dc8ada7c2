//! # gh-app-token-core
//!
//! Short-lived GitHub credentials for a GitHub App, intended for CI/CD pipelines.
//!
//! This crate provides:
//! - RS256 App assertion signing (`auth::jwt`)
//! - Installation token exchange with retry and rate-limit handling (`client`)
//! - Installation resolution from an owner/repository pair
//! - An expiry-aware installation token cache (`auth::cache`)
//! - [`AuthEngine`], which composes the above with single-flight coordination
//!
//! # Examples
//!
//! ## Identifiers
//!
//! ```rust
//! use gh_app_token_core::auth::{GitHubAppId, InstallationId, RepositoryTarget};
//!
//! let app_id: GitHubAppId = "123456".parse().unwrap();
//! let installation_id = InstallationId::new(789012);
//! let target: RepositoryTarget = "acme/widgets".parse().unwrap();
//!
//! assert_eq!(app_id.as_u64(), 123456);
//! assert_eq!(installation_id.to_string(), "789012");
//! assert_eq!(target.owner(), "acme");
//! ```
//!
//! ## Getting a token
//!
//! ```rust,no_run
//! use gh_app_token_core::{AuthConfig, AuthEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig {
//!     app_id: Some("123456".to_string()),
//!     private_key_path: Some("/etc/gh-app/key.pem".into()),
//!     ..AuthConfig::default()
//! };
//!
//! let engine = AuthEngine::from_config(&config)?;
//! let token = engine.get_repository_token("acme", "widgets").await?;
//! println!("token expires at {}", token.expires_at);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod redact;

pub use auth::{
    GitHubAppId, InstallationId, InstallationToken, IssuedToken, JsonWebToken, JwtClaims,
    JwtSigner, PrivateKey, RepositorySelection, RepositoryTarget, TokenCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, KeySource};
pub use engine::{AuthEngine, AuthEngineBuilder};
pub use error::{ApiError, AuthError, CacheError, SigningError, ValidationError};
