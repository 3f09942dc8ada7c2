//! App assertion (JWT) signing for GitHub App authentication.
//!
//! # GitHub Requirements
//!
//! - Assertions must use RS256 (RSA Signature with SHA-256)
//! - Maximum lifetime is 10 minutes from `iat`
//! - Claims must include `iss` (app ID), `iat` (issued at), and `exp` (expiration)
//!
//! `iat` is backdated by 60 seconds so that a local clock running slightly
//! ahead of GitHub's does not produce an assertion that is "issued in the future".

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use zeroize::Zeroizing;

use crate::auth::{GitHubAppId, JsonWebToken, JwtClaims, JwtSigner};
use crate::error::{SigningError, ValidationError};

/// Longest assertion lifetime GitHub accepts, in seconds.
pub const MAX_ASSERTION_LIFETIME_SECS: i64 = 600;

/// How far `iat` is backdated to tolerate clock drift, in seconds.
pub const CLOCK_SKEW_ALLOWANCE_SECS: i64 = 60;

/// Parsed RSA private key ready for RS256 signing.
///
/// Only the parsed signing key is retained. The key material is never exposed
/// in Debug output.
#[derive(Clone)]
pub struct PrivateKey {
    encoding_key: EncodingKey,
}

impl PrivateKey {
    /// Create a private key from a PEM-encoded string.
    ///
    /// Both PKCS#1 (`BEGIN RSA PRIVATE KEY`) and PKCS#8 (`BEGIN PRIVATE KEY`)
    /// encodings are accepted.
    ///
    /// # Errors
    ///
    /// Returns `SigningError::InvalidKey` if:
    /// - The PEM string is empty or has no BEGIN/END markers
    /// - The key is not an RSA key
    /// - Key data is corrupted
    pub fn from_pem(pem: &str) -> Result<Self, SigningError> {
        let pem = pem.trim();

        if pem.is_empty() {
            return Err(SigningError::InvalidKey {
                message: "PEM string cannot be empty".to_string(),
            });
        }

        if !pem.contains("-----BEGIN") || !pem.contains("-----END") {
            return Err(SigningError::InvalidKey {
                message: "Invalid PEM format: missing BEGIN/END markers".to_string(),
            });
        }

        // Parse with rsa first so that non-RSA or corrupt keys fail here with a
        // useful message instead of at signing time.
        let parsed = RsaPrivateKey::from_pkcs1_pem(pem)
            .map(drop)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem).map(drop));
        if let Err(e) = parsed {
            return Err(SigningError::InvalidKey {
                message: format!("Failed to parse RSA private key: {}", e),
            });
        }

        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| SigningError::InvalidKey {
                message: format!("Failed to create encoding key: {}", e),
            })?;

        Ok(Self { encoding_key })
    }

    /// Read and parse a PEM private key file.
    ///
    /// The file contents are zeroized once parsing finishes.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SigningError> {
        let path = path.as_ref();
        let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            SigningError::InvalidKey {
                message: format!("Failed to read private key file {}: {}", path.display(), e),
            }
        })?);

        Self::from_pem(&pem)
    }
}

// Security: Don't expose key data in debug output
impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &Algorithm::RS256)
            .field("key_data", &"<REDACTED>")
            .finish()
    }
}

/// RS256 assertion signer for a single GitHub App.
///
/// # Examples
///
/// ```no_run
/// # use gh_app_token_core::auth::{GitHubAppId, JwtSigner, PrivateKey, RS256JwtSigner};
/// # use chrono::Utc;
/// let key = PrivateKey::from_file("/etc/gh-app/key.pem").unwrap();
/// let signer = RS256JwtSigner::new(GitHubAppId::new(123456), key);
///
/// let jwt = signer.sign(Utc::now()).unwrap();
/// assert_eq!(jwt.app_id(), GitHubAppId::new(123456));
/// ```
#[derive(Clone)]
pub struct RS256JwtSigner {
    app_id: GitHubAppId,
    private_key: PrivateKey,
    expiration: Duration,
}

impl RS256JwtSigner {
    /// Create a signer producing assertions with GitHub's maximum lifetime.
    pub fn new(app_id: GitHubAppId, private_key: PrivateKey) -> Self {
        Self {
            app_id,
            private_key,
            expiration: Duration::seconds(MAX_ASSERTION_LIFETIME_SECS),
        }
    }

    /// Use a shorter assertion lifetime.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFormat` if `expiration` is not positive
    /// or exceeds 10 minutes.
    pub fn with_expiration(mut self, expiration: Duration) -> Result<Self, ValidationError> {
        let max = Duration::seconds(MAX_ASSERTION_LIFETIME_SECS);
        if expiration <= Duration::zero() || expiration > max {
            return Err(ValidationError::InvalidFormat {
                field: "assertion_expiration".to_string(),
                message: "must be between 1 second and 10 minutes".to_string(),
            });
        }
        self.expiration = expiration;
        Ok(self)
    }

    /// Configured assertion lifetime.
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Build the claims for an assertion signed at `now`.
    pub fn build_claims(&self, now: DateTime<Utc>) -> JwtClaims {
        let iat = now - Duration::seconds(CLOCK_SKEW_ALLOWANCE_SECS);
        let exp = iat + self.expiration;

        JwtClaims {
            iss: self.app_id.to_string(),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
        }
    }
}

impl JwtSigner for RS256JwtSigner {
    fn app_id(&self) -> GitHubAppId {
        self.app_id
    }

    fn sign(&self, now: DateTime<Utc>) -> Result<JsonWebToken, SigningError> {
        let claims = self.build_claims(now);
        let (issued_at, expires_at) = match (claims.issued_at(), claims.expires_at()) {
            (Some(iat), Some(exp)) => (iat, exp),
            _ => {
                return Err(SigningError::SigningFailed {
                    message: format!("Signing time {} is out of range", now),
                })
            }
        };

        let header = Header::new(Algorithm::RS256);
        let token = encode(&header, &claims, &self.private_key.encoding_key).map_err(|e| {
            SigningError::SigningFailed {
                message: format!("Failed to encode JWT: {}", e),
            }
        })?;

        Ok(JsonWebToken::new(token, self.app_id, issued_at, expires_at))
    }
}

impl std::fmt::Debug for RS256JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RS256JwtSigner")
            .field("app_id", &self.app_id)
            .field("expiration", &self.expiration)
            .field("private_key", &self.private_key)
            .finish()
    }
}

#[cfg(test)]
#[path = "jwt_tests.rs"]
mod tests;
