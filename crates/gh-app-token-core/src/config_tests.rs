//! Tests for engine configuration.

use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

const TEST_PRIVATE_KEY_PEM: &str = include_str!("../tests/fixtures/test_app_key.pem");

fn key_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(TEST_PRIVATE_KEY_PEM.as_bytes()).unwrap();
    file
}

fn config_with_key(path: &Path) -> AuthConfig {
    AuthConfig {
        app_id: Some("123".to_string()),
        private_key_path: Some(path.to_path_buf()),
        ..AuthConfig::default()
    }
}

mod validation_tests {
    use super::*;

    /// Verify a minimal file-based configuration is accepted.
    #[test]
    fn test_valid_config() {
        let file = key_file();
        let config = config_with_key(file.path());

        assert!(config.validate().is_ok());
        assert_eq!(config.app_id().unwrap(), GitHubAppId::new(123));
        assert_eq!(config.installation_id().unwrap(), None);
    }

    /// Verify the App id is required.
    #[test]
    fn test_missing_app_id() {
        let file = key_file();
        let config = AuthConfig {
            app_id: Some("   ".to_string()),
            ..config_with_key(file.path())
        };

        let result = config.validate();

        assert!(matches!(result, Err(ValidationError::Required { field }) if field == "app_id"));
    }

    /// Verify non-numeric ids are rejected with the offending field.
    #[test]
    fn test_non_numeric_ids() {
        let file = key_file();
        let bad_app = AuthConfig {
            app_id: Some("my-app".to_string()),
            ..config_with_key(file.path())
        };
        let bad_installation = AuthConfig {
            installation_id: Some("-4".to_string()),
            ..config_with_key(file.path())
        };

        assert!(matches!(
            bad_app.validate(),
            Err(ValidationError::InvalidFormat { field, .. }) if field == "app_id"
        ));
        assert!(matches!(
            bad_installation.validate(),
            Err(ValidationError::InvalidFormat { field, .. }) if field == "installation_id"
        ));
    }

    /// Verify exactly one key source must be configured.
    #[test]
    fn test_key_source_exclusive() {
        let file = key_file();
        let both = AuthConfig {
            private_key: Some(TEST_PRIVATE_KEY_PEM.to_string()),
            ..config_with_key(file.path())
        };
        let neither = AuthConfig {
            app_id: Some("123".to_string()),
            ..AuthConfig::default()
        };

        assert!(matches!(
            both.validate(),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            neither.validate(),
            Err(ValidationError::Required { .. })
        ));
    }

    /// Verify a key path that does not exist is caught before signing.
    #[test]
    fn test_missing_key_file() {
        let config = config_with_key(Path::new("/nonexistent/gh-app-key.pem"));

        let result = config.validate();

        assert!(matches!(
            result,
            Err(ValidationError::InvalidFormat { field, .. }) if field == "private_key_path"
        ));
    }

    /// Verify zero timeouts and non-http URLs are rejected.
    #[test]
    fn test_invalid_transport_settings() {
        let file = key_file();
        let zero_timeout = AuthConfig {
            timeout_seconds: 0,
            ..config_with_key(file.path())
        };
        let zero_call_timeout = AuthConfig {
            call_timeout_seconds: Some(0),
            ..config_with_key(file.path())
        };
        let bad_url = AuthConfig {
            github_api_url: "ftp://github.example.com".to_string(),
            ..config_with_key(file.path())
        };

        assert!(zero_timeout.validate().is_err());
        assert!(zero_call_timeout.validate().is_err());
        assert!(bad_url.validate().is_err());
    }
}

mod key_loading_tests {
    use super::*;

    /// Verify inline PEM keys load.
    #[test]
    fn test_inline_key() {
        let config = AuthConfig {
            app_id: Some("1".to_string()),
            private_key: Some(TEST_PRIVATE_KEY_PEM.to_string()),
            ..AuthConfig::default()
        };

        assert!(matches!(config.key_source(), Ok(KeySource::Pem(_))));
        assert!(config.load_private_key().is_ok());
    }

    /// Verify inline keys with escaped newlines are accepted.
    #[test]
    fn test_inline_key_escaped_newlines() {
        let config = AuthConfig {
            app_id: Some("1".to_string()),
            private_key: Some(TEST_PRIVATE_KEY_PEM.trim().replace('\n', "\\n")),
            ..AuthConfig::default()
        };

        assert!(config.load_private_key().is_ok());
    }

    /// Verify key files load.
    #[test]
    fn test_key_file() {
        let file = key_file();
        let config = config_with_key(file.path());

        assert!(config.load_private_key().is_ok());
    }
}

mod derived_settings_tests {
    use super::*;

    /// Verify the user agent defaults to the App id.
    #[test]
    fn test_default_user_agent() {
        let config = AuthConfig::default();

        let client_config = config.client_config(GitHubAppId::new(42));

        assert_eq!(client_config.user_agent, "GitHubApp/42");
        assert_eq!(client_config.github_api_url, DEFAULT_GITHUB_API_URL);
        assert_eq!(client_config.timeout, Duration::from_secs(30));
    }

    /// Verify explicit settings flow into the client configuration.
    #[test]
    fn test_explicit_client_settings() {
        let config = AuthConfig {
            user_agent: Some("release-bot".to_string()),
            github_api_url: "https://ghe.example.com/api/v3".to_string(),
            timeout_seconds: 5,
            call_timeout_seconds: Some(20),
            ..AuthConfig::default()
        };

        let client_config = config.client_config(GitHubAppId::new(1));

        assert_eq!(client_config.user_agent, "release-bot");
        assert_eq!(client_config.github_api_url, "https://ghe.example.com/api/v3");
        assert_eq!(client_config.timeout, Duration::from_secs(5));
        assert_eq!(config.call_timeout(), Some(Duration::from_secs(20)));
    }

    /// Verify configuration deserializes with defaults for absent fields.
    #[test]
    fn test_deserialize_partial() {
        let config: AuthConfig = serde_json::from_str(
            r#"{"app_id": "7", "installation_id": "99", "private_key_path": "/keys/app.pem"}"#,
        )
        .unwrap();

        assert_eq!(config.app_id().unwrap(), GitHubAppId::new(7));
        assert_eq!(
            config.installation_id().unwrap(),
            Some(InstallationId::new(99))
        );
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
    }

    /// Verify Debug output hides an inline key.
    #[test]
    fn test_debug_redacts_inline_key() {
        let config = AuthConfig {
            private_key: Some(TEST_PRIVATE_KEY_PEM.to_string()),
            ..AuthConfig::default()
        };

        let debug = format!("{:?}", config);

        assert!(!debug.contains("PRIVATE KEY"));
        assert!(debug.contains("<REDACTED>"));
        assert!(!format!("{:?}", config.key_source().unwrap()).contains("PRIVATE KEY"));
    }
}
