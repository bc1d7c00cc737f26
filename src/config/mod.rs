//! Configuration module for the USP client
//!
//! This module loads client configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use waav_usp::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("usp.yaml");
//! let config = ClientConfig::from_file(&config_path)?;
//!
//! let session = config.into_session_config()?;
//! println!("Connecting to {:?}", session.endpoint);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod env;
mod merge;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::usp::{
    AuthConfig, AuthenticationKind, EndpointKind, OutputFormat, RecognitionMode, SessionConfig,
    TranslationConfig, UspResult,
};

/// Client configuration
///
/// Flat view of everything the command line client needs to open a session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: EndpointKind,
    pub endpoint_url: String,
    pub model_id: String,

    pub auth_kind: AuthenticationKind,
    pub auth_key: String,

    pub recognition_mode: RecognitionMode,
    pub output_format: OutputFormat,
    pub language: String,

    pub translation_from: String,
    /// Comma separated target languages
    pub translation_to: String,
    pub translation_voice: String,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("endpoint_url", &self.endpoint_url)
            .field("model_id", &self.model_id)
            .field("auth_kind", &self.auth_kind)
            .field("auth_key", &"<redacted>")
            .field("recognition_mode", &self.recognition_mode)
            .field("output_format", &self.output_format)
            .field("language", &self.language)
            .field("translation_from", &self.translation_from)
            .field("translation_to", &self.translation_to)
            .field("translation_voice", &self.translation_voice)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Reads the `USP_*` variables (see [`env`]). Missing values use defaults.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        merge::merge_config(None)
    }

    /// Load configuration from a YAML file with environment variable fallbacks
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the YAML file cannot be read or is malformed, or if
    /// a value names an unknown endpoint, authentication type, mode or format.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded into the environment by main.rs before this runs
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        merge::merge_config(Some(yaml_config))
    }

    /// Build the validated session configuration
    pub fn into_session_config(self) -> UspResult<SessionConfig> {
        let config = SessionConfig {
            endpoint: self.endpoint,
            endpoint_url: self.endpoint_url,
            model_id: self.model_id,
            output_format: self.output_format,
            recognition_mode: self.recognition_mode,
            language: self.language,
            translation: TranslationConfig {
                source_language: self.translation_from,
                target_languages: self.translation_to,
                voice: self.translation_voice,
            },
            auth: AuthConfig {
                kind: self.auth_kind,
                credential: self.auth_key,
            },
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env as std_env;
    use std::fs;
    use tempfile::TempDir;

    use crate::core::usp::UspError;

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for name in env::ALL {
                std_env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.endpoint, EndpointKind::BingSpeech);
        assert_eq!(config.auth_kind, AuthenticationKind::SubscriptionKey);
        assert_eq!(config.recognition_mode, RecognitionMode::Interactive);
        assert_eq!(config.output_format, OutputFormat::Simple);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();

        unsafe {
            std_env::set_var(env::ENDPOINT, "translation");
            std_env::set_var(env::AUTH_TYPE, "authorization_token");
            std_env::set_var(env::AUTH_KEY, "env-token");
            std_env::set_var(env::OUTPUT_FORMAT, "detailed");
            std_env::set_var(env::TRANSLATION_FROM, "en-US");
            std_env::set_var(env::TRANSLATION_TO, "de,fr");
        }

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.endpoint, EndpointKind::Translation);
        assert_eq!(config.auth_kind, AuthenticationKind::AuthorizationToken);
        assert_eq!(config.auth_key, "env-token");
        assert_eq!(config.output_format, OutputFormat::Detailed);
        assert_eq!(config.translation_to, "de,fr");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_endpoint() {
        cleanup_env_vars();

        unsafe {
            std_env::set_var(env::ENDPOINT, "carrier-pigeon");
        }

        let err = ClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("Unknown endpoint type"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("usp.yaml");

        let yaml_content = r#"
endpoint:
  kind: "cris"
  model_id: "abc123"

auth:
  key: "yaml-key"

recognition:
  mode: "conversation"
  language: "en-US"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        let config = ClientConfig::from_file(&config_path).unwrap();

        assert_eq!(config.endpoint, EndpointKind::Cris);
        assert_eq!(config.model_id, "abc123");
        assert_eq!(config.auth_key, "yaml-key");
        assert_eq!(config.recognition_mode, RecognitionMode::Conversation);
        assert_eq!(config.language, "en-US");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("usp.yaml");

        let yaml_content = r#"
auth:
  key: "yaml-key"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            std_env::set_var(env::AUTH_KEY, "env-key");
            std_env::set_var(env::LANGUAGE, "fr-FR");
        }

        let config = ClientConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.auth_key, "yaml-key");
        // ENV fills the gaps
        assert_eq!(config.language, "fr-FR");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/usp.yaml");
        let result = ClientConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }

    #[test]
    fn test_into_session_config() {
        let config = ClientConfig {
            endpoint: EndpointKind::Translation,
            auth_key: "key".to_string(),
            translation_from: "en-US".to_string(),
            translation_to: "de".to_string(),
            translation_voice: "de-DE-Katja".to_string(),
            ..Default::default()
        };

        let session = config.into_session_config().unwrap();
        assert_eq!(session.endpoint, EndpointKind::Translation);
        assert_eq!(session.translation.source_language, "en-US");
        assert_eq!(session.translation.voice, "de-DE-Katja");
        assert_eq!(session.auth.credential, "key");
    }

    #[test]
    fn test_into_session_config_validates() {
        let missing_key = ClientConfig::default();
        assert!(matches!(
            missing_key.into_session_config(),
            Err(UspError::InvalidArgument(_))
        ));

        let missing_url = ClientConfig {
            endpoint: EndpointKind::Custom,
            auth_key: "key".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            missing_url.into_session_config(),
            Err(UspError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ClientConfig {
            auth_key: "super-secret".to_string(),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
