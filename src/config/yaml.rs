use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// endpoint:
///   kind: "translation"
///   url: "wss://speech.example.com/custom"
///   model_id: "my-model"
///
/// auth:
///   kind: "subscription_key"
///   key: "your-subscription-key"
///
/// recognition:
///   mode: "conversation"
///   format: "detailed"
///   language: "en-US"
///
/// translation:
///   from: "en-US"
///   to: "de,fr"
///   voice: "de-DE-Katja"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub endpoint: Option<EndpointYaml>,
    pub auth: Option<AuthYaml>,
    pub recognition: Option<RecognitionYaml>,
    pub translation: Option<TranslationYaml>,
}

/// Service endpoint from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EndpointYaml {
    /// One of `bing_speech`, `cris`, `translation`, `cdsdk`, `custom`
    pub kind: Option<String>,
    /// Full URL, only used by the `custom` kind
    pub url: Option<String>,
    pub model_id: Option<String>,
}

/// Credential from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    /// One of `subscription_key`, `authorization_token`, `delegation_token`
    pub kind: Option<String>,
    pub key: Option<String>,
}

/// Recognition options from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RecognitionYaml {
    pub mode: Option<String>,
    pub format: Option<String>,
    pub language: Option<String>,
}

/// Translation options from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TranslationYaml {
    pub from: Option<String>,
    /// Comma separated target languages
    pub to: Option<String>,
    pub voice: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
