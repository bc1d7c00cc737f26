//! USP session configuration.
//!
//! This module defines the immutable configuration a [`Connection`](super::Connection)
//! is created with: which service endpoint to talk to, how results are
//! formatted, which recognition mode and language to use, translation
//! parameters and the authentication credential.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::base::{UspError, UspResult};

// =============================================================================
// Endpoint
// =============================================================================

/// Service endpoint a session connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    /// Public speech recognition service.
    #[default]
    BingSpeech,
    /// Custom speech service, addressed through a model id qualified host.
    Cris,
    /// Speech translation service.
    Translation,
    /// Device speech service (audio responses, device user agent).
    Cdsdk,
    /// Caller supplied URL, used verbatim.
    Custom,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BingSpeech => "bing-speech",
            Self::Cris => "cris",
            Self::Translation => "translation",
            Self::Cdsdk => "cdsdk",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EndpointKind {
    type Err = UspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bing-speech" | "bing_speech" | "bing" | "speech" => Ok(Self::BingSpeech),
            "cris" | "custom-speech" => Ok(Self::Cris),
            "translation" | "translator" => Ok(Self::Translation),
            "cdsdk" | "device" => Ok(Self::Cdsdk),
            "custom" | "url" => Ok(Self::Custom),
            _ => Err(UspError::InvalidArgument(format!(
                "Unknown endpoint type: {s}"
            ))),
        }
    }
}

// =============================================================================
// Recognition Options
// =============================================================================

/// Verbosity of recognition results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Simple,
    Detailed,
}

impl OutputFormat {
    /// Query parameter carrying this format.
    pub fn query_param(&self) -> &'static str {
        match self {
            Self::Simple => "format=simple",
            Self::Detailed => "format=detailed",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = UspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "detailed" => Ok(Self::Detailed),
            _ => Err(UspError::InvalidArgument(format!(
                "Unknown output format: {s}"
            ))),
        }
    }
}

/// Recognition mode, selects the service path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    #[default]
    Interactive,
    Conversation,
    Dictation,
}

impl RecognitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Conversation => "conversation",
            Self::Dictation => "dictation",
        }
    }
}

impl std::str::FromStr for RecognitionMode {
    type Err = UspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "conversation" => Ok(Self::Conversation),
            "dictation" => Ok(Self::Dictation),
            _ => Err(UspError::InvalidArgument(format!(
                "Unknown recognition mode: {s}"
            ))),
        }
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// How the credential is presented to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticationKind {
    #[default]
    SubscriptionKey,
    AuthorizationToken,
    SearchDelegationRpsToken,
}

impl std::str::FromStr for AuthenticationKind {
    type Err = UspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "subscription-key" | "subscription_key" | "key" => Ok(Self::SubscriptionKey),
            "authorization-token" | "authorization_token" | "token" | "bearer" => {
                Ok(Self::AuthorizationToken)
            }
            "search-delegation-rps-token"
            | "search_delegation_rps_token"
            | "delegation-token"
            | "delegation_token"
            | "rps" => {
                Ok(Self::SearchDelegationRpsToken)
            }
            _ => Err(UspError::RuntimeError(format!(
                "Unsupported authentication type: {s}"
            ))),
        }
    }
}

/// Authentication kind plus its credential.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub kind: AuthenticationKind,
    pub credential: String,
}

impl AuthConfig {
    pub fn subscription_key(key: impl Into<String>) -> Self {
        Self {
            kind: AuthenticationKind::SubscriptionKey,
            credential: key.into(),
        }
    }

    pub fn authorization_token(token: impl Into<String>) -> Self {
        Self {
            kind: AuthenticationKind::AuthorizationToken,
            credential: token.into(),
        }
    }

    pub fn delegation_token(token: impl Into<String>) -> Self {
        Self {
            kind: AuthenticationKind::SearchDelegationRpsToken,
            credential: token.into(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("kind", &self.kind)
            .field("credential", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Translation
// =============================================================================

/// Translation parameters, only used with [`EndpointKind::Translation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Source language tag (e.g. "en-US").
    pub source_language: String,
    /// Comma separated target language tags, in request order.
    pub target_languages: String,
    /// Synthesis voice; empty disables synthesized audio.
    #[serde(default)]
    pub voice: String,
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Immutable configuration of one USP session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub endpoint: EndpointKind,

    /// Full URL, required for [`EndpointKind::Custom`].
    #[serde(default)]
    pub endpoint_url: String,

    /// Custom speech model id; also sent as `cid` to the translation service.
    #[serde(default)]
    pub model_id: String,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default)]
    pub recognition_mode: RecognitionMode,

    /// Recognition language; empty leaves the service default.
    #[serde(default)]
    pub language: String,

    #[serde(default)]
    pub translation: TranslationConfig,

    pub auth: AuthConfig,
}

impl SessionConfig {
    /// Configuration for a speech endpoint with a subscription key.
    pub fn new(endpoint: EndpointKind, auth: AuthConfig) -> Self {
        Self {
            endpoint,
            auth,
            ..Default::default()
        }
    }

    /// Configuration for the translation endpoint.
    pub fn translation(
        auth: AuthConfig,
        source_language: impl Into<String>,
        target_languages: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: EndpointKind::Translation,
            translation: TranslationConfig {
                source_language: source_language.into(),
                target_languages: target_languages.into(),
                voice: String::new(),
            },
            auth,
            ..Default::default()
        }
    }

    /// Configuration for a caller supplied endpoint URL.
    pub fn custom(url: impl Into<String>, auth: AuthConfig) -> Self {
        Self {
            endpoint: EndpointKind::Custom,
            endpoint_url: url.into(),
            auth,
            ..Default::default()
        }
    }

    /// Check the configuration invariants.
    ///
    /// Fails with [`UspError::InvalidArgument`] when a custom endpoint has no
    /// URL or no credential is present. Options the chosen endpoint ignores
    /// are only logged.
    pub fn validate(&self) -> UspResult<()> {
        if self.endpoint == EndpointKind::Cris && !self.language.is_empty() {
            info!("Language option for the custom speech service is not supported and will be ignored");
        }

        if !matches!(self.endpoint, EndpointKind::Cris | EndpointKind::Translation)
            && !self.model_id.is_empty()
        {
            info!("Model id is only used with custom speech or translation endpoints and will be ignored");
        }

        if self.endpoint == EndpointKind::Custom && self.endpoint_url.is_empty() {
            return Err(UspError::InvalidArgument(
                "No valid endpoint was specified.".to_string(),
            ));
        }

        if self.auth.credential.is_empty() {
            return Err(UspError::InvalidArgument(
                "No valid authentication mechanism was specified.".to_string(),
            ));
        }

        Ok(())
    }
}
