//! Connection URL and authentication header construction.

use http::header::{AUTHORIZATION, USER_AGENT};
use http::{HeaderName, HeaderValue};
use tracing::debug;

use super::base::{UspError, UspResult};
use super::config::{AuthenticationKind, EndpointKind, SessionConfig};

// =============================================================================
// Constants
// =============================================================================

pub const PROTOCOL: &str = "wss://";

pub const BING_SPEECH_HOST: &str = "speech.platform.bing.com";

/// Appended to the model id to form the custom speech host.
pub const CRIS_HOST_SUFFIX: &str = ".api.cris.ai";

pub const TRANSLATION_HOST: &str = "dev.microsofttranslator.com";

pub const CDSDK_HOST: &str = "speech.platform.bing.com/cortana/api/v1";

const PATH_PREFIX: &str = "/speech/recognition/";
const PATH_SUFFIX: &str = "/cognitiveservices/v1?";
const TRANSLATION_PATH: &str = "/speech/translate?api-version=1.0&";

/// Audio format requested from the device endpoint.
pub const CDSDK_AUDIO_RESPONSE_FORMAT: &str = "riff-16khz-16bit-mono-pcm";

pub const USER_AGENT_VALUE: &str = concat!("waav-usp/", env!("CARGO_PKG_VERSION"));

pub const SUBSCRIPTION_KEY_HEADER: HeaderName = HeaderName::from_static("ocp-apim-subscription-key");
pub const DELEGATION_TOKEN_HEADER: HeaderName =
    HeaderName::from_static("x-search-delegationrpstoken");
pub const AUDIO_RESPONSE_FORMAT_HEADER: HeaderName =
    HeaderName::from_static("x-output-audiocodec");

/// Ordered handshake headers.
pub type ConnectionHeaders = Vec<(HeaderName, HeaderValue)>;

// =============================================================================
// URL
// =============================================================================

/// Build the WebSocket URL for a session.
///
/// Custom endpoints return the configured URL untouched. For everything else
/// only spaces are escaped (`%20`); no other character is encoded.
pub fn build_connection_url(config: &SessionConfig) -> String {
    let mode = config.recognition_mode.as_str();
    let mut url = String::from(PROTOCOL);

    match config.endpoint {
        EndpointKind::BingSpeech => {
            url.push_str(BING_SPEECH_HOST);
            url.push_str(PATH_PREFIX);
            url.push_str(mode);
            url.push_str(PATH_SUFFIX);
        }
        EndpointKind::Cris => {
            url.push_str(&config.model_id);
            url.push_str(CRIS_HOST_SUFFIX);
            url.push_str(PATH_PREFIX);
            url.push_str(mode);
            url.push_str(PATH_SUFFIX);
        }
        EndpointKind::Translation => {
            url.push_str(TRANSLATION_HOST);
            url.push_str(TRANSLATION_PATH);
        }
        EndpointKind::Cdsdk => {
            url.push_str(CDSDK_HOST);
            return escape_spaces(&url);
        }
        EndpointKind::Custom => return config.endpoint_url.clone(),
    }

    // First query parameter, no leading '&'.
    url.push_str(config.output_format.query_param());

    if config.endpoint == EndpointKind::Translation {
        let translation = &config.translation;
        url.push_str("&from=");
        url.push_str(&translation.source_language);

        // Keeps order and empty segments, "en,,fr," yields four targets.
        for target in translation.target_languages.split(',') {
            url.push_str("&to=");
            url.push_str(target);
        }

        if !translation.voice.is_empty() {
            url.push_str("&features=requireVoice");
            url.push_str("&voice=");
            url.push_str(&translation.voice);
        }

        url.push_str("&cid=");
        url.push_str(&config.model_id);
    } else if !config.language.is_empty() {
        url.push_str("&language=");
        url.push_str(&config.language);
    }

    escape_spaces(&url)
}

fn escape_spaces(url: &str) -> String {
    url.replace(' ', "%20")
}

// =============================================================================
// Headers
// =============================================================================

/// Build the handshake headers carrying the session credential.
///
/// Device endpoints get the audio response format and user agent headers
/// ahead of the credential.
pub fn build_auth_headers(config: &SessionConfig) -> UspResult<ConnectionHeaders> {
    let mut headers = ConnectionHeaders::new();

    if config.endpoint == EndpointKind::Cdsdk {
        headers.push((
            AUDIO_RESPONSE_FORMAT_HEADER,
            HeaderValue::from_static(CDSDK_AUDIO_RESPONSE_FORMAT),
        ));
        headers.push((USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE)));
    }

    let credential = config.auth.credential.as_str();
    let header = match config.auth.kind {
        AuthenticationKind::SubscriptionKey => (
            SUBSCRIPTION_KEY_HEADER,
            sensitive_value(credential).ok_or_else(|| {
                UspError::RuntimeError(
                    "Failed to set authentication using subscription key.".to_string(),
                )
            })?,
        ),
        AuthenticationKind::AuthorizationToken => (
            AUTHORIZATION,
            sensitive_value(&format!("Bearer {credential}")).ok_or_else(|| {
                UspError::RuntimeError(
                    "Failed to set authentication using authorization token.".to_string(),
                )
            })?,
        ),
        AuthenticationKind::SearchDelegationRpsToken => (
            DELEGATION_TOKEN_HEADER,
            sensitive_value(credential).ok_or_else(|| {
                UspError::RuntimeError(
                    "Failed to set authentication using Search-DelegationRPSToken.".to_string(),
                )
            })?,
        ),
    };
    debug!("Using {} authentication header", header.0);
    headers.push(header);

    Ok(headers)
}

fn sensitive_value(value: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(value).ok()?;
    value.set_sensitive(true);
    Some(value)
}
