use std::env;

pub const ENDPOINT: &str = "USP_ENDPOINT";
pub const ENDPOINT_URL: &str = "USP_ENDPOINT_URL";
pub const MODEL_ID: &str = "USP_MODEL_ID";
pub const AUTH_TYPE: &str = "USP_AUTH_TYPE";
pub const AUTH_KEY: &str = "USP_AUTH_KEY";
pub const RECOGNITION_MODE: &str = "USP_RECOGNITION_MODE";
pub const OUTPUT_FORMAT: &str = "USP_OUTPUT_FORMAT";
pub const LANGUAGE: &str = "USP_LANGUAGE";
pub const TRANSLATION_FROM: &str = "USP_TRANSLATION_FROM";
pub const TRANSLATION_TO: &str = "USP_TRANSLATION_TO";
pub const TRANSLATION_VOICE: &str = "USP_TRANSLATION_VOICE";

/// Every variable read by [`EnvConfig::load`].
pub const ALL: [&str; 11] = [
    ENDPOINT,
    ENDPOINT_URL,
    MODEL_ID,
    AUTH_TYPE,
    AUTH_KEY,
    RECOGNITION_MODE,
    OUTPUT_FORMAT,
    LANGUAGE,
    TRANSLATION_FROM,
    TRANSLATION_TO,
    TRANSLATION_VOICE,
];

/// Raw configuration values taken from the environment.
///
/// `.env` values are already part of the environment at this point, they are
/// loaded by the binary at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub endpoint: Option<String>,
    pub endpoint_url: Option<String>,
    pub model_id: Option<String>,
    pub auth_type: Option<String>,
    pub auth_key: Option<String>,
    pub recognition_mode: Option<String>,
    pub output_format: Option<String>,
    pub language: Option<String>,
    pub translation_from: Option<String>,
    pub translation_to: Option<String>,
    pub translation_voice: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        Self {
            endpoint: var(ENDPOINT),
            endpoint_url: var(ENDPOINT_URL),
            model_id: var(MODEL_ID),
            auth_type: var(AUTH_TYPE),
            auth_key: var(AUTH_KEY),
            recognition_mode: var(RECOGNITION_MODE),
            output_format: var(OUTPUT_FORMAT),
            language: var(LANGUAGE),
            translation_from: var(TRANSLATION_FROM),
            translation_to: var(TRANSLATION_TO),
            translation_voice: var(TRANSLATION_VOICE),
        }
    }
}

/// Non-empty value of an environment variable.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
