use std::str::FromStr;

use super::ClientConfig;
use super::env::EnvConfig;
use super::yaml::YamlConfig;

/// Merge environment values with optional YAML overrides.
///
/// YAML wins over the environment; missing values fall back to defaults.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load();
    let yaml = yaml.unwrap_or_default();

    let endpoint = yaml.endpoint.unwrap_or_default();
    let auth = yaml.auth.unwrap_or_default();
    let recognition = yaml.recognition.unwrap_or_default();
    let translation = yaml.translation.unwrap_or_default();

    let defaults = ClientConfig::default();

    Ok(ClientConfig {
        endpoint: parse_or(endpoint.kind.or(env.endpoint), defaults.endpoint)?,
        endpoint_url: endpoint.url.or(env.endpoint_url).unwrap_or_default(),
        model_id: endpoint.model_id.or(env.model_id).unwrap_or_default(),
        auth_kind: parse_or(auth.kind.or(env.auth_type), defaults.auth_kind)?,
        auth_key: auth.key.or(env.auth_key).unwrap_or_default(),
        recognition_mode: parse_or(
            recognition.mode.or(env.recognition_mode),
            defaults.recognition_mode,
        )?,
        output_format: parse_or(
            recognition.format.or(env.output_format),
            defaults.output_format,
        )?,
        language: recognition.language.or(env.language).unwrap_or_default(),
        translation_from: translation.from.or(env.translation_from).unwrap_or_default(),
        translation_to: translation.to.or(env.translation_to).unwrap_or_default(),
        translation_voice: translation.voice.or(env.translation_voice).unwrap_or_default(),
    })
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::error::Error + 'static,
{
    match value {
        Some(value) => Ok(value.trim().parse::<T>()?),
        None => Ok(default),
    }
}
