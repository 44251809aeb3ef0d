//! [`build_provider_config`]: the only boundary where provider-specific
//! client-construction shape is touched.

use std::collections::BTreeMap;

use batch_core::config::FrozenConfig;
use serde_json::Value;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Produce the adapter-specific construction arguments (base URL, auth
/// header shape, timeout) for `provider` from a resolved `FrozenConfig`.
/// The core never branches on provider name outside this function and
/// [`crate::registry`].
pub fn build_provider_config(provider: &str, config: &FrozenConfig) -> BTreeMap<String, Value> {
  let mut out = BTreeMap::new();
  out.insert("request_timeout_s".to_string(), Value::from(config.request_timeout_s));
  match provider {
    "openai" => {
      out.insert("base_url".to_string(), Value::from(OPENAI_BASE_URL));
      out.insert("auth_header".to_string(), Value::from("Authorization"));
      out.insert("auth_scheme".to_string(), Value::from("Bearer"));
    }
    "anthropic" => {
      out.insert("base_url".to_string(), Value::from(ANTHROPIC_BASE_URL));
      out.insert("auth_header".to_string(), Value::from("x-api-key"));
      out.insert("auth_scheme".to_string(), Value::from(""));
    }
    _ => {
      out.insert("base_url".to_string(), Value::from(GEMINI_BASE_URL));
      out.insert("auth_header".to_string(), Value::from("x-goog-api-key"));
      out.insert("auth_scheme".to_string(), Value::from(""));
    }
  }
  if let Some(api_key) = &config.api_key {
    out.insert("api_key".to_string(), Value::from(api_key.as_str()));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn openai_config_uses_bearer_auth() {
    let config = FrozenConfig {
      provider: "openai".to_string(),
      api_key: Some("sk-test".to_string()),
      ..FrozenConfig::default()
    };
    let built = build_provider_config("openai", &config);
    assert_eq!(built.get("auth_scheme").and_then(Value::as_str), Some("Bearer"));
    assert_eq!(built.get("base_url").and_then(Value::as_str), Some(OPENAI_BASE_URL));
  }

  #[test]
  fn unknown_provider_falls_back_to_gemini_shape() {
    let config = FrozenConfig::default();
    let built = build_provider_config("google", &config);
    assert_eq!(built.get("base_url").and_then(Value::as_str), Some(GEMINI_BASE_URL));
  }
}
