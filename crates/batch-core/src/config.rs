//! [`FrozenConfig`]: the immutable, fully-resolved configuration bundle,
//! plus the [`resolve_config`] precedence chain and [`resolve_provider`]
//! model-name inference table.

use std::env;

use crate::error::{hints, ConfigurationError};

/// Env vars consulted per provider, in the order `resolve_provider` checks
/// them against a model name.
const PROVIDER_ENV_VARS: &[(&str, &str)] =
  &[("google", "GEMINI_API_KEY"), ("openai", "OPENAI_API_KEY"), ("anthropic", "ANTHROPIC_API_KEY")];

/// Explicit overrides a caller may pass into [`resolve_config`]; any field
/// left `None` falls through to the matching environment variable, then to
/// a built-in default.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
  pub provider: Option<String>,
  pub model: Option<String>,
  pub api_key: Option<String>,
  pub use_real_api: Option<bool>,
  pub use_mock: Option<bool>,
  pub enable_caching: Option<bool>,
  pub request_concurrency: Option<i64>,
  pub request_timeout_s: Option<f64>,
  pub tier: Option<String>,
}

/// The fully-resolved, read-only configuration every stage consults.
/// Construct only through [`resolve_config`]; there is no public
/// constructor that bypasses the precedence chain.
#[derive(Debug, Clone)]
pub struct FrozenConfig {
  pub provider: String,
  pub model: String,
  pub api_key: Option<String>,
  pub use_real_api: bool,
  pub use_mock: bool,
  pub enable_caching: bool,
  pub request_concurrency: i64,
  pub request_timeout_s: f64,
  pub tier: String,
}

impl Default for FrozenConfig {
  fn default() -> Self {
    Self {
      provider: "google".to_string(),
      model: "gemini-2.0-flash".to_string(),
      api_key: None,
      use_real_api: false,
      use_mock: true,
      enable_caching: true,
      request_concurrency: 0,
      request_timeout_s: 30.0,
      tier: "free".to_string(),
    }
  }
}

/// Map a model name to its provider string by prefix, defaulting to
/// `"google"` when the model name is empty or unrecognized. Matching is
/// case-insensitive.
pub fn resolve_provider(model: &str) -> &'static str {
  let lower = model.to_ascii_lowercase();
  if lower.starts_with("gpt") {
    "openai"
  } else if lower.starts_with("claude") {
    "anthropic"
  } else if lower.starts_with("gemini") || lower.is_empty() {
    "google"
  } else {
    "google"
  }
}

fn env_var_for_provider(provider: &str) -> Option<&'static str> {
  PROVIDER_ENV_VARS.iter().find(|(p, _)| *p == provider).map(|(_, var)| *var)
}

/// Resolve `overrides` against environment variables and defaults, in
/// precedence order: explicit overrides > environment variables >
/// defaults. Pure given a fixed environment: identical `overrides` and
/// identical env vars always yield an identical `FrozenConfig`.
///
/// Returns [`ConfigurationError`] when `use_real_api` resolves `true` but
/// no `api_key` can be resolved from either the override or the
/// provider's environment variable.
pub fn resolve_config(overrides: ConfigOverrides) -> Result<FrozenConfig, ConfigurationError> {
  let defaults = FrozenConfig::default();

  let model = overrides.model.unwrap_or(defaults.model);
  let provider = overrides.provider.unwrap_or_else(|| resolve_provider(&model).to_string());

  let api_key = overrides.api_key.or_else(|| {
    env_var_for_provider(&provider).and_then(|var| env::var(var).ok()).filter(|v| !v.is_empty())
  });

  let use_real_api = overrides.use_real_api.unwrap_or(defaults.use_real_api);
  let use_mock = overrides.use_mock.unwrap_or(!use_real_api);
  let enable_caching = overrides.enable_caching.unwrap_or(defaults.enable_caching);
  let request_concurrency = overrides.request_concurrency.unwrap_or(defaults.request_concurrency);
  let request_timeout_s = overrides.request_timeout_s.unwrap_or(defaults.request_timeout_s);
  let tier = overrides.tier.unwrap_or(defaults.tier);

  if use_real_api && api_key.is_none() {
    return Err(
      ConfigurationError::new("api_key is required when use_real_api=True").with_hint(hints::MISSING_API_KEY),
    );
  }

  Ok(FrozenConfig {
    provider,
    model,
    api_key,
    use_real_api,
    use_mock,
    enable_caching,
    request_concurrency,
    request_timeout_s,
    tier,
  })
}

/// A redacted, human-readable summary of `config` for diagnostics: the
/// only supported introspection into a `FrozenConfig`. The API key, if
/// present, is masked to its last four characters.
pub fn audit_text(config: &FrozenConfig) -> String {
  let masked_key = match &config.api_key {
    Some(key) if key.len() > 4 => format!("****{}", &key[key.len() - 4..]),
    Some(_) => "****".to_string(),
    None => "<unset>".to_string(),
  };
  format!(
    "provider={} model={} api_key={} use_real_api={} use_mock={} enable_caching={} \
     request_concurrency={} request_timeout_s={} tier={}",
    config.provider,
    config.model,
    masked_key,
    config.use_real_api,
    config.use_mock,
    config.enable_caching,
    config.request_concurrency,
    config.request_timeout_s,
    config.tier,
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolve_provider_matches_boundary_scenario_table() {
    assert_eq!(resolve_provider("gemini-1.5-flash"), "google");
    assert_eq!(resolve_provider("gpt-4"), "openai");
    assert_eq!(resolve_provider("claude-3-sonnet"), "anthropic");
    assert_eq!(resolve_provider(""), "google");
  }

  #[test]
  fn resolve_provider_is_case_insensitive() {
    assert_eq!(resolve_provider("GPT-4"), "openai");
    assert_eq!(resolve_provider("Claude-3"), "anthropic");
  }

  #[test]
  fn missing_api_key_with_real_api_is_configuration_error() {
    let overrides = ConfigOverrides {
      use_real_api: Some(true),
      api_key: None,
      provider: Some("google".to_string()),
      ..Default::default()
    };
    // SAFETY-equivalent: clear the provider env var so this test is
    // hermetic regardless of the host environment.
    unsafe { env::remove_var("GEMINI_API_KEY") };
    let err = resolve_config(overrides).unwrap_err();
    assert!(err.message.contains("api_key is required when use_real_api=True"));
    assert_eq!(err.hint.as_deref(), Some(hints::MISSING_API_KEY));
  }

  #[test]
  fn resolve_config_is_pure() {
    let a = resolve_config(ConfigOverrides::default()).unwrap();
    let b = resolve_config(ConfigOverrides::default()).unwrap();
    assert_eq!(a.provider, b.provider);
    assert_eq!(a.model, b.model);
    assert_eq!(a.use_real_api, b.use_real_api);
  }

  #[test]
  fn audit_text_masks_api_key() {
    let config = FrozenConfig {
      api_key: Some("sk-ant-secretvalue1234".to_string()),
      ..FrozenConfig::default()
    };
    let text = audit_text(&config);
    assert!(text.contains("****1234"));
    assert!(!text.contains("secretvalue"));
  }

  #[test]
  fn explicit_overrides_beat_defaults() {
    let overrides = ConfigOverrides {
      request_concurrency: Some(7),
      tier: Some("tier1".to_string()),
      ..Default::default()
    };
    let config = resolve_config(overrides).unwrap();
    assert_eq!(config.request_concurrency, 7);
    assert_eq!(config.tier, "tier1");
  }
}
