//! [`select_adapter`]: the one place that turns a provider string into a
//! live adapter instance. The core never branches on provider name outside
//! this seam and [`crate::config::build_provider_config`].

use std::sync::Arc;

use batch_core::config::FrozenConfig;
use reqwest::Client;

use crate::adapter::ProviderAdapter;
use crate::anthropic::AnthropicAdapter;
use crate::config::build_provider_config;
use crate::gemini::GeminiAdapter;
use crate::mock::MockAdapter;
use crate::openai::OpenAiAdapter;

/// Select the adapter `config` describes: the mock echo adapter whenever
/// `use_real_api` is false (`use_mock` implies the same, but `use_real_api`
/// is the authoritative switch), otherwise the adapter registered
/// under `config.provider`.
pub fn select_adapter(config: &FrozenConfig) -> Arc<dyn ProviderAdapter> {
  if !config.use_real_api || config.use_mock {
    return Arc::new(MockAdapter);
  }
  let client = Client::new();
  let provider_config = build_provider_config(&config.provider, config);
  match config.provider.as_str() {
    "openai" => Arc::new(OpenAiAdapter::new(client, &provider_config)),
    "anthropic" => Arc::new(AnthropicAdapter::new(client, &provider_config)),
    _ => Arc::new(GeminiAdapter::new(client, &provider_config)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mock_selected_when_use_real_api_false() {
    let config = FrozenConfig {
      use_real_api: false,
      ..FrozenConfig::default()
    };
    assert_eq!(select_adapter(&config).provider_name(), "mock");
  }

  #[test]
  fn real_api_selects_by_provider_string() {
    let config = FrozenConfig {
      use_real_api: true,
      use_mock: false,
      provider: "openai".to_string(),
      api_key: Some("sk-test".to_string()),
      ..FrozenConfig::default()
    };
    assert_eq!(select_adapter(&config).provider_name(), "openai");
  }
}
