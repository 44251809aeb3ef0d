//! The provider-agnostic request/response shapes every adapter translates
//! to and from its own wire format.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use batch_core::api::APIPart;

/// What `APIHandler` hands an adapter's `generate` for one `APICall`.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
  pub model_name: String,
  pub parts: Vec<APIPart>,
  pub shared_parts: Vec<APIPart>,
  pub api_config: BTreeMap<String, Value>,
  pub cache_name_to_use: Option<String>,
}

/// What an adapter hands back. `raw` is threaded verbatim into
/// `FinalizedCommand.raw_api_response` (per-call, merged by the executor
/// into the batch shape `ResultBuilder` expects); `usage` feeds token
/// validation telemetry.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
  pub text: Option<String>,
  pub structured: Option<Value>,
  pub batch: Option<Vec<ProviderResponse>>,
  pub usage: BTreeMap<String, Value>,
  pub raw: Value,
}

impl ProviderResponse {
  pub fn text(text: impl Into<String>) -> Self {
    let text = text.into();
    Self {
      raw: serde_json::json!({ "text": text }),
      text: Some(text),
      structured: None,
      batch: None,
      usage: BTreeMap::new(),
    }
  }

  pub fn with_usage(mut self, usage: BTreeMap<String, Value>) -> Self {
    self.usage = usage;
    self
  }
}

/// A request to materialize a cache of shared content ahead of generation.
#[derive(Debug, Clone)]
pub struct CacheCreateRequest {
  pub model_name: String,
  pub parts: Vec<APIPart>,
  pub system_instruction: Option<String>,
  pub ttl: Duration,
}
