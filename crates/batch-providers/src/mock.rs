//! [`MockAdapter`]: the deterministic echo adapter selected whenever
//! `config.use_real_api` is false. Mock mode still exercises every
//! pipeline stage — only `generate` itself is faked.

use async_trait::async_trait;
use batch_core::error::ApiError;
use serde_json::{Value, json};

use crate::adapter::ProviderAdapter;
use crate::request::{ProviderRequest, ProviderResponse};

pub struct MockAdapter;

#[async_trait]
impl ProviderAdapter for MockAdapter {
  fn provider_name(&self) -> &'static str {
    "mock"
  }

  async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ApiError> {
    if let Some(Value::Array(prompts)) = request.api_config.get("prompts") {
      let batch: Vec<ProviderResponse> = prompts
        .iter()
        .map(|p| ProviderResponse::text(format!("echo: {}", p.as_str().unwrap_or_default())))
        .collect();
      let raw = json!({ "batch": batch.iter().map(|r| json!({"text": r.text})).collect::<Vec<_>>() });
      return Ok(ProviderResponse {
        text: None,
        structured: None,
        batch: Some(batch),
        usage: mock_usage(&request),
        raw,
      });
    }

    let prompt = request
      .api_config
      .get("prompt")
      .and_then(Value::as_str)
      .unwrap_or("")
      .to_string();
    Ok(ProviderResponse::text(format!("echo: {prompt}")).with_usage(mock_usage(&request)))
  }
}

/// Deterministic token usage proportional to the visible parts, so
/// token-validation telemetry has a plausible `actual`
/// to compare against the planner's estimate even in mock mode.
fn mock_usage(request: &ProviderRequest) -> std::collections::BTreeMap<String, Value> {
  let chars: usize = request
    .parts
    .iter()
    .map(|part| match part {
      batch_core::api::APIPart::TextPart { text } => text.len(),
      _ => 0,
    })
    .sum::<usize>()
    + request
      .api_config
      .get("prompt")
      .and_then(Value::as_str)
      .map(str::len)
      .unwrap_or(0)
    + request
      .api_config
      .get("prompts")
      .and_then(Value::as_array)
      .map(|prompts| prompts.iter().filter_map(Value::as_str).map(str::len).sum())
      .unwrap_or(0);
  let total = ((chars / 4) as u64).max(1);
  let mut usage = std::collections::BTreeMap::new();
  usage.insert("total_token_count".to_string(), Value::from(total));
  usage
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  #[tokio::test]
  async fn single_prompt_echoes() {
    let adapter = MockAdapter;
    let mut api_config = BTreeMap::new();
    api_config.insert("prompt".to_string(), Value::from("Echo me"));
    let request = ProviderRequest {
      model_name: "gemini-2.0-flash".to_string(),
      parts: vec![],
      shared_parts: vec![],
      api_config,
      cache_name_to_use: None,
    };
    let response = adapter.generate(request).await.unwrap();
    assert_eq!(response.text.as_deref(), Some("echo: Echo me"));
  }

  #[tokio::test]
  async fn vectorized_prompts_produce_batch() {
    let adapter = MockAdapter;
    let mut api_config = BTreeMap::new();
    api_config.insert("prompts".to_string(), json!(["A", "B"]));
    let request = ProviderRequest {
      model_name: "gemini-2.0-flash".to_string(),
      parts: vec![],
      shared_parts: vec![],
      api_config,
      cache_name_to_use: None,
    };
    let response = adapter.generate(request).await.unwrap();
    let batch = response.batch.unwrap();
    assert_eq!(batch[0].text.as_deref(), Some("echo: A"));
    assert_eq!(batch[1].text.as_deref(), Some("echo: B"));
  }
}
