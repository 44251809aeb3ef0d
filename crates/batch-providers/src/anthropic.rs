//! [`AnthropicAdapter`]: minimal adapter with no uploads or caching
//! capability (neither is supported for Anthropic here).

use std::collections::BTreeMap;

use async_trait::async_trait;
use batch_core::api::APIPart;
use batch_core::error::{ApiError, get_http_error_hint};
use reqwest::Client;
use serde_json::{Value, json};

use crate::adapter::ProviderAdapter;
use crate::request::{ProviderRequest, ProviderResponse};

pub struct AnthropicAdapter {
  client: Client,
  base_url: String,
  api_key: Option<String>,
}

impl AnthropicAdapter {
  pub fn new(client: Client, config: &BTreeMap<String, Value>) -> Self {
    Self {
      client,
      base_url: config
        .get("base_url")
        .and_then(Value::as_str)
        .unwrap_or("https://api.anthropic.com/v1")
        .to_string(),
      api_key: config.get("api_key").and_then(Value::as_str).map(str::to_string),
    }
  }

  fn build_content(parts: &[APIPart]) -> Vec<Value> {
    parts
      .iter()
      .map(|part| match part {
        APIPart::TextPart { text } => json!({ "type": "text", "text": text }),
        APIPart::FileRefPart { uri, mime } => json!({ "type": "image", "source": { "url": uri, "media_type": mime } }),
        APIPart::FilePlaceholder { identifier, .. } => {
          unreachable!("unresolved FilePlaceholder for {identifier} reached the adapter")
        }
      })
      .collect()
  }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
  fn provider_name(&self) -> &'static str {
    "anthropic"
  }

  async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ApiError> {
    let body = json!({
      "model": request.model_name,
      "max_tokens": request.api_config.get("max_tokens").cloned().unwrap_or(json!(1024)),
      "messages": [{ "role": "user", "content": Self::build_content(&request.parts) }],
    });

    let url = format!("{}/messages", self.base_url);
    let mut req = self.client.post(&url).json(&body).header("anthropic-version", "2023-06-01");
    if let Some(key) = &self.api_key {
      req = req.header("x-api-key", key);
    }
    let response = req
      .send()
      .await
      .map_err(|e| ApiError::new(format!("anthropic transport error: {e}")).with_provider("anthropic"))?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
      let body_text = response.text().await.unwrap_or_default();
      let mut err = ApiError::new(body_text).with_status_code(status).with_provider("anthropic");
      if let Some(hint) = get_http_error_hint(status) {
        err = err.with_hint(hint);
      }
      return Err(err.with_retryable(batch_core::error::is_retryable_status(status)));
    }

    let raw: Value = response
      .json()
      .await
      .map_err(|e| ApiError::new(format!("anthropic response parse error: {e}")).with_provider("anthropic"))?;

    let text = raw.pointer("/content/0/text").and_then(Value::as_str).map(str::to_string);
    let mut usage = BTreeMap::new();
    if let (Some(input), Some(output)) = (
      raw.pointer("/usage/input_tokens").and_then(Value::as_u64),
      raw.pointer("/usage/output_tokens").and_then(Value::as_u64),
    ) {
      usage.insert("total_token_count".to_string(), Value::from(input + output));
    }

    Ok(ProviderResponse {
      text,
      structured: None,
      batch: None,
      usage,
      raw,
    })
  }
}
