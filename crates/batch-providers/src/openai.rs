//! [`OpenAiAdapter`] and [`to_strict_schema`], the JSON-schema tightening
//! pass OpenAI's structured-output mode requires.

use std::collections::BTreeMap;

use async_trait::async_trait;
use batch_core::api::APIPart;
use batch_core::error::{ApiError, get_http_error_hint};
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::adapter::ProviderAdapter;
use crate::request::{ProviderRequest, ProviderResponse};

/// Recursively tighten a JSON schema for OpenAI's strict structured-output
/// mode: every `type: "object"` node gets `additionalProperties: false` and
/// a `required` array covering every declared property (if it doesn't
/// already specify one), descending into `properties` and `items`.
///
/// Idempotent: `to_strict_schema(to_strict_schema(s)) == to_strict_schema(s)`
/// — re-running finds `additionalProperties` and `required` already
/// set and leaves them as-is.
pub fn to_strict_schema(schema: &Value) -> Value {
  let mut schema = schema.clone();
  tighten(&mut schema);
  schema
}

fn tighten(node: &mut Value) {
  match node {
    Value::Object(map) => {
      if map.get("type").and_then(Value::as_str) == Some("object") {
        map.entry("additionalProperties").or_insert(Value::Bool(false));
        if !map.contains_key("required") {
          let keys: Vec<Value> = map
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().map(Value::String).collect())
            .unwrap_or_default();
          map.insert("required".to_string(), Value::Array(keys));
        }
      }
      if let Some(Value::Object(props)) = map.get_mut("properties") {
        let props: &mut Map<String, Value> = props;
        for value in props.values_mut() {
          tighten(value);
        }
      }
      if let Some(items) = map.get_mut("items") {
        tighten(items);
      }
    }
    Value::Array(items) => {
      for item in items {
        tighten(item);
      }
    }
    _ => {}
  }
}

pub struct OpenAiAdapter {
  client: Client,
  base_url: String,
  api_key: Option<String>,
}

impl OpenAiAdapter {
  pub fn new(client: Client, config: &BTreeMap<String, Value>) -> Self {
    Self {
      client,
      base_url: config
        .get("base_url")
        .and_then(Value::as_str)
        .unwrap_or("https://api.openai.com/v1")
        .to_string(),
      api_key: config.get("api_key").and_then(Value::as_str).map(str::to_string),
    }
  }

  fn build_messages(parts: &[APIPart]) -> Vec<Value> {
    let content: Vec<Value> = parts
      .iter()
      .map(|part| match part {
        APIPart::TextPart { text } => json!({ "type": "text", "text": text }),
        APIPart::FileRefPart { uri, mime } => {
          json!({ "type": "image_url", "image_url": { "url": uri, "mime_type": mime } })
        }
        APIPart::FilePlaceholder { identifier, .. } => {
          unreachable!("unresolved FilePlaceholder for {identifier} reached the adapter")
        }
      })
      .collect();
    vec![json!({ "role": "user", "content": content })]
  }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
  fn provider_name(&self) -> &'static str {
    "openai"
  }

  async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ApiError> {
    let mut body = json!({
      "model": request.model_name,
      "messages": Self::build_messages(&request.parts),
    });
    if let Some(schema) = request.api_config.get("json_schema") {
      body["response_format"] = json!({
        "type": "json_schema",
        "json_schema": { "name": "response", "strict": true, "schema": to_strict_schema(schema) },
      });
    }
    if let Some(temperature) = request.api_config.get("temperature") {
      body["temperature"] = temperature.clone();
    }

    let url = format!("{}/chat/completions", self.base_url);
    debug!(model = %request.model_name, "openai generate request");
    let mut req = self.client.post(&url).json(&body);
    if let Some(key) = &self.api_key {
      req = req.bearer_auth(key);
    }
    let response = req
      .send()
      .await
      .map_err(|e| ApiError::new(format!("openai transport error: {e}")).with_provider("openai"))?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
      let body_text = response.text().await.unwrap_or_default();
      let mut err = ApiError::new(body_text).with_status_code(status).with_provider("openai");
      if let Some(hint) = get_http_error_hint(status) {
        err = err.with_hint(hint);
      }
      return Err(err.with_retryable(batch_core::error::is_retryable_status(status)));
    }

    let raw: Value = response
      .json()
      .await
      .map_err(|e| ApiError::new(format!("openai response parse error: {e}")).with_provider("openai"))?;

    let text = raw
      .pointer("/choices/0/message/content")
      .and_then(Value::as_str)
      .map(str::to_string);
    let mut usage = BTreeMap::new();
    if let Some(count) = raw.pointer("/usage/total_tokens") {
      usage.insert("total_token_count".to_string(), count.clone());
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

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tightens_nested_object_schema() {
    let schema = json!({
      "type": "object",
      "properties": {
        "name": { "type": "string" },
        "address": {
          "type": "object",
          "properties": { "city": { "type": "string" } }
        }
      }
    });
    let strict = to_strict_schema(&schema);
    assert_eq!(strict["additionalProperties"], json!(false));
    assert_eq!(strict["required"], json!(["address", "name"]));
    assert_eq!(strict["properties"]["address"]["additionalProperties"], json!(false));
    assert_eq!(strict["properties"]["address"]["required"], json!(["city"]));
  }

  #[test]
  fn descends_into_arrays() {
    let schema = json!({
      "type": "object",
      "properties": {
        "items": { "type": "array", "items": { "type": "object", "properties": { "id": {"type": "string"} } } }
      }
    });
    let strict = to_strict_schema(&schema);
    assert_eq!(strict["properties"]["items"]["items"]["additionalProperties"], json!(false));
  }

  #[test]
  fn already_set_required_is_preserved() {
    let schema = json!({ "type": "object", "properties": { "a": {"type": "string"} }, "required": ["a"] });
    let strict = to_strict_schema(&schema);
    assert_eq!(strict["required"], json!(["a"]));
  }

  #[test]
  fn idempotent() {
    let schema = json!({
      "type": "object",
      "properties": { "a": { "type": "object", "properties": { "b": {"type": "string"} } } }
    });
    let once = to_strict_schema(&schema);
    let twice = to_strict_schema(&once);
    assert_eq!(once, twice);
  }
}
