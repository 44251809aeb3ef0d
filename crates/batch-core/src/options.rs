//! [`ExecutionOptions`]: the per-call overrides a caller may attach to a
//! single `run_simple`/`run_batch`/`execute` invocation.

use std::collections::BTreeMap;

use serde_json::Value;

/// Tool invocation policy for a call, mirrored from the wire-level
/// `tool_choice` values every provider adapter maps to its own shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ToolChoice {
  #[default]
  Auto,
  Required,
  None,
  Specific(String),
}

/// One prior turn in `history`. `content: None` with non-empty `tool_calls`
/// is a valid shape (an assistant turn that only invoked tools).
#[derive(Debug, Clone, Default)]
pub struct HistoryMessage {
  pub role: String,
  pub content: Option<String>,
  pub tool_calls: Vec<Value>,
}

/// Per-invocation overrides recognized by the pipeline. All fields are
/// optional; unset fields fall back to `FrozenConfig` or planner defaults.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
  pub temperature: Option<f64>,
  pub top_p: Option<f64>,
  pub tools: Vec<Value>,
  pub tool_choice: Option<ToolChoice>,
  pub history: Vec<HistoryMessage>,
  pub request_concurrency: Option<i64>,
  pub cache_override_name: Option<String>,
  pub result_prefer_json_array: bool,
  /// Additional provider-specific knobs that don't warrant a named field;
  /// passed through verbatim by adapters that recognize the keys.
  pub extra: BTreeMap<String, Value>,
}

impl ExecutionOptions {
  /// Effective `request_concurrency`, coercing any non-positive or unset
  /// value to `0` so the concurrency resolver can fall through to the next
  /// priority tier without special-casing `None`.
  pub fn request_concurrency_or_zero(&self) -> i64 {
    self.request_concurrency.filter(|v| *v > 0).unwrap_or(0)
  }
}
