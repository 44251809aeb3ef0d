//! The call-shaped half of the data model: [`APIPart`], [`APICall`],
//! [`ExecutionPlan`], [`RateConstraint`] and [`UploadTask`].

use std::collections::BTreeMap;

use serde_json::Value;

use crate::source::Source;
use crate::tokens::TokenEstimate;

/// One piece of an [`APICall`]'s content. `FilePlaceholder` marks a part
/// that [`RemoteMaterializationStage`] must resolve before the plan may
/// reach `APIHandler` — an `ExecutionPlan` still carrying one is a bug.
///
/// [`RemoteMaterializationStage`]: ../../batch_pipeline/struct.RemoteMaterializationStage.html
#[derive(Debug, Clone, PartialEq)]
pub enum APIPart {
  TextPart { text: String },
  FileRefPart { uri: String, mime: String },
  FilePlaceholder { identifier: String, mime: String },
}

impl APIPart {
  pub fn is_placeholder(&self) -> bool {
    matches!(self, Self::FilePlaceholder { .. })
  }
}

/// A single unit of work dispatched to a provider: one per prompt unless
/// the planner vectorizes the batch into a single shared-context call.
#[derive(Debug, Clone)]
pub struct APICall {
  pub model_name: String,
  pub api_parts: Vec<APIPart>,
  pub api_config: BTreeMap<String, Value>,
  pub cache_name_to_use: Option<String>,
}

impl APICall {
  pub fn new(model_name: impl Into<String>, api_parts: Vec<APIPart>) -> Self {
    Self {
      model_name: model_name.into(),
      api_parts,
      api_config: BTreeMap::new(),
      cache_name_to_use: None,
    }
  }

  pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
    self.api_config.insert(key.into(), value);
    self
  }
}

/// `requests_per_minute`/`tokens_per_minute` caps derived from a model's
/// tier policy. Absent fields mean unconstrained on that axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateConstraint {
  pub requests_per_minute: Option<u32>,
  pub tokens_per_minute: Option<u32>,
}

impl RateConstraint {
  pub fn requests_per_minute(rpm: u32) -> Self {
    Self {
      requests_per_minute: Some(rpm),
      tokens_per_minute: None,
    }
  }
}

/// A file source above the inline-bytes threshold, queued for upload by
/// `RemoteMaterializationStage`.
#[derive(Debug, Clone)]
pub struct UploadTask {
  pub identifier: String,
  pub source: Source,
  pub placeholder_mime: String,
}

/// The planner's output: the ordered calls to execute plus whatever
/// cross-call state the later stages need (shared parts, rate policy,
/// pending uploads).
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
  pub calls: Vec<APICall>,
  pub shared_parts: Vec<APIPart>,
  pub rate_constraint: Option<RateConstraint>,
  pub upload_tasks: Vec<UploadTask>,
}

impl ExecutionPlan {
  pub fn new(calls: Vec<APICall>) -> Self {
    Self {
      calls,
      shared_parts: Vec::new(),
      rate_constraint: None,
      upload_tasks: Vec::new(),
    }
  }

  /// `true` if any call still carries a [`APIPart::FilePlaceholder`] —
  /// such a plan must not reach `APIHandler`.
  pub fn has_unresolved_placeholders(&self) -> bool {
    self.calls.iter().any(|call| call.api_parts.iter().any(APIPart::is_placeholder))
      || self.shared_parts.iter().any(APIPart::is_placeholder)
  }
}

/// Token-validation telemetry attached by `APIHandler`: the planner's
/// estimate compared against the provider's reported usage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenValidation {
  pub estimated_expected: u64,
  pub estimated_min: u64,
  pub estimated_max: u64,
  pub actual: u64,
  pub in_range: bool,
}

impl TokenValidation {
  pub fn compare(estimate: &TokenEstimate, actual: u64) -> Self {
    Self {
      estimated_expected: estimate.expected_tokens,
      estimated_min: estimate.min_tokens,
      estimated_max: estimate.max_tokens,
      actual,
      in_range: actual >= estimate.min_tokens && actual <= estimate.max_tokens,
    }
  }
}
