//! The monotonic command progression — `InitialCommand → ResolvedCommand →
//! PlannedCommand → FinalizedCommand → ResultEnvelope` — and the
//! `Outcome` wrapper every pipeline stage returns.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::api::{ExecutionPlan, TokenValidation};
use crate::config::FrozenConfig;
use crate::error::PolluxError;
use crate::options::ExecutionOptions;
use crate::source::Source;
use crate::tokens::TokenEstimate;

/// User-facing input: a batch of prompts over a set of sources, under a
/// resolved configuration and optional per-call overrides.
#[derive(Debug, Clone)]
pub struct InitialCommand {
  pub sources: Vec<Source>,
  pub prompts: Vec<String>,
  pub config: FrozenConfig,
  pub options: ExecutionOptions,
}

impl InitialCommand {
  pub fn new(sources: Vec<Source>, prompts: Vec<String>, config: FrozenConfig) -> Self {
    Self {
      sources,
      prompts,
      config,
      options: ExecutionOptions::default(),
    }
  }

  pub fn with_options(mut self, options: ExecutionOptions) -> Self {
    self.options = options;
    self
  }
}

/// Output of `SourceHandler`: sources classified and validated, otherwise
/// unchanged from the initial command.
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
  pub initial: InitialCommand,
  pub resolved_sources: Vec<Source>,
}

/// Output of `ExecutionPlanner` (and the mutation target of
/// `RemoteMaterializationStage`, `RateLimitHandler`, and `CacheStage`): the
/// concrete plan to execute, plus the token estimate it was built from.
#[derive(Debug, Clone)]
pub struct PlannedCommand {
  pub resolved: ResolvedCommand,
  pub execution_plan: ExecutionPlan,
  pub token_estimate: Option<TokenEstimate>,
}

/// Output of `APIHandler`: the raw per-call provider responses plus
/// token-validation telemetry, ready for extraction.
#[derive(Debug, Clone)]
pub struct FinalizedCommand {
  pub planned: PlannedCommand,
  pub raw_api_response: Value,
  pub telemetry_data: Option<TelemetryData>,
}

/// Per-call outcomes and token-validation telemetry collected while
/// executing a [`PlannedCommand`], threaded through to `ResultBuilder`.
#[derive(Debug, Clone, Default)]
pub struct TelemetryData {
  pub durations: BTreeMap<String, f64>,
  pub token_validation: Option<TokenValidation>,
  pub usage: BTreeMap<String, Value>,
  pub call_errors: BTreeMap<usize, PolluxError>,
  pub cancelled: bool,
}

/// Overall envelope status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Ok,
  Partial,
  Error,
}

impl Status {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Ok => "ok",
      Self::Partial => "partial",
      Self::Error => "error",
    }
  }
}

/// The stable, provider-agnostic output structure returned to callers.
#[derive(Debug, Clone)]
pub struct ResultEnvelope {
  pub status: Status,
  pub answers: Vec<String>,
  pub extraction_method: String,
  pub confidence: f64,
  pub usage: BTreeMap<String, Value>,
  pub metrics: BTreeMap<String, Value>,
  pub diagnostics: Option<BTreeMap<String, Value>>,
}

impl ResultEnvelope {
  /// An error envelope with no answers, used when a stage short-circuits
  /// the pipeline before any calls execute.
  pub fn error(error: &PolluxError) -> Self {
    let mut diagnostics = BTreeMap::new();
    diagnostics.insert("error".to_string(), Value::String(error.to_string()));
    if let Some(hint) = error.hint() {
      diagnostics.insert("error_hint".to_string(), Value::String(hint.to_string()));
    }
    Self {
      status: Status::Error,
      answers: Vec::new(),
      extraction_method: String::new(),
      confidence: 0.0,
      usage: BTreeMap::new(),
      metrics: BTreeMap::new(),
      diagnostics: Some(diagnostics),
    }
  }
}

/// The tagged success/failure wrapper every stage returns: a `Failure`
/// short-circuits the remaining stages instead of propagating a bare
/// `Result`, so the executor can attach which stage failed.
#[derive(Debug)]
pub enum Outcome<T> {
  Success(T),
  Failure { error: PolluxError, stage: &'static str },
}

impl<T> Outcome<T> {
  pub fn success(value: T) -> Self {
    Self::Success(value)
  }

  pub fn failure(stage: &'static str, error: impl Into<PolluxError>) -> Self {
    Self::Failure { error: error.into(), stage }
  }

  pub fn into_result(self) -> Result<T, (PolluxError, &'static str)> {
    match self {
      Self::Success(value) => Ok(value),
      Self::Failure { error, stage } => Err((error, stage)),
    }
  }
}
