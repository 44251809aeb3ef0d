//! [`Executor`]: composes the seven stages into one `InitialCommand ->
//! ResultEnvelope` pipeline, owning the registries and rate-limit gate for
//! its whole lifetime.

use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use batch_core::commands::{InitialCommand, ResultEnvelope};
use batch_core::config::FrozenConfig;
use batch_core::models::rate_constraint_for;
use batch_core::tokens::DefaultEstimationAdapter;
use batch_providers::{select_adapter, ProviderAdapter};
use batch_registries::{CacheRegistry, FileRegistry};

use crate::api_handler::ApiHandler;
use crate::cache_stage::CacheStage;
use crate::materialization::RemoteMaterializationStage;
use crate::planner::ExecutionPlanner;
use crate::rate_limit::{self, RateLimitHandler};
use crate::result_builder::ResultBuilder;
use crate::source_handler::SourceHandler;

/// Owns the registries, the selected provider adapter, and the shared
/// rate-limit gate. Construct once per configuration and reuse across
/// calls: the registries and gate are only effective when shared.
pub struct Executor {
  config: FrozenConfig,
  adapter: std::sync::Arc<dyn ProviderAdapter>,
  file_registry: FileRegistry,
  cache_registry: CacheRegistry,
  rate_limit_handler: RateLimitHandler,
}

impl Executor {
  pub fn new(config: FrozenConfig) -> Self {
    let adapter = select_adapter(&config);
    let requests_per_minute = rate_constraint_for(&config.model, &config.tier).and_then(|c| c.requests_per_minute);
    Self {
      config,
      adapter,
      file_registry: FileRegistry::new(),
      cache_registry: CacheRegistry::new(),
      rate_limit_handler: RateLimitHandler::new(requests_per_minute),
    }
  }

  pub fn config(&self) -> &FrozenConfig {
    &self.config
  }

  /// Run `initial` to completion with no external cancellation source.
  pub async fn execute(&self, initial: InitialCommand) -> ResultEnvelope {
    self.execute_cancellable(initial, &CancellationToken::new()).await
  }

  /// Run `initial` to completion, observing `cancel` at every suspension
  /// point a stage offers.
  pub async fn execute_cancellable(&self, initial: InitialCommand, cancel: &CancellationToken) -> ResultEnvelope {
    let mut stage_durations = Vec::new();

    macro_rules! timed_stage {
      ($name:expr, $outcome:expr) => {{
        let started = Instant::now();
        let outcome = $outcome;
        stage_durations.push(($name.to_string(), started.elapsed().as_secs_f64()));
        match outcome.into_result() {
          Ok(value) => value,
          Err((error, stage)) => {
            info!(stage, error = %error, "pipeline stage failed");
            return ResultEnvelope::error(&error);
          }
        }
      }};
    }

    let resolved = timed_stage!("SourceHandler", SourceHandler::resolve(initial));

    let estimator = DefaultEstimationAdapter;
    let planner = ExecutionPlanner::new(&estimator);
    let planned = timed_stage!("ExecutionPlanner", planner.plan(resolved));

    let materialization = RemoteMaterializationStage::new(&self.file_registry, self.adapter.as_ref());
    let planned = timed_stage!("RemoteMaterializationStage", materialization.materialize(planned).await);

    let planned = timed_stage!("RateLimitHandler", self.rate_limit_handler.resolve(planned));
    let concurrency = rate_limit::effective_concurrency(&planned);

    let cache_stage = CacheStage::new(&self.cache_registry, self.adapter.as_ref());
    let planned = timed_stage!("CacheStage", cache_stage.apply(planned).await);

    let api_handler = ApiHandler::new(self.adapter.as_ref(), self.rate_limit_handler.gate());
    let finalized = timed_stage!("APIHandler", api_handler.execute(planned, concurrency, cancel).await);

    let mut finalized = finalized;
    if let Some(telemetry) = finalized.telemetry_data.as_mut() {
      for (name, seconds) in stage_durations {
        telemetry.durations.entry(name).or_insert(seconds);
      }
    }

    let started = Instant::now();
    let mut envelope = ResultBuilder::build(finalized);
    let result_builder_seconds = started.elapsed().as_secs_f64();
    if let Some(Value::Object(durations)) = envelope.metrics.get_mut("durations") {
      durations.insert("ResultBuilder".to_string(), Value::from(result_builder_seconds));
    }
    envelope
  }
}

/// Create an executor from explicit config overrides, applying the
/// precedence chain in [`batch_core::config::resolve_config`].
pub fn create_executor(overrides: batch_core::config::ConfigOverrides) -> Result<Executor, batch_core::error::ConfigurationError> {
  let config = batch_core::config::resolve_config(overrides)?;
  Ok(Executor::new(config))
}

/// `run_simple(prompt, source, options?) -> ResultEnvelope`: a single
/// prompt over a single source, using default configuration.
pub async fn run_simple(
  prompt: impl Into<String>,
  source: batch_core::source::Source,
  options: Option<batch_core::options::ExecutionOptions>,
) -> Result<ResultEnvelope, batch_core::error::ConfigurationError> {
  let executor = create_executor(batch_core::config::ConfigOverrides::default())?;
  let mut initial = InitialCommand::new(vec![source], vec![prompt.into()], executor.config().clone());
  if let Some(options) = options {
    initial = initial.with_options(options);
  }
  Ok(executor.execute(initial).await)
}

/// `run_batch(prompts, sources, options?) -> ResultEnvelope`:
/// vectorized over `prompts`, sharing `sources` as common context.
pub async fn run_batch(
  prompts: Vec<String>,
  sources: Vec<batch_core::source::Source>,
  options: Option<batch_core::options::ExecutionOptions>,
) -> Result<ResultEnvelope, batch_core::error::ConfigurationError> {
  let executor = create_executor(batch_core::config::ConfigOverrides::default())?;
  let mut initial = InitialCommand::new(sources, prompts, executor.config().clone());
  if let Some(options) = options {
    initial = initial.with_options(options);
  }
  Ok(executor.execute(initial).await)
}

#[cfg(test)]
mod tests {
  use super::*;
  use batch_core::source::Source;

  #[tokio::test]
  async fn mock_executor_echoes_single_prompt() {
    let executor = Executor::new(FrozenConfig::default());
    let initial = InitialCommand::new(vec![Source::from_text("context")], vec!["hello".to_string()], FrozenConfig::default());
    let envelope = executor.execute(initial).await;
    assert_eq!(envelope.answers, vec!["echo: hello"]);
    assert!(envelope.metrics.contains_key("durations"));
  }

  #[tokio::test]
  async fn run_simple_helper_round_trips() {
    let envelope = run_simple("hi", Source::from_text("ctx"), None).await.unwrap();
    assert_eq!(envelope.answers, vec!["echo: hi"]);
  }

  #[tokio::test]
  async fn run_batch_vectorizes_when_shared_context_is_large() {
    let big = "x".repeat(25 * 1024 * 1024);
    let envelope = run_batch(
      vec!["a".to_string(), "b".to_string()],
      vec![Source::from_text(big)],
      None,
    )
    .await
    .unwrap();
    assert_eq!(envelope.answers.len(), 2);
  }

  #[tokio::test]
  async fn stale_source_produces_error_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.txt");
    std::fs::write(&path, b"x").unwrap();
    let source = Source::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let executor = Executor::new(FrozenConfig::default());
    let initial = InitialCommand::new(vec![source], vec!["p".to_string()], FrozenConfig::default());
    let envelope = executor.execute(initial).await;
    assert_eq!(envelope.status, batch_core::commands::Status::Error);
  }
}
