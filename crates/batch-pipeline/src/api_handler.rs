//! [`ApiHandler`]: dispatches the (possibly vectorized) calls concurrently,
//! bounded by a semaphore, retrying retryable failures with backoff and
//! honoring the shared rate-limit gate. `PlannedCommand → FinalizedCommand`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use batch_core::api::TokenValidation;
use batch_core::commands::{FinalizedCommand, Outcome, PlannedCommand, TelemetryData};
use batch_core::error::{ApiError, PolluxError};
use batch_providers::{ProviderAdapter, ProviderRequest, ProviderResponse};

use crate::invariants;
use crate::rate_limit::RateLimitGate;
use crate::retry::RetryPolicy;

pub struct ApiHandler<'a> {
  adapter: &'a dyn ProviderAdapter,
  gate: Option<Arc<RateLimitGate>>,
  policy: RetryPolicy,
}

impl<'a> ApiHandler<'a> {
  pub fn new(adapter: &'a dyn ProviderAdapter, gate: Option<Arc<RateLimitGate>>) -> Self {
    Self { adapter, gate, policy: RetryPolicy::default() }
  }

  pub async fn execute(
    &self,
    planned: PlannedCommand,
    concurrency: usize,
    cancel: &CancellationToken,
  ) -> Outcome<FinalizedCommand> {
    invariants::check(
      !planned.execution_plan.has_unresolved_placeholders(),
      "APIHandler must never receive a plan with unresolved FilePlaceholders",
    );

    let timeout = Duration::from_secs_f64(planned.resolved.initial.config.request_timeout_s.max(0.0));
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let shared_parts = planned.execution_plan.shared_parts.clone();
    let adapter = self.adapter;
    let policy = self.policy;

    let call_futures = planned.execution_plan.calls.iter().enumerate().map(|(idx, call)| {
      let semaphore = semaphore.clone();
      let gate = self.gate.clone();
      let cancel = cancel.clone();
      let request = ProviderRequest {
        model_name: call.model_name.clone(),
        parts: call.api_parts.clone(),
        shared_parts: shared_parts.clone(),
        api_config: call.api_config.clone(),
        cache_name_to_use: call.cache_name_to_use.clone(),
      };
      let correlation_id = Uuid::new_v4();
      async move {
        if cancel.is_cancelled() {
          return (idx, None, Duration::ZERO, correlation_id);
        }
        let _permit = semaphore.acquire().await.expect("semaphore is never closed");
        if let Some(gate) = &gate {
          gate.acquire().await;
        }
        let started = Instant::now();
        let outcome = run_with_retries(adapter, request, &policy, timeout, &cancel, correlation_id).await;
        (idx, outcome, started.elapsed(), correlation_id)
      }
    });

    let results = join_all(call_futures).await;

    // Each call covers one or more prompts (one, unless vectorized); track
    // the first prompt index each call owns so a failed or cancelled call
    // leaves its prompts' positions unfilled rather than shifting everyone
    // after it. `answers[i]` must always correspond to `prompts[i]`.
    let prompt_counts: Vec<usize> = planned
      .execution_plan
      .calls
      .iter()
      .map(|call| call.api_config.get("prompts").and_then(Value::as_array).map(Vec::len).unwrap_or(1))
      .collect();
    let mut prompt_starts = Vec::with_capacity(prompt_counts.len());
    let mut next_start = 0usize;
    for count in &prompt_counts {
      prompt_starts.push(next_start);
      next_start += count;
    }

    let mut raw_batch = Vec::with_capacity(results.len());
    let mut durations = BTreeMap::new();
    let mut call_errors: BTreeMap<usize, PolluxError> = BTreeMap::new();
    let mut total_actual_tokens: u64 = 0;
    let mut have_usage = false;
    let mut cancelled = cancel.is_cancelled();

    for (idx, outcome, elapsed, correlation_id) in results {
      durations.insert(format!("call_{idx}"), elapsed.as_secs_f64());
      let prompt_start = prompt_starts[idx];
      match outcome {
        None => cancelled = true,
        Some(Ok(response)) => {
          debug!(call_idx = idx, %correlation_id, "call completed");
          if let Some(Value::Number(n)) = response.usage.get("total_token_count") {
            if let Some(v) = n.as_u64() {
              total_actual_tokens += v;
              have_usage = true;
            }
          }
          match &response.batch {
            // A vectorized call's response already carries one entry per
            // prompt; flatten those into the batch instead of nesting the
            // whole response under a single call_idx, or extraction would
            // look for `/raw/text` on a `/raw/batch` shape and find nothing.
            // Each flattened entry is tagged with its absolute prompt index
            // so a later failed call can't shift it out of position.
            Some(inner_batch) => {
              for (offset, inner) in inner_batch.iter().enumerate() {
                raw_batch.push(json!({ "call_idx": idx, "prompt_index": prompt_start + offset, "raw": inner.raw }));
              }
            }
            None => raw_batch.push(response_to_raw(idx, prompt_start, &response)),
          }
        }
        Some(Err(err)) => {
          warn!(call_idx = idx, %correlation_id, error = %err, "call failed after retries exhausted");
          // No raw_batch entry is pushed: the prompt positions this call
          // owned stay unfilled and surface as "" once extracted.
          call_errors.insert(idx, PolluxError::Api(err));
        }
      }
    }

    let raw_api_response = json!({ "batch": raw_batch });

    let token_validation = planned.token_estimate.as_ref().map(|estimate| {
      let actual = if have_usage { total_actual_tokens } else { 0 };
      TokenValidation::compare(estimate, actual)
    });

    let mut usage = BTreeMap::new();
    if have_usage {
      usage.insert("total_token_count".to_string(), Value::from(total_actual_tokens));
    }

    debug!(calls = planned.execution_plan.calls.len(), failed = call_errors.len(), "api handler completed batch");

    let telemetry = TelemetryData { durations, token_validation, usage, call_errors, cancelled };

    Outcome::success(FinalizedCommand { planned, raw_api_response, telemetry_data: Some(telemetry) })
  }
}

/// One call's full retry loop: attempt `generate`, back off and retry on a
/// retryable `ApiError` (or a local timeout treated as retryable), honoring
/// cancellation between attempts. Returns `None` only when cancelled before
/// a single attempt could run.
async fn run_with_retries(
  adapter: &dyn ProviderAdapter,
  request: ProviderRequest,
  policy: &RetryPolicy,
  timeout: Duration,
  cancel: &CancellationToken,
  correlation_id: Uuid,
) -> Option<Result<ProviderResponse, ApiError>> {
  let mut attempt = 0;
  loop {
    if cancel.is_cancelled() {
      return None;
    }
    let attempt_result = tokio::select! {
      result = tokio::time::timeout(timeout, adapter.generate(request.clone())) => result,
      _ = cancel.cancelled() => return None,
    };

    let error = match attempt_result {
      Ok(Ok(response)) => return Some(Ok(response)),
      Ok(Err(err)) => err,
      Err(_) => ApiError::new(format!("provider call timed out after {:.1}s", timeout.as_secs_f64())).with_retryable(true),
    };

    if !policy.should_retry(attempt, &error) {
      return Some(Err(error));
    }
    let backoff = policy.backoff_for(attempt, error.retry_after_s);
    debug!(%correlation_id, attempt, backoff_ms = backoff.as_millis() as u64, error = %error, "retrying call");
    tokio::select! {
      _ = tokio::time::sleep(backoff) => {}
      _ = cancel.cancelled() => return None,
    }
    attempt += 1;
  }
}

fn response_to_raw(idx: usize, prompt_index: usize, response: &ProviderResponse) -> Value {
  json!({ "call_idx": idx, "prompt_index": prompt_index, "raw": response.raw })
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use batch_core::api::{APICall, ExecutionPlan};
  use batch_core::commands::{InitialCommand, ResolvedCommand};
  use batch_core::config::FrozenConfig;
  use batch_core::tokens::TokenEstimate;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FlakyAdapter {
    failures_before_success: AtomicUsize,
  }

  #[async_trait]
  impl ProviderAdapter for FlakyAdapter {
    fn provider_name(&self) -> &'static str {
      "flaky"
    }

    async fn generate(&self, _request: ProviderRequest) -> Result<ProviderResponse, ApiError> {
      if self.failures_before_success.fetch_sub(1, Ordering::SeqCst) > 0 {
        return Err(ApiError::new("server down").with_status_code(503));
      }
      Ok(ProviderResponse::text("echo: ok").with_usage(BTreeMap::from([("total_token_count".to_string(), Value::from(12u64))])))
    }
  }

  struct AlwaysFailsAdapter;

  #[async_trait]
  impl ProviderAdapter for AlwaysFailsAdapter {
    fn provider_name(&self) -> &'static str {
      "always-fails"
    }

    async fn generate(&self, _request: ProviderRequest) -> Result<ProviderResponse, ApiError> {
      Err(ApiError::new("bad request").with_status_code(400))
    }
  }

  fn single_call_plan() -> PlannedCommand {
    let plan = ExecutionPlan::new(vec![APICall::new("gemini-2.0-flash", vec![]).with_config("prompt", Value::from("hi"))]);
    let initial = InitialCommand::new(Vec::new(), vec!["hi".to_string()], FrozenConfig::default());
    let resolved = ResolvedCommand { initial, resolved_sources: Vec::new() };
    PlannedCommand {
      resolved,
      execution_plan: plan,
      token_estimate: Some(TokenEstimate::new(1, 5, 10, 0.8)),
    }
  }

  /// Two unvectorized calls, one per prompt ("A" then "B"), so call idx 0
  /// owns prompt position 0 and call idx 1 owns prompt position 1.
  fn two_call_plan() -> PlannedCommand {
    let calls = vec![
      APICall::new("gemini-2.0-flash", vec![]).with_config("prompt", Value::from("A")),
      APICall::new("gemini-2.0-flash", vec![]).with_config("prompt", Value::from("B")),
    ];
    let plan = ExecutionPlan::new(calls);
    let initial = InitialCommand::new(Vec::new(), vec!["A".to_string(), "B".to_string()], FrozenConfig::default());
    let resolved = ResolvedCommand { initial, resolved_sources: Vec::new() };
    PlannedCommand { resolved, execution_plan: plan, token_estimate: None }
  }

  struct FailsOnAdapter {
    failing_prompt: &'static str,
  }

  #[async_trait]
  impl ProviderAdapter for FailsOnAdapter {
    fn provider_name(&self) -> &'static str {
      "fails-on"
    }

    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ApiError> {
      let prompt = request.api_config.get("prompt").and_then(Value::as_str).unwrap_or_default();
      if prompt == self.failing_prompt {
        return Err(ApiError::new("bad request").with_status_code(400));
      }
      Ok(ProviderResponse::text(format!("echo: {prompt}")))
    }
  }

  #[tokio::test]
  async fn retries_until_success_and_attaches_token_validation() {
    let adapter = FlakyAdapter { failures_before_success: AtomicUsize::new(2) };
    let handler = ApiHandler::new(&adapter, None);
    let cancel = CancellationToken::new();
    let finalized = handler.execute(single_call_plan(), 1, &cancel).await.into_result().unwrap();
    let telemetry = finalized.telemetry_data.unwrap();
    assert!(telemetry.call_errors.is_empty());
    assert!(telemetry.token_validation.is_some());
  }

  #[tokio::test]
  async fn non_retryable_error_short_circuits_only_that_call() {
    let adapter = AlwaysFailsAdapter;
    let handler = ApiHandler::new(&adapter, None);
    let cancel = CancellationToken::new();
    let finalized = handler.execute(single_call_plan(), 1, &cancel).await.into_result().unwrap();
    let telemetry = finalized.telemetry_data.unwrap();
    assert_eq!(telemetry.call_errors.len(), 1);
  }

  #[tokio::test]
  async fn failed_call_leaves_its_prompt_position_unfilled_not_shifted() {
    let adapter = FailsOnAdapter { failing_prompt: "A" };
    let handler = ApiHandler::new(&adapter, None);
    let cancel = CancellationToken::new();
    let finalized = handler.execute(two_call_plan(), 2, &cancel).await.into_result().unwrap();
    let telemetry = finalized.telemetry_data.as_ref().unwrap();
    assert_eq!(telemetry.call_errors.len(), 1);
    assert!(telemetry.call_errors.contains_key(&0));

    let batch = finalized.raw_api_response.get("batch").and_then(Value::as_array).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].get("prompt_index").and_then(Value::as_u64), Some(1));
    assert_eq!(batch[0].pointer("/raw/text").and_then(Value::as_str), Some("echo: B"));
  }

  #[tokio::test]
  async fn cancellation_before_dispatch_marks_cancelled() {
    let adapter = AlwaysFailsAdapter;
    let handler = ApiHandler::new(&adapter, None);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let finalized = handler.execute(single_call_plan(), 1, &cancel).await.into_result().unwrap();
    assert!(finalized.telemetry_data.unwrap().cancelled);
  }
}
