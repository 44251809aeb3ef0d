//! [`RateLimitHandler`]: resolves effective concurrency from a plan's
//! `rate_constraint` and owns the shared token-bucket admission
//! gate `APIHandler` waits on when a plan is rate-constrained.
//!
//! The admission gate is a sliding window over request timestamps, the
//! same shape as a per-provider request limiter, adapted to await instead
//! of blocking the caller thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::trace;

use batch_core::commands::{Outcome, PlannedCommand};
use batch_core::concurrency::resolve_request_concurrency;

use crate::invariants;

/// Pure wrapper around [`resolve_request_concurrency`]: how wide `APIHandler`
/// should fan `planned.execution_plan.calls` out.
pub fn effective_concurrency(planned: &PlannedCommand) -> usize {
  let rate_constrained = planned.execution_plan.rate_constraint.is_some();
  resolve_request_concurrency(
    planned.execution_plan.calls.len(),
    &planned.resolved.initial.options,
    &planned.resolved.initial.config,
    rate_constrained,
  )
}

struct GateState {
  timestamps: VecDeque<Instant>,
}

/// A shared per-minute sliding-window admission gate. One instance per
/// executor; every rate-constrained call awaits [`RateLimitGate::acquire`]
/// before dispatch.
pub struct RateLimitGate {
  requests_per_minute: u32,
  state: Mutex<GateState>,
}

const WINDOW: Duration = Duration::from_secs(60);

impl RateLimitGate {
  pub fn new(requests_per_minute: u32) -> Self {
    Self {
      requests_per_minute,
      state: Mutex::new(GateState { timestamps: VecDeque::new() }),
    }
  }

  /// Block (asynchronously) until a slot opens in the current minute
  /// window, then record the admission.
  pub async fn acquire(&self) {
    loop {
      let wait = {
        let mut state = self.state.lock().await;
        let cutoff = Instant::now().checked_sub(WINDOW).unwrap_or(Instant::now());
        while matches!(state.timestamps.front(), Some(ts) if *ts < cutoff) {
          state.timestamps.pop_front();
        }
        if state.timestamps.len() < self.requests_per_minute as usize {
          state.timestamps.push_back(Instant::now());
          None
        } else {
          let oldest = *state.timestamps.front().expect("gate at capacity implies a front timestamp");
          Some((oldest + WINDOW).saturating_duration_since(Instant::now()))
        }
      };
      match wait {
        None => return,
        Some(duration) if duration.is_zero() => continue,
        Some(duration) => {
          trace!(wait_ms = duration.as_millis(), "rate limit gate admission delayed");
          tokio::time::sleep(duration).await;
        }
      }
    }
  }
}

/// Owns the gate across the executor's lifetime and validates a plan's
/// rate-constrained shape before the executor fans calls out.
pub struct RateLimitHandler {
  gate: Option<Arc<RateLimitGate>>,
}

impl RateLimitHandler {
  pub fn new(requests_per_minute: Option<u32>) -> Self {
    Self { gate: requests_per_minute.map(|rpm| Arc::new(RateLimitGate::new(rpm))) }
  }

  pub fn gate(&self) -> Option<Arc<RateLimitGate>> {
    self.gate.clone()
  }

  pub fn resolve(&self, planned: PlannedCommand) -> Outcome<PlannedCommand> {
    invariants::check(
      !planned.execution_plan.has_unresolved_placeholders(),
      "RateLimitHandler must only see plans with fully materialized parts",
    );
    Outcome::success(planned)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use batch_core::api::{APICall, ExecutionPlan, RateConstraint};
  use batch_core::commands::{InitialCommand, ResolvedCommand};
  use batch_core::config::FrozenConfig;
  use batch_core::options::ExecutionOptions;

  fn planned_with(n_calls: usize, rate_constraint: Option<RateConstraint>, options: ExecutionOptions) -> PlannedCommand {
    let calls = (0..n_calls).map(|_| APICall::new("gemini-2.0-flash", vec![])).collect();
    let mut plan = ExecutionPlan::new(calls);
    plan.rate_constraint = rate_constraint;
    let initial = InitialCommand::new(Vec::new(), vec!["p".to_string(); n_calls], FrozenConfig::default()).with_options(options);
    let resolved = ResolvedCommand { initial, resolved_sources: Vec::new() };
    PlannedCommand { resolved, execution_plan: plan, token_estimate: None }
  }

  #[test]
  fn rate_constrained_plan_serializes() {
    let planned = planned_with(5, Some(RateConstraint::requests_per_minute(10)), ExecutionOptions::default());
    assert_eq!(effective_concurrency(&planned), 1);
  }

  #[test]
  fn unconstrained_plan_fans_out_to_call_count() {
    let planned = planned_with(5, None, ExecutionOptions::default());
    assert_eq!(effective_concurrency(&planned), 5);
  }

  #[tokio::test]
  async fn gate_admits_up_to_limit_then_waits() {
    let gate = RateLimitGate::new(2);
    let start = Instant::now();
    gate.acquire().await;
    gate.acquire().await;
    assert!(start.elapsed() < Duration::from_millis(50));
  }
}
