//! `gembatch` — the public entry point to the batch execution core: a
//! thin re-export of [`batch_core`], [`batch_pipeline`], [`batch_providers`],
//! and [`batch_registries`] so a caller depends on one crate instead of
//! four. See `DESIGN.md` for the full external-interface surface;
//! [`run_simple`] and [`run_batch`] are the two operations most callers
//! need.

pub use batch_core::{
  APICall, APIPart, ConfigOverrides, EstimationAdapter, ExecutionOptions, ExecutionPlan, FrozenConfig,
  InitialCommand, Outcome, PlannedCommand, PolluxError, RateConstraint, ResolvedCommand, ResultEnvelope, Source,
  Status, TokenEstimate, audit_text, resolve_config, resolve_provider,
};
pub use batch_pipeline::{Executor, create_executor, run_batch, run_simple};
pub use batch_providers::{CachingCapability, ProviderAdapter, UploadsCapability, select_adapter};
pub use batch_registries::{CacheRegistry, FileRegistry};

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn run_simple_is_reachable_from_the_facade_crate() {
    let envelope = run_simple("hi", Source::from_text("ctx"), None).await.unwrap();
    assert_eq!(envelope.status, Status::Ok);
  }
}
