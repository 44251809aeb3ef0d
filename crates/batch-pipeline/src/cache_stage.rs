//! [`CacheStage`]: applies an explicit cache override, or resolves the
//! planner's cache suggestion against [`CacheRegistry`] and the adapter's
//! [`CachingCapability`]. `PlannedCommand → PlannedCommand`.

use std::time::Duration;

use batch_core::commands::{Outcome, PlannedCommand};
use batch_providers::{CacheCreateRequest, ProviderAdapter};
use batch_registries::{fingerprint_cache_key, CacheRegistry, CacheRegistryEntry};
use tracing::warn;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const PLANNER_SUGGESTION_PREFIX: &str = "pending:";

pub struct CacheStage<'a> {
  registry: &'a CacheRegistry,
  adapter: &'a dyn ProviderAdapter,
}

impl<'a> CacheStage<'a> {
  pub fn new(registry: &'a CacheRegistry, adapter: &'a dyn ProviderAdapter) -> Self {
    Self { registry, adapter }
  }

  pub async fn apply(&self, mut planned: PlannedCommand) -> Outcome<PlannedCommand> {
    if let Some(override_name) = planned.resolved.initial.options.cache_override_name.clone() {
      for call in planned.execution_plan.calls.iter_mut() {
        call.cache_name_to_use = Some(override_name.clone());
      }
      return Outcome::success(planned);
    }

    let Some(caching) = self.adapter.as_caching() else {
      for call in planned.execution_plan.calls.iter_mut() {
        if is_planner_suggestion(&call.cache_name_to_use) {
          call.cache_name_to_use = None;
        }
      }
      return Outcome::success(planned);
    };

    let normalized_shared_parts = format!("{:?}", planned.execution_plan.shared_parts);

    for call in planned.execution_plan.calls.iter_mut() {
      if !is_planner_suggestion(&call.cache_name_to_use) {
        continue;
      }
      let system_instruction = call
        .api_config
        .get("system_instruction")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
      let fingerprint = fingerprint_cache_key(&call.model_name, &normalized_shared_parts, &system_instruction);

      let model_name = call.model_name.clone();
      let parts = planned.execution_plan.shared_parts.clone();
      let instruction_for_request = if system_instruction.is_empty() { None } else { Some(system_instruction.clone()) };

      let result = self
        .registry
        .get_or_create(&fingerprint, async {
          let handle = caching
            .create_cache(CacheCreateRequest {
              model_name,
              parts,
              system_instruction: instruction_for_request,
              ttl: DEFAULT_CACHE_TTL,
            })
            .await?;
          Ok::<_, batch_core::error::ApiError>(CacheRegistryEntry::new(handle.name, handle.ttl))
        })
        .await;

      match result {
        Ok(entry) => call.cache_name_to_use = Some(entry.cache_handle),
        Err(err) => {
          warn!(model = %call.model_name, error = %err, "cache creation failed, proceeding uncached");
          call.cache_name_to_use = None;
        }
      }
    }

    Outcome::success(planned)
  }
}

fn is_planner_suggestion(cache_name: &Option<String>) -> bool {
  cache_name.as_deref().is_some_and(|name| name.starts_with(PLANNER_SUGGESTION_PREFIX))
}

#[cfg(test)]
mod tests {
  use super::*;
  use batch_core::api::{APICall, ExecutionPlan};
  use batch_core::commands::{InitialCommand, ResolvedCommand};
  use batch_core::config::FrozenConfig;
  use batch_core::options::ExecutionOptions;
  use batch_providers::MockAdapter;

  fn planned_with_cache_suggestion(cache_override: Option<String>) -> PlannedCommand {
    let mut call = APICall::new("gemini-2.0-flash", vec![]);
    call.cache_name_to_use = Some("pending:gemini-2.0-flash".to_string());
    let plan = ExecutionPlan::new(vec![call]);
    let options = ExecutionOptions { cache_override_name: cache_override, ..Default::default() };
    let initial = InitialCommand::new(Vec::new(), vec!["p".to_string()], FrozenConfig::default()).with_options(options);
    let resolved = ResolvedCommand { initial, resolved_sources: Vec::new() };
    PlannedCommand { resolved, execution_plan: plan, token_estimate: None }
  }

  #[tokio::test]
  async fn explicit_override_wins_even_without_caching_capability() {
    let registry = CacheRegistry::new();
    let adapter = MockAdapter;
    let stage = CacheStage::new(&registry, &adapter);
    let planned = planned_with_cache_suggestion(Some("caches/explicit".to_string()));
    let result = stage.apply(planned).await.into_result().unwrap();
    assert_eq!(result.execution_plan.calls[0].cache_name_to_use.as_deref(), Some("caches/explicit"));
  }

  #[tokio::test]
  async fn suggestion_is_cleared_when_adapter_lacks_caching() {
    let registry = CacheRegistry::new();
    let adapter = MockAdapter;
    let stage = CacheStage::new(&registry, &adapter);
    let planned = planned_with_cache_suggestion(None);
    let result = stage.apply(planned).await.into_result().unwrap();
    assert_eq!(result.execution_plan.calls[0].cache_name_to_use, None);
  }
}
