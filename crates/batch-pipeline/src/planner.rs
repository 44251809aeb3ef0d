//! [`ExecutionPlanner`]: `ResolvedCommand -> PlannedCommand`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use batch_core::api::{APICall, APIPart, ExecutionPlan, UploadTask};
use batch_core::commands::{Outcome, PlannedCommand, ResolvedCommand};
use batch_core::models::{model_tier_info, rate_constraint_for};
use batch_core::source::Source;
use batch_core::tokens::{EstimationAdapter, TokenEstimate};

use crate::invariants;

pub struct ExecutionPlanner<'a> {
  estimator: &'a dyn EstimationAdapter,
}

impl<'a> ExecutionPlanner<'a> {
  pub fn new(estimator: &'a dyn EstimationAdapter) -> Self {
    Self { estimator }
  }

  pub fn plan(&self, resolved: ResolvedCommand) -> Outcome<PlannedCommand> {
    let config = &resolved.initial.config;
    let tier_info = model_tier_info(&config.model);

    let shared_bytes: u64 = resolved.resolved_sources.iter().map(Source::size_bytes).sum();
    let prompts = &resolved.initial.prompts;
    let vectorize = prompts.len() > 1 && shared_bytes >= tier_info.inline_threshold_bytes;

    let mut upload_tasks = Vec::new();
    let mut shared_parts = Vec::new();
    for source in &resolved.resolved_sources {
      shared_parts.push(self.part_for_source(source, &tier_info, &mut upload_tasks));
    }

    let estimates: Vec<TokenEstimate> = resolved.resolved_sources.iter().map(|s| self.estimator.estimate(s)).collect();
    let prompt_estimates: Vec<TokenEstimate> = prompts
      .iter()
      .map(|p| self.estimator.estimate(&Source::from_text(p.clone())))
      .collect();
    let all_estimates: Vec<TokenEstimate> = estimates.into_iter().chain(prompt_estimates).collect();
    let token_estimate = self.estimator.aggregate(&all_estimates);

    let suggest_cache = config.enable_caching && token_estimate.max_tokens > tier_info.explicit_minimum_tokens;

    let calls = if vectorize {
      let mut call = APICall::new(config.model.clone(), shared_parts.clone())
        .with_config("prompts", serde_json::Value::from(prompts.clone()));
      if suggest_cache {
        call.cache_name_to_use = Some(format!("pending:{}", config.model));
      }
      vec![call]
    } else {
      prompts
        .iter()
        .map(|prompt| {
          let mut parts = shared_parts.clone();
          parts.push(APIPart::TextPart { text: prompt.clone() });
          let mut call = APICall::new(config.model.clone(), parts).with_config("prompt", serde_json::Value::from(prompt.clone()));
          if suggest_cache {
            call.cache_name_to_use = Some(format!("pending:{}", config.model));
          }
          call
        })
        .collect()
    };

    let mut plan = ExecutionPlan::new(calls);
    plan.shared_parts = if vectorize { shared_parts } else { Vec::new() };
    plan.upload_tasks = upload_tasks;
    plan.rate_constraint = rate_constraint_for(&config.model, &config.tier);

    invariants::check(!plan.calls.is_empty(), "PlannedCommand must carry at least one APICall");

    Outcome::success(PlannedCommand {
      resolved,
      execution_plan: plan,
      token_estimate: Some(token_estimate),
    })
  }

  fn part_for_source(
    &self,
    source: &Source,
    tier_info: &batch_core::models::ModelTierInfo,
    upload_tasks: &mut Vec<UploadTask>,
  ) -> APIPart {
    match source {
      Source::Text { text, .. } => APIPart::TextPart { text: text.clone() },
      Source::Remote { uri, mime, .. } => APIPart::FileRefPart {
        uri: uri.clone(),
        mime: mime.clone().unwrap_or_else(|| "application/octet-stream".to_string()),
      },
      Source::File { size_bytes, mime, identifier, .. } => {
        let mime = mime.clone().unwrap_or_else(|| "application/octet-stream".to_string());
        if *size_bytes > tier_info.inline_threshold_bytes {
          upload_tasks.push(UploadTask {
            identifier: identifier.clone(),
            source: source.clone(),
            placeholder_mime: mime.clone(),
          });
          APIPart::FilePlaceholder { identifier: identifier.clone(), mime }
        } else {
          let bytes = source.load().unwrap_or_default();
          let data_uri = format!("data:{mime};base64,{}", BASE64.encode(bytes));
          APIPart::FileRefPart { uri: data_uri, mime }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use batch_core::commands::InitialCommand;
  use batch_core::config::FrozenConfig;
  use batch_core::tokens::DefaultEstimationAdapter;

  fn resolved(sources: Vec<Source>, prompts: Vec<&str>, config: FrozenConfig) -> ResolvedCommand {
    let initial = InitialCommand::new(sources.clone(), prompts.into_iter().map(String::from).collect(), config);
    ResolvedCommand { initial, resolved_sources: sources }
  }

  #[test]
  fn single_prompt_produces_one_call_per_prompt() {
    let estimator = DefaultEstimationAdapter;
    let planner = ExecutionPlanner::new(&estimator);
    let resolved = resolved(vec![Source::from_text("ctx")], vec!["hi"], FrozenConfig::default());
    let planned = planner.plan(resolved).into_result().unwrap();
    assert_eq!(planned.execution_plan.calls.len(), 1);
  }

  #[test]
  fn multiple_prompts_without_large_shared_context_stay_unvectorized() {
    let estimator = DefaultEstimationAdapter;
    let planner = ExecutionPlanner::new(&estimator);
    let resolved = resolved(vec![Source::from_text("small")], vec!["a", "b", "c"], FrozenConfig::default());
    let planned = planner.plan(resolved).into_result().unwrap();
    assert_eq!(planned.execution_plan.calls.len(), 3);
  }

  #[test]
  fn multiple_prompts_with_large_shared_context_vectorize() {
    let estimator = DefaultEstimationAdapter;
    let planner = ExecutionPlanner::new(&estimator);
    let big_text = "x".repeat(25 * 1024 * 1024);
    let resolved = resolved(vec![Source::from_text(big_text)], vec!["a", "b"], FrozenConfig::default());
    let planned = planner.plan(resolved).into_result().unwrap();
    assert_eq!(planned.execution_plan.calls.len(), 1);
    assert_eq!(
      planned.execution_plan.calls[0].api_config.get("prompts").and_then(|v| v.as_array()).map(Vec::len),
      Some(2)
    );
  }

  #[test]
  fn large_file_emits_upload_task_and_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    std::fs::write(&path, vec![0u8; 21 * 1024 * 1024]).unwrap();
    let source = Source::from_file(&path).unwrap();

    let estimator = DefaultEstimationAdapter;
    let planner = ExecutionPlanner::new(&estimator);
    let resolved = resolved(vec![source], vec!["describe this"], FrozenConfig::default());
    let planned = planner.plan(resolved).into_result().unwrap();
    assert_eq!(planned.execution_plan.upload_tasks.len(), 1);
    assert!(planned.execution_plan.has_unresolved_placeholders());
  }

  #[test]
  fn token_estimate_is_attached() {
    let estimator = DefaultEstimationAdapter;
    let planner = ExecutionPlanner::new(&estimator);
    let resolved = resolved(vec![Source::from_text("hello world")], vec!["Echo me"], FrozenConfig::default());
    let planned = planner.plan(resolved).into_result().unwrap();
    assert!(planned.token_estimate.is_some());
  }
}
