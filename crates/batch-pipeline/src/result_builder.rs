//! [`ResultBuilder`]: extracts answers from `raw_api_response`, merges
//! telemetry into `metrics`, and produces the stable [`ResultEnvelope`].
//! `FinalizedCommand → ResultEnvelope`.

use std::collections::BTreeMap;

use serde_json::Value;

use batch_core::commands::{FinalizedCommand, Status};
use batch_core::commands::ResultEnvelope;

pub struct ResultBuilder;

impl ResultBuilder {
  pub fn build(finalized: FinalizedCommand) -> ResultEnvelope {
    let n_prompts = finalized.planned.resolved.initial.prompts.len();
    let telemetry = finalized.telemetry_data.clone();
    let batch = finalized.raw_api_response.get("batch").and_then(Value::as_array).cloned().unwrap_or_default();

    let prefer_json_array = finalized.planned.resolved.initial.options.result_prefer_json_array;
    let requested_schema = finalized
      .planned
      .execution_plan
      .calls
      .iter()
      .any(|call| call.api_config.contains_key("json_schema"));

    let (answers, extraction_method) = if !batch.is_empty() {
      (extract_batch_response(&batch, n_prompts), "batch_response")
    } else if requested_schema && has_structured_content(&batch, prefer_json_array) {
      (extract_structured_json(&batch, n_prompts), "structured_json")
    } else {
      (extract_single_text(&batch, n_prompts), "single_text")
    };

    let cancelled = telemetry.as_ref().map(|t| t.cancelled).unwrap_or(false);

    // A raw_batch entry only exists for a prompt position whose call
    // succeeded (see api_handler.rs), but the call succeeding doesn't by
    // itself mean extraction found an answer at that position (an
    // unrecognized response shape still leaves the "" default). Count
    // actually-filled positions, not raw entries, so a silent extraction
    // miss still reads as degraded rather than `Ok`.
    let filled = answers.iter().filter(|answer| !answer.is_empty()).count();
    let status = if filled == 0 {
      Status::Error
    } else if filled < n_prompts || cancelled {
      Status::Partial
    } else {
      Status::Ok
    };

    let confidence = finalized
      .planned
      .token_estimate
      .as_ref()
      .map(|estimate| estimate.confidence)
      .unwrap_or(0.0);

    let mut metrics = BTreeMap::new();
    if let Some(telemetry) = &telemetry {
      let durations: BTreeMap<String, Value> =
        telemetry.durations.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect();
      metrics.insert("durations".to_string(), Value::Object(durations.into_iter().collect()));
      if let Some(validation) = &telemetry.token_validation {
        metrics.insert(
          "token_validation".to_string(),
          serde_json::json!({
            "estimated_expected": validation.estimated_expected,
            "estimated_min": validation.estimated_min,
            "estimated_max": validation.estimated_max,
            "actual": validation.actual,
            "in_range": validation.in_range,
          }),
        );
      }
    }

    let usage = telemetry.as_ref().map(|t| t.usage.clone()).unwrap_or_default();

    let mut diagnostics = BTreeMap::new();
    diagnostics.insert(
      "model_selected".to_string(),
      serde_json::json!({ "selected": finalized.planned.resolved.initial.config.model }),
    );
    if let Some(telemetry) = &telemetry {
      if telemetry.cancelled {
        diagnostics.insert("cancelled".to_string(), Value::Bool(true));
      }
      if !telemetry.call_errors.is_empty() {
        let errors: BTreeMap<String, Value> = telemetry
          .call_errors
          .iter()
          .map(|(idx, err)| (idx.to_string(), Value::String(err.to_string())))
          .collect();
        diagnostics.insert("call_errors".to_string(), Value::Object(errors.into_iter().collect()));
      }
    }

    ResultEnvelope {
      status,
      answers,
      extraction_method: extraction_method.to_string(),
      confidence,
      usage,
      metrics,
      diagnostics: Some(diagnostics),
    }
  }
}

/// Places each `batch` entry at its `prompt_index` (falling back to its
/// position in `batch` when the entry carries none, e.g. hand-built
/// fixtures in tests) so a missing or failed entry leaves `""` at that
/// prompt's position instead of shifting every later prompt's answer down.
fn positional_answers(batch: &[Value], n_prompts: usize, extract: impl Fn(&Value) -> Option<String>) -> Vec<String> {
  let mut answers = vec![String::new(); n_prompts];
  for (position, entry) in batch.iter().enumerate() {
    let idx = entry.get("prompt_index").and_then(Value::as_u64).map(|v| v as usize).unwrap_or(position);
    if idx < n_prompts {
      if let Some(value) = extract(entry) {
        answers[idx] = value;
      }
    }
  }
  answers
}

fn extract_batch_response(batch: &[Value], n_prompts: usize) -> Vec<String> {
  positional_answers(batch, n_prompts, |entry| entry.pointer("/raw/text").and_then(Value::as_str).map(str::to_string))
}

fn has_structured_content(batch: &[Value], _prefer_json_array: bool) -> bool {
  batch.iter().any(|entry| entry.pointer("/raw/structured").is_some())
}

fn extract_structured_json(batch: &[Value], n_prompts: usize) -> Vec<String> {
  positional_answers(batch, n_prompts, |entry| entry.pointer("/raw/structured").map(|v| v.to_string()))
}

fn extract_single_text(batch: &[Value], n_prompts: usize) -> Vec<String> {
  positional_answers(batch, n_prompts, |entry| entry.pointer("/raw/text").and_then(Value::as_str).map(str::to_string))
}
