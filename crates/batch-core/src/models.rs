//! Per-model tier policy: the inline-bytes threshold, the caching
//! threshold, and the rate constraint the free tier imposes, looked up by
//! model name. Values not covered by the table fall back to
//! [`ModelTierInfo::default`].

use crate::api::RateConstraint;

/// Planner-facing facts about a model that aren't part of the provider
/// wire contract: when to vectorize, when to suggest caching, and what
/// rate constraint its free tier imposes.
#[derive(Debug, Clone, Copy)]
pub struct ModelTierInfo {
  /// Byte threshold above which shared parts are vectorized rather than
  /// duplicated per call.
  pub inline_threshold_bytes: u64,
  /// Token threshold above which the planner suggests an explicit cache:
  /// caching is only worth the round-trip past this size.
  pub explicit_minimum_tokens: u64,
  /// Requests-per-minute the free tier imposes, if any.
  pub free_tier_rpm: Option<u32>,
}

impl Default for ModelTierInfo {
  fn default() -> Self {
    Self {
      inline_threshold_bytes: 20 * 1024 * 1024,
      explicit_minimum_tokens: 32_768,
      free_tier_rpm: None,
    }
  }
}

/// Look up tier policy for `model_name`. Exact matches first, then a
/// family-prefix fallback, then [`ModelTierInfo::default`].
pub fn model_tier_info(model_name: &str) -> ModelTierInfo {
  match model_name {
    "gemini-2.0-flash" => ModelTierInfo {
      inline_threshold_bytes: 20 * 1024 * 1024,
      explicit_minimum_tokens: 4096,
      free_tier_rpm: Some(60),
    },
    "gemini-1.5-flash" => ModelTierInfo {
      inline_threshold_bytes: 20 * 1024 * 1024,
      explicit_minimum_tokens: 32_768,
      free_tier_rpm: Some(15),
    },
    "gemini-1.5-pro" => ModelTierInfo {
      inline_threshold_bytes: 20 * 1024 * 1024,
      explicit_minimum_tokens: 32_768,
      free_tier_rpm: Some(2),
    },
    other if other.starts_with("gpt-") => ModelTierInfo {
      inline_threshold_bytes: 20 * 1024 * 1024,
      explicit_minimum_tokens: 32_768,
      free_tier_rpm: None,
    },
    other if other.starts_with("claude-") => ModelTierInfo {
      inline_threshold_bytes: 20 * 1024 * 1024,
      explicit_minimum_tokens: 32_768,
      free_tier_rpm: None,
    },
    _ => ModelTierInfo::default(),
  }
}

/// The rate constraint the planner should attach for this model, or
/// `None` if the caller's configured tier carries no free-tier policy.
pub fn rate_constraint_for(model_name: &str, tier: &str) -> Option<RateConstraint> {
  if tier != "free" {
    return None;
  }
  model_tier_info(model_name).free_tier_rpm.map(RateConstraint::requests_per_minute)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gemini_2_0_flash_has_low_explicit_minimum() {
    assert_eq!(model_tier_info("gemini-2.0-flash").explicit_minimum_tokens, 4096);
  }

  #[test]
  fn unknown_model_falls_back_to_default() {
    let info = model_tier_info("some-future-model");
    assert_eq!(info.explicit_minimum_tokens, ModelTierInfo::default().explicit_minimum_tokens);
  }

  #[test]
  fn free_tier_rate_constraint_present_only_for_free_tier() {
    assert!(rate_constraint_for("gemini-2.0-flash", "tier1").is_none());
    let constraint = rate_constraint_for("gemini-2.0-flash", "free").unwrap();
    assert_eq!(constraint.requests_per_minute, Some(60));
  }
}
