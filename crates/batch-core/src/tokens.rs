//! [`TokenEstimate`] and the [`EstimationAdapter`] contract pluggable
//! per-modality estimators implement.

use crate::source::Source;

/// A bounded estimate of how many tokens a source or batch will consume.
/// `min ≤ expected ≤ max` and `confidence` is clamped to `[0.0, 0.95]` on
/// aggregation (never exactly 1.0 — the estimate is always advisory).
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEstimate {
  pub min_tokens: u64,
  pub expected_tokens: u64,
  pub max_tokens: u64,
  pub confidence: f64,
  pub breakdown: Vec<TokenEstimate>,
}

impl TokenEstimate {
  pub fn new(min_tokens: u64, expected_tokens: u64, max_tokens: u64, confidence: f64) -> Self {
    Self {
      min_tokens,
      expected_tokens,
      max_tokens,
      confidence: confidence.clamp(0.0, 1.0),
      breakdown: Vec::new(),
    }
  }

  pub fn with_breakdown(mut self, breakdown: Vec<TokenEstimate>) -> Self {
    self.breakdown = breakdown;
    self
  }

  /// `min ≤ expected ≤ max` and confidence inside `[0, 1]`.
  pub fn is_valid(&self) -> bool {
    self.min_tokens <= self.expected_tokens
      && self.expected_tokens <= self.max_tokens
      && (0.0..=1.0).contains(&self.confidence)
  }

  /// Sum bounds component-wise, cap confidence at 0.95, keep each input as
  /// a breakdown entry. Returns `TokenEstimate::new(0, 0, 0, 0.95)` (with
  /// an empty breakdown) for an empty slice.
  pub fn aggregate(estimates: &[TokenEstimate]) -> TokenEstimate {
    let min_tokens = estimates.iter().map(|e| e.min_tokens).sum();
    let expected_tokens = estimates.iter().map(|e| e.expected_tokens).sum();
    let max_tokens = estimates.iter().map(|e| e.max_tokens).sum();
    let confidence = estimates
      .iter()
      .map(|e| e.confidence)
      .fold(f64::INFINITY, f64::min)
      .min(0.95);
    let confidence = if confidence.is_finite() { confidence } else { 0.95 };
    TokenEstimate {
      min_tokens,
      expected_tokens,
      max_tokens,
      confidence,
      breakdown: estimates.to_vec(),
    }
  }
}

/// Per-modality token estimation. Implementations must be pure: the same
/// `Source` content must always yield an equal `TokenEstimate`.
pub trait EstimationAdapter: Send + Sync {
  fn estimate(&self, source: &Source) -> TokenEstimate;

  /// Default aggregation delegates to [`TokenEstimate::aggregate`]; most
  /// adapters need nothing modality-specific here.
  fn aggregate(&self, estimates: &[TokenEstimate]) -> TokenEstimate {
    TokenEstimate::aggregate(estimates)
  }
}

/// Fixed per-byte heuristic used when no provider-specific adapter is
/// selected: roughly 4 bytes per token for text, plus a fixed floor per
/// image for the vision-token compensation mentioned in the generation
/// contract (258 tokens base, scaling with size beyond a 256 KiB frame).
pub struct DefaultEstimationAdapter;

const MIN_TOKENS_FLOOR: u64 = 10;
const BYTES_PER_TOKEN: u64 = 4;
const IMAGE_BASE_TOKENS: u64 = 258;
const IMAGE_BYTES_PER_EXTRA_TOKEN: u64 = 1024 * 1024;

impl EstimationAdapter for DefaultEstimationAdapter {
  fn estimate(&self, source: &Source) -> TokenEstimate {
    let size_bytes = source.size_bytes();
    if size_bytes == 0 {
      return TokenEstimate::new(0, 0, 0, 0.95);
    }

    let is_image = source.mime().map(|m| m.starts_with("image/")).unwrap_or(false);
    let expected = if is_image {
      IMAGE_BASE_TOKENS + size_bytes / IMAGE_BYTES_PER_EXTRA_TOKEN
    } else {
      (size_bytes / BYTES_PER_TOKEN).max(MIN_TOKENS_FLOOR)
    };
    let min = expected.saturating_sub(expected / 10).max(MIN_TOKENS_FLOOR);
    let max = expected + expected / 5 + 1;
    TokenEstimate::new(min, expected, max, 0.8)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn estimate_is_deterministic() {
    let adapter = DefaultEstimationAdapter;
    let source = Source::from_text("a".repeat(1000));
    assert_eq!(adapter.estimate(&source), adapter.estimate(&source));
  }

  #[test]
  fn min_tokens_floor_holds_for_nonempty_sources() {
    let adapter = DefaultEstimationAdapter;
    let source = Source::from_text("x");
    let estimate = adapter.estimate(&source);
    assert!(estimate.min_tokens >= MIN_TOKENS_FLOOR);
    assert!(estimate.is_valid());
  }

  #[test]
  fn aggregate_sums_components_and_caps_confidence() {
    let a = TokenEstimate::new(10, 20, 30, 0.95);
    let b = TokenEstimate::new(5, 10, 15, 0.99);
    let aggregated = TokenEstimate::aggregate(&[a, b]);
    assert_eq!(aggregated.min_tokens, 15);
    assert_eq!(aggregated.expected_tokens, 30);
    assert_eq!(aggregated.max_tokens, 45);
    assert!(aggregated.confidence <= 0.95);
    assert_eq!(aggregated.breakdown.len(), 2);
  }

  #[test]
  fn aggregate_of_empty_slice_is_zeroed() {
    let aggregated = TokenEstimate::aggregate(&[]);
    assert_eq!(aggregated.min_tokens, 0);
    assert_eq!(aggregated.confidence, 0.95);
  }
}
