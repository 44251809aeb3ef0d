//! [`resolve_request_concurrency`]: the pure four-step priority rule
//! shared by `RateLimitHandler` and anything else that needs to know how
//! wide to fan a batch out.

use crate::config::FrozenConfig;
use crate::options::ExecutionOptions;

/// Resolve effective request concurrency for a batch of `n_calls`, in
/// priority order:
///
/// 1. `rate_constrained` → `1` (serialize).
/// 2. `options.request_concurrency > 0` → that value.
/// 3. `config.request_concurrency > 0` → that value.
/// 4. Otherwise → `n_calls` (unbounded up to fan-out).
///
/// Any non-positive or absent `request_concurrency` is treated as `0` and
/// falls through to the next tier; this function never panics or errors.
pub fn resolve_request_concurrency(
  n_calls: usize,
  options: &ExecutionOptions,
  config: &FrozenConfig,
  rate_constrained: bool,
) -> usize {
  if rate_constrained {
    return 1;
  }
  let from_options = options.request_concurrency_or_zero();
  if from_options > 0 {
    return from_options as usize;
  }
  let from_config = config.request_concurrency.max(0);
  if from_config > 0 {
    return from_config as usize;
  }
  n_calls
}
