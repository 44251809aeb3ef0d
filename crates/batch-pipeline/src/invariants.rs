//! `POLLUX_PIPELINE_VALIDATE=1` dev-time invariant checks. Disabled by
//! default; when enabled, a violated invariant panics at the stage boundary
//! that produced it instead of silently propagating a malformed command.

use batch_core::error::InvariantViolationError;

pub fn is_enabled() -> bool {
  std::env::var("POLLUX_PIPELINE_VALIDATE").as_deref() == Ok("1")
}

/// Panic with an [`InvariantViolationError`]-shaped message when enabled and
/// `condition` is false; a no-op otherwise.
pub fn check(condition: bool, message: impl Into<String>) {
  if is_enabled() && !condition {
    let err = InvariantViolationError::new(message.into());
    panic!("{err}");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn disabled_by_default_never_panics() {
    // SAFETY-equivalent: this test assumes the env var is unset by the
    // harness; if a sibling test sets it this would need isolation.
    unsafe { std::env::remove_var("POLLUX_PIPELINE_VALIDATE") };
    check(false, "should not panic when disabled");
  }
}
