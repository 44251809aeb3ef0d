//! Common test utilities for the batch execution core's integration tests.

#![allow(dead_code)]

use gembatch::{ConfigOverrides, Executor, FrozenConfig, resolve_config};

/// A mock-mode executor over default configuration: `use_real_api=false`,
/// so every test here exercises the full pipeline without any network I/O.
pub fn mock_executor() -> Executor {
  Executor::new(FrozenConfig::default())
}

/// A mock-mode executor built through the full `resolve_config` precedence
/// chain, for tests that want to assert on resolution behavior too.
pub fn mock_executor_with(overrides: ConfigOverrides) -> Executor {
  let config = resolve_config(overrides).expect("overrides should resolve for a mock run");
  Executor::new(config)
}
