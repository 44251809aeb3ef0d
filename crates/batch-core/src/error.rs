//! Hierarchical error taxonomy for the batch execution core.
//!
//! Every error descends (conceptually) from [`PolluxError`]. Each concrete
//! error type carries the same structured metadata — `hint`, `retryable`,
//! `status_code`, `retry_after_s`, `provider`, `phase`, `call_idx` — via a
//! shared [`ErrorDetail`] payload, matching the fields an adapter or stage
//! may need to attach without inventing a bespoke shape per error site.

use std::fmt;
use std::ops::Deref;

/// HTTP status codes considered retryable across the whole core: shared by
/// provider adapters when mapping transport errors and by [`APIHandler`]'s
/// retry loop, so the set is defined exactly once.
///
/// [`APIHandler`]: ../pipeline/struct.APIHandler.html
pub const RETRYABLE_STATUS_CODES: [u16; 7] = [408, 409, 429, 500, 502, 503, 504];

/// Returns `true` when `status_code` is in [`RETRYABLE_STATUS_CODES`].
pub fn is_retryable_status(status_code: u16) -> bool {
  RETRYABLE_STATUS_CODES.contains(&status_code)
}

/// Actionable hint strings surfaced alongside specific failure conditions.
pub mod hints {
  /// Hint attached when `use_real_api=true` but no API key resolved.
  pub const MISSING_API_KEY: &str =
    "Set <PROVIDER>_API_KEY environment variable or pass api_key explicitly.";
  /// Hint for HTTP 401 Unauthorized.
  pub const INVALID_API_KEY: &str = "Verify GEMINI_API_KEY is valid.";
  /// Hint for HTTP 429 Too Many Requests.
  pub const RATE_LIMITED: &str = "Rate limit exceeded; wait and retry.";
}

/// Map an HTTP status code to a stable, user-facing hint string.
///
/// Returns `None` for status codes with no canned hint.
pub fn get_http_error_hint(status_code: u16) -> Option<&'static str> {
  match status_code {
    401 => Some(hints::INVALID_API_KEY),
    429 => Some(hints::RATE_LIMITED),
    _ => None,
  }
}

/// Structured metadata shared by every error in the taxonomy.
///
/// Holding this as a single payload (rather than duplicating seven optional
/// fields on every error struct) keeps constructors short; each concrete
/// error type derefs to it so callers can still write `err.hint` directly.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetail {
  pub message: String,
  pub hint: Option<String>,
  pub retryable: Option<bool>,
  pub status_code: Option<u16>,
  pub retry_after_s: Option<f64>,
  pub provider: Option<String>,
  pub phase: Option<String>,
  pub call_idx: Option<usize>,
}

impl ErrorDetail {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      ..Default::default()
    }
  }

  pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
    self.hint = Some(hint.into());
    self
  }

  pub fn with_retryable(mut self, retryable: bool) -> Self {
    self.retryable = Some(retryable);
    self
  }

  pub fn with_status_code(mut self, status_code: u16) -> Self {
    self.status_code = Some(status_code);
    self
  }

  pub fn with_retry_after_s(mut self, retry_after_s: f64) -> Self {
    self.retry_after_s = Some(retry_after_s);
    self
  }

  pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
    self.provider = Some(provider.into());
    self
  }

  pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
    self.phase = Some(phase.into());
    self
  }

  pub fn with_call_idx(mut self, call_idx: usize) -> Self {
    self.call_idx = Some(call_idx);
    self
  }
}

impl fmt::Display for ErrorDetail {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.message)
  }
}

/// Declare a concrete error type that wraps [`ErrorDetail`] and derefs to it.
macro_rules! detail_error {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, thiserror::Error)]
    #[error("{0}")]
    pub struct $name(pub ErrorDetail);

    impl $name {
      pub fn new(message: impl Into<String>) -> Self {
        Self(ErrorDetail::new(message))
      }

      // `Deref<Target = ErrorDetail>` only exposes `&ErrorDetail`, which
      // can't satisfy a by-value builder, so the common one is forwarded.
      pub fn with_hint(self, hint: impl Into<String>) -> Self {
        Self(self.0.with_hint(hint))
      }
    }

    impl Deref for $name {
      type Target = ErrorDetail;
      fn deref(&self) -> &ErrorDetail {
        &self.0
      }
    }

    impl From<ErrorDetail> for $name {
      fn from(detail: ErrorDetail) -> Self {
        Self(detail)
      }
    }
  };
}

detail_error!(
  /// `use_real_api=true` with no resolvable API key, a malformed provider
  /// name, or any other configuration-resolution failure.
  ConfigurationError
);
detail_error!(
  /// A file-typed [`Source`](crate::source::Source) points at an
  /// unreadable or non-existent path.
  SourceError
);
detail_error!(
  /// A file read failed after the source was accepted (e.g. permission
  /// revoked between classification and upload).
  FileError
);
detail_error!(
  /// A provider requires a MIME type that could not be determined.
  UnsupportedContentError
);
detail_error!(
  /// A value failed a structural invariant check (e.g. a malformed
  /// `ExecutionOptions` field).
  ValidationError
);
detail_error!(
  /// A pipeline stage failed in a way that is not one of the more specific
  /// categories above.
  PipelineError
);
detail_error!(
  /// A `POLLUX_PIPELINE_VALIDATE=1` dev-time invariant check failed.
  InvariantViolationError
);

/// A provider or transport-level failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ApiError(pub ErrorDetail);

impl ApiError {
  pub fn new(message: impl Into<String>) -> Self {
    Self(ErrorDetail::new(message))
  }

  /// Whether this error should be retried, per the fixed retry matrix:
  /// an explicit `retryable` flag wins; otherwise fall back to the status
  /// code membership in [`RETRYABLE_STATUS_CODES`].
  pub fn is_retryable(&self) -> bool {
    if let Some(retryable) = self.retryable {
      return retryable;
    }
    self.status_code.map(is_retryable_status).unwrap_or(false)
  }

  // `Deref<Target = ErrorDetail>` only exposes `&ErrorDetail`, which can't
  // satisfy `ErrorDetail`'s by-value builder methods, so each is forwarded
  // here rather than relying on deref coercion to find them.
  pub fn with_hint(self, hint: impl Into<String>) -> Self {
    Self(self.0.with_hint(hint))
  }

  pub fn with_retryable(self, retryable: bool) -> Self {
    Self(self.0.with_retryable(retryable))
  }

  pub fn with_status_code(self, status_code: u16) -> Self {
    Self(self.0.with_status_code(status_code))
  }

  pub fn with_retry_after_s(self, retry_after_s: f64) -> Self {
    Self(self.0.with_retry_after_s(retry_after_s))
  }

  pub fn with_provider(self, provider: impl Into<String>) -> Self {
    Self(self.0.with_provider(provider))
  }

  pub fn with_phase(self, phase: impl Into<String>) -> Self {
    Self(self.0.with_phase(phase))
  }

  pub fn with_call_idx(self, call_idx: usize) -> Self {
    Self(self.0.with_call_idx(call_idx))
  }
}

impl Deref for ApiError {
  type Target = ErrorDetail;
  fn deref(&self) -> &ErrorDetail {
    &self.0
  }
}

impl From<ErrorDetail> for ApiError {
  fn from(detail: ErrorDetail) -> Self {
    Self(detail)
  }
}

/// An [`ApiError`] specializing a cache-creation or cache-lookup failure.
///
/// Cache failures are always non-fatal and recovered by the caller; this
/// type exists so diagnostics can distinguish "the cache failed" from
/// "generation failed" while still being convertible to the more general
/// [`ApiError`]/[`PolluxError`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct CacheError(pub ApiError);

impl CacheError {
  pub fn new(message: impl Into<String>) -> Self {
    Self(ApiError::new(message))
  }
}

impl Deref for CacheError {
  type Target = ApiError;
  fn deref(&self) -> &ApiError {
    &self.0
  }
}

impl From<ApiError> for CacheError {
  fn from(err: ApiError) -> Self {
    Self(err)
  }
}

impl From<CacheError> for ApiError {
  fn from(err: CacheError) -> Self {
    err.0
  }
}

/// An [`ApiError`] specializing a rate-limit (HTTP 429) rejection.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct RateLimitError(pub ApiError);

impl RateLimitError {
  pub fn new(message: impl Into<String>) -> Self {
    Self(ApiError::new(message).with_status_code(429).with_retryable(true))
  }
}

impl Deref for RateLimitError {
  type Target = ApiError;
  fn deref(&self) -> &ApiError {
    &self.0
  }
}

impl From<ApiError> for RateLimitError {
  fn from(err: ApiError) -> Self {
    Self(err)
  }
}

impl From<RateLimitError> for ApiError {
  fn from(err: RateLimitError) -> Self {
    err.0
  }
}

/// Root of the error taxonomy. Every stage-level `Result` in this crate
/// family resolves its error type to `PolluxError` at the executor
/// boundary (individual stages may return their own narrower error type).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolluxError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
  #[error(transparent)]
  Source(#[from] SourceError),
  #[error(transparent)]
  File(#[from] FileError),
  #[error(transparent)]
  UnsupportedContent(#[from] UnsupportedContentError),
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error(transparent)]
  Pipeline(#[from] PipelineError),
  #[error(transparent)]
  InvariantViolation(#[from] InvariantViolationError),
  #[error(transparent)]
  Api(#[from] ApiError),
  #[error(transparent)]
  Cache(#[from] CacheError),
  #[error(transparent)]
  RateLimit(#[from] RateLimitError),
}

impl PolluxError {
  /// Best-effort hint extraction, used by the executor to populate
  /// `diagnostics.error` without a big match on every variant twice.
  pub fn hint(&self) -> Option<&str> {
    match self {
      Self::Configuration(e) => e.hint.as_deref(),
      Self::Source(e) => e.hint.as_deref(),
      Self::File(e) => e.hint.as_deref(),
      Self::UnsupportedContent(e) => e.hint.as_deref(),
      Self::Validation(e) => e.hint.as_deref(),
      Self::Pipeline(e) => e.hint.as_deref(),
      Self::InvariantViolation(e) => e.hint.as_deref(),
      Self::Api(e) => e.hint.as_deref(),
      Self::Cache(e) => e.hint.as_deref(),
      Self::RateLimit(e) => e.hint.as_deref(),
    }
  }
}
