//! [`FileRegistry`]: fingerprint -> provider-side remote URI, with
//! single-flight upload collapsing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use tracing::{debug, trace};

const DEFAULT_CAPACITY: u64 = 10_000;
/// Default remote-URI expiry used when the adapter does not report one
/// (providers that upload files for a fixed, documented lifetime — e.g.
/// Gemini's 48h file-API retention — should report their own via
/// [`FileRegistryEntry::new`]).
const DEFAULT_TTL: Duration = Duration::from_secs(48 * 3600);

/// A resolved upload: the provider-side URI plus when it stops being valid.
#[derive(Debug, Clone)]
pub struct FileRegistryEntry {
  pub remote_uri: String,
  pub expires_at: Instant,
}

impl FileRegistryEntry {
  pub fn new(remote_uri: impl Into<String>, ttl: Duration) -> Self {
    Self {
      remote_uri: remote_uri.into(),
      expires_at: Instant::now() + ttl,
    }
  }

  pub fn with_default_ttl(remote_uri: impl Into<String>) -> Self {
    Self::new(remote_uri, DEFAULT_TTL)
  }

  fn is_expired(&self) -> bool {
    Instant::now() >= self.expires_at
  }
}

/// Maps a content fingerprint to its uploaded remote URI. Lives for the
/// lifetime of the executor; safe for concurrent access.
///
/// Mutation is single-flight per fingerprint: concurrent callers requesting
/// the same fingerprint share one in-flight upload via
/// [`moka::future::Cache::try_get_with`], which never caches an `Err`
/// result, matching the "failed uploads are not cached" requirement.
pub struct FileRegistry {
  cache: Cache<String, FileRegistryEntry>,
}

impl FileRegistry {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  pub fn with_capacity(capacity: u64) -> Self {
    Self {
      cache: Cache::builder().max_capacity(capacity).build(),
    }
  }

  /// Resolve `fingerprint` to a remote URI: reuse an unexpired entry, or run
  /// `upload` exactly once across any number of concurrent callers.
  pub async fn get_or_upload<F, E>(&self, fingerprint: &str, upload: F) -> Result<FileRegistryEntry, Arc<E>>
  where
    F: Future<Output = Result<FileRegistryEntry, E>>,
    E: std::fmt::Debug + Send + Sync + 'static,
  {
    if let Some(entry) = self.cache.get(fingerprint).await {
      if !entry.is_expired() {
        trace!(fingerprint, "file registry hit");
        return Ok(entry);
      }
      debug!(fingerprint, "file registry entry expired, re-uploading");
      self.cache.invalidate(fingerprint).await;
    }
    self.cache.try_get_with(fingerprint.to_string(), upload).await
  }

  pub async fn invalidate(&self, fingerprint: &str) {
    self.cache.invalidate(fingerprint).await;
  }

  pub fn entry_count(&self) -> u64 {
    self.cache.entry_count()
  }
}

impl Default for FileRegistry {
  fn default() -> Self {
    Self::new()
  }
}
