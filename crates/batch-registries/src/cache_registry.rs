//! [`CacheRegistry`]: cache fingerprint -> provider cache handle, TTL, and
//! hit counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::future::Cache;
use tracing::debug;

const DEFAULT_CAPACITY: u64 = 4_096;

/// A provider-side cache handle, its expiry, and a hit counter shared across
/// every caller that reused this entry.
#[derive(Debug, Clone)]
pub struct CacheRegistryEntry {
  pub cache_handle: String,
  pub expires_at: Instant,
  hits: Arc<AtomicU64>,
}

impl CacheRegistryEntry {
  pub fn new(cache_handle: impl Into<String>, ttl: Duration) -> Self {
    Self {
      cache_handle: cache_handle.into(),
      expires_at: Instant::now() + ttl,
      hits: Arc::new(AtomicU64::new(0)),
    }
  }

  fn is_expired(&self) -> bool {
    Instant::now() >= self.expires_at
  }

  fn record_hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  pub fn hit_count(&self) -> u64 {
    self.hits.load(Ordering::Relaxed)
  }
}

/// Maps a cache fingerprint (model + normalized shared parts + system
/// instruction) to a provider cache handle. Single-flight per fingerprint
/// via [`moka::future::Cache::try_get_with`]: a failed `create_cache` call
/// is never cached, so [`CacheStage`](../batch_pipeline/struct.CacheStage.html)'s
/// recovery path (clear `cache_name_to_use`, proceed uncached) can retry on
/// the next call.
pub struct CacheRegistry {
  cache: Cache<String, CacheRegistryEntry>,
}

impl CacheRegistry {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  pub fn with_capacity(capacity: u64) -> Self {
    Self {
      cache: Cache::builder().max_capacity(capacity).build(),
    }
  }

  /// Resolve `fingerprint` to a cache handle: reuse an unexpired entry
  /// (recording a hit), or run `create` exactly once across concurrent
  /// callers.
  pub async fn get_or_create<F, E>(&self, fingerprint: &str, create: F) -> Result<CacheRegistryEntry, Arc<E>>
  where
    F: Future<Output = Result<CacheRegistryEntry, E>>,
    E: std::fmt::Debug + Send + Sync + 'static,
  {
    if let Some(entry) = self.cache.get(fingerprint).await {
      if !entry.is_expired() {
        entry.record_hit();
        debug!(fingerprint, hits = entry.hit_count(), "cache registry hit");
        return Ok(entry);
      }
      self.cache.invalidate(fingerprint).await;
    }
    self.cache.try_get_with(fingerprint.to_string(), create).await
  }

  pub async fn invalidate(&self, fingerprint: &str) {
    self.cache.invalidate(fingerprint).await;
  }

  pub fn entry_count(&self) -> u64 {
    self.cache.entry_count()
  }
}

impl Default for CacheRegistry {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};

  #[tokio::test]
  async fn reuse_increments_hit_counter() {
    let registry = CacheRegistry::new();
    let first = registry
      .get_or_create("ck-1", async { Ok::<_, String>(CacheRegistryEntry::new("cachedContents/abc", Duration::from_secs(60))) })
      .await
      .unwrap();
    assert_eq!(first.hit_count(), 0);

    let second = registry
      .get_or_create("ck-1", async { unreachable!("should reuse cached entry") })
      .await
      .unwrap();
    assert_eq!(second.cache_handle, "cachedContents/abc");
    assert_eq!(second.hit_count(), 1);
  }

  #[tokio::test]
  async fn concurrent_create_for_same_fingerprint_single_flight() {
    let registry = Arc::new(CacheRegistry::new());
    let create_calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
      let registry = registry.clone();
      let create_calls = create_calls.clone();
      handles.push(tokio::spawn(async move {
        registry
          .get_or_create("ck-2", async move {
            create_calls.fetch_add(1, StdOrdering::SeqCst);
            Ok::<_, String>(CacheRegistryEntry::new("cachedContents/xyz", Duration::from_secs(60)))
          })
          .await
      }));
    }
    for handle in handles {
      handle.await.unwrap().unwrap();
    }
    assert_eq!(create_calls.load(StdOrdering::SeqCst), 1);
  }

  #[tokio::test]
  async fn failed_create_is_not_cached() {
    let registry = CacheRegistry::new();
    assert!(
      registry
        .get_or_create("ck-3", async { Err::<CacheRegistryEntry, _>("quota exceeded".to_string()) })
        .await
        .is_err()
    );
    let recovered = registry
      .get_or_create("ck-3", async { Ok::<_, String>(CacheRegistryEntry::new("cachedContents/recovered", Duration::from_secs(60))) })
      .await
      .unwrap();
    assert_eq!(recovered.cache_handle, "cachedContents/recovered");
  }
}
