//! Content fingerprints: the keys [`crate::file_registry::FileRegistry`] and
//! [`crate::cache_registry::CacheRegistry`] key their single-flight entries
//! on.

use sha2::{Digest, Sha256};

/// Fingerprint raw bytes (used when a [`Source`](batch_core::source::Source)
/// is small enough to hash directly).
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

/// Fingerprint a file by identifier + size + modified time, avoiding a full
/// read for large files that are about to be uploaded wholesale anyway.
pub fn fingerprint_identifier(identifier: &str, size_bytes: u64, mtime_secs: i64) -> String {
  let mut hasher = Sha256::new();
  hasher.update(identifier.as_bytes());
  hasher.update(size_bytes.to_le_bytes());
  hasher.update(mtime_secs.to_le_bytes());
  hex::encode(hasher.finalize())
}

/// Fingerprint a cache-eligible call shape: model + normalized shared parts
/// + system instruction.
pub fn fingerprint_cache_key(model_name: &str, normalized_shared_parts: &str, system_instruction: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(model_name.as_bytes());
  hasher.update([0u8]);
  hasher.update(normalized_shared_parts.as_bytes());
  hasher.update([0u8]);
  hasher.update(system_instruction.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_bytes_fingerprint_identically() {
    assert_eq!(fingerprint_bytes(b"hello"), fingerprint_bytes(b"hello"));
    assert_ne!(fingerprint_bytes(b"hello"), fingerprint_bytes(b"hellp"));
  }

  #[test]
  fn cache_key_distinguishes_model_and_instruction() {
    let a = fingerprint_cache_key("gemini-2.0-flash", "shared", "be terse");
    let b = fingerprint_cache_key("gemini-1.5-pro", "shared", "be terse");
    let c = fingerprint_cache_key("gemini-2.0-flash", "shared", "be verbose");
    assert_ne!(a, b);
    assert_ne!(a, c);
  }
}
