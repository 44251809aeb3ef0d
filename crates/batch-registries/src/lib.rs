//! Single-flight registries the executor owns and injects into pipeline
//! stages: [`file_registry::FileRegistry`] for uploads,
//! [`cache_registry::CacheRegistry`] for provider content caches. Stages
//! never reach back to the executor.

pub mod cache_registry;
pub mod file_registry;
pub mod fingerprint;

pub use cache_registry::{CacheRegistry, CacheRegistryEntry};
pub use file_registry::{FileRegistry, FileRegistryEntry};
pub use fingerprint::{fingerprint_bytes, fingerprint_cache_key, fingerprint_identifier};
