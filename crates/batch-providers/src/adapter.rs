//! The provider adapter trait and its two optional capabilities.
//!
//! An adapter is any value exposing at minimum [`ProviderAdapter::generate`].
//! Uploads and caching are declared as separate traits and feature-detected
//! at runtime through [`ProviderAdapter::as_uploads`] /
//! [`ProviderAdapter::as_caching`] rather than folded into the base trait
//! with no-op default methods — so a stage can skip the whole phase when
//! the capability is absent instead of calling a method that silently does
//! nothing.

use std::time::Duration;

use async_trait::async_trait;
use batch_core::error::ApiError;

use crate::request::{CacheCreateRequest, ProviderRequest, ProviderResponse};

/// Minimum contract every provider adapter implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
  /// The provider string this adapter registers under (`"gemini"`,
  /// `"openai"`, `"anthropic"`, `"mock"`).
  fn provider_name(&self) -> &'static str;

  async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ApiError>;

  /// `Some(self)` when this adapter implements [`UploadsCapability`].
  fn as_uploads(&self) -> Option<&dyn UploadsCapability> {
    None
  }

  /// `Some(self)` when this adapter implements [`CachingCapability`].
  fn as_caching(&self) -> Option<&dyn CachingCapability> {
    None
  }
}

/// Optional: upload local bytes to a provider-side file store, returning a
/// remote URI `APIHandler`-visible calls can reference.
#[async_trait]
pub trait UploadsCapability: Send + Sync {
  async fn upload(&self, bytes: Vec<u8>, mime: String) -> Result<String, ApiError>;
}

/// Optional: materialize a provider-side content cache, returning a handle
/// a later call's `cache_name_to_use` can reference.
#[async_trait]
pub trait CachingCapability: Send + Sync {
  async fn create_cache(&self, request: CacheCreateRequest) -> Result<CacheHandle, ApiError>;
}

/// A created cache's handle and the TTL it was created with.
#[derive(Debug, Clone)]
pub struct CacheHandle {
  pub name: String,
  pub ttl: Duration,
}
