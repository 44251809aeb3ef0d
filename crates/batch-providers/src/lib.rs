//! The provider adapter seam: [`adapter::ProviderAdapter`] plus the
//! concrete Gemini, OpenAI, Anthropic, and mock adapters, and
//! [`registry::select_adapter`], the single place that branches on
//! provider name.

pub mod adapter;
pub mod anthropic;
pub mod config;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod request;

pub use adapter::{CacheHandle, CachingCapability, ProviderAdapter, UploadsCapability};
pub use anthropic::AnthropicAdapter;
pub use config::build_provider_config;
pub use gemini::GeminiAdapter;
pub use mock::MockAdapter;
pub use openai::{OpenAiAdapter, to_strict_schema};
pub use registry::select_adapter;
pub use request::{CacheCreateRequest, ProviderRequest, ProviderResponse};
