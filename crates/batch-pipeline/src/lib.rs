//! The seven-stage handler pipeline and executor composer for the batch
//! execution core: each module is one stage of the pipeline
//! (`SourceHandler` through `ResultBuilder`), composed by
//! [`executor::Executor`] into one `InitialCommand -> ResultEnvelope` run.

pub mod api_handler;
pub mod cache_stage;
pub mod executor;
pub mod invariants;
pub mod materialization;
pub mod planner;
pub mod rate_limit;
pub mod result_builder;
pub mod retry;
pub mod source_handler;

pub use api_handler::ApiHandler;
pub use cache_stage::CacheStage;
pub use executor::{Executor, create_executor, run_batch, run_simple};
pub use materialization::RemoteMaterializationStage;
pub use planner::ExecutionPlanner;
pub use rate_limit::{RateLimitGate, RateLimitHandler, effective_concurrency};
pub use result_builder::ResultBuilder;
pub use retry::RetryPolicy;
pub use source_handler::SourceHandler;
