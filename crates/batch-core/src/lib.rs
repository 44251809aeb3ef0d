//! Data model, configuration, and error taxonomy for the LLM batch
//! execution core: the `Source`/`APICall`/`ExecutionPlan` shapes, the
//! monotonic `InitialCommand -> ... -> ResultEnvelope` progression, and
//! the hierarchical [`error::PolluxError`] taxonomy every stage in
//! `batch-pipeline` resolves its failures to.

pub mod api;
pub mod commands;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod models;
pub mod options;
pub mod source;
pub mod tokens;

pub use api::{APICall, APIPart, ExecutionPlan, RateConstraint, TokenValidation, UploadTask};
pub use commands::{
  FinalizedCommand, InitialCommand, Outcome, PlannedCommand, ResolvedCommand, ResultEnvelope, Status, TelemetryData,
};
pub use concurrency::resolve_request_concurrency;
pub use config::{ConfigOverrides, FrozenConfig, audit_text, resolve_config, resolve_provider};
pub use error::PolluxError;
pub use models::{ModelTierInfo, model_tier_info, rate_constraint_for};
pub use options::{ExecutionOptions, HistoryMessage, ToolChoice};
pub use source::Source;
pub use tokens::{DefaultEstimationAdapter, EstimationAdapter, TokenEstimate};
