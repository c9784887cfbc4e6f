//! Model-building backend interface.
//!
//! The session only talks to the backend through [`StageBackend`], so tests
//! can drive the poll loop with scripted answers instead of HTTP.

mod http;
pub mod stage;

use async_trait::async_trait;

use crate::error::ClientResult;

pub use http::HttpBackend;
pub use stage::{decode_model_plan, decode_stage_report, ModelPlan, Stage, StageReport};

/// The two calls the client makes against the backend.
#[async_trait]
pub trait StageBackend: Send + Sync {
    /// Submit the user's prompt and receive the parsed plan.
    async fn request_model(&self, prompt: &str) -> ClientResult<ModelPlan>;

    /// Ask which stage the backend is in. `None` means no result yet.
    async fn request_stage(&self) -> ClientResult<Option<StageReport>>;

    /// Human-readable identifier for logs.
    fn name(&self) -> &str {
        "backend"
    }
}
