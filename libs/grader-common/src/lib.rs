pub mod config;
pub mod layout;
pub mod storage;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{Config, JobContext, LoadedEnv, RequiredField};
pub use layout::WorkspaceLayout;
pub use storage::ObjectLocation;
pub use types::{PipelineOutcome, ResultEnvelope, WebhookPayload};
