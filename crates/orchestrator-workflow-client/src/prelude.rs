//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, RunHandle, WatchOutcome, WorkflowClient, WorkflowClientConfig,
    WorkflowClientError, WorkflowEvent, WorkflowStep,
};
