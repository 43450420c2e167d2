//! Client driver for remote workflow runs.
//!
//! A run is created with [`WorkflowClient::create_run`], observed through the
//! stream watcher attached by [`RunHandle::watch`], and started with
//! [`RunHandle::start_workflow`]. Events arrive in wire order until the run
//! finishes, the engine closes the stream, the stream fails, or the caller
//! aborts.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use orchestrator_workflow_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), WorkflowClientError> {
//! let client = WorkflowClient::new(
//!     WorkflowClientConfig::new("planner").base_url("http://127.0.0.1:4111"),
//! )?;
//! let cwd = Path::new(".");
//!
//! let mut run = client.create_run(cwd).await?;
//! run.watch()?;
//! run.start_workflow(cwd).await?;
//!
//! while let Some(event) = run.next_event().await {
//!     if let WorkflowStep::Thinking { message: Some(message) } = event.as_step() {
//!         println!("{message}");
//!     }
//! }
//! let outcome = run.finish().await?;
//! println!("run ended: {outcome:?}");
//! # Ok(())
//! # }
//! ```

/// Run creation and the shared HTTP client.
pub mod client;
/// Engine endpoint and client configuration.
pub mod config;
/// Public error types.
pub mod errors;
/// Watch stream event types.
pub mod event;
/// Record-separator framing for the watch stream.
pub mod framing;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Run handle and stream watcher.
pub mod run;

#[cfg(test)]
mod test_server;

pub use client::WorkflowClient;
pub use config::WorkflowClientConfig;
pub use errors::WorkflowClientError;
pub use event::{FINISHED_STEP, WatchOutcome, WorkflowEvent, WorkflowStep};
pub use observability::{
    LogOutput, ObservabilityConfig, init_observability, init_observability_with,
};
pub use run::{AbortHandle, RunHandle};
