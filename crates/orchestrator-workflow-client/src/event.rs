use serde::{Deserialize, Serialize};

/// Step value that marks the end of a run.
pub const FINISHED_STEP: &str = "finished";

/// One event envelope decoded from a run's watch stream.
///
/// The payload is kept as raw JSON; use `step()` or `as_step()` to route on
/// the `step` discriminator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Envelope type, for example `watch`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Step-specific payload as sent by the engine.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl WorkflowEvent {
    /// Returns the payload's `step` discriminator, if present.
    pub fn step(&self) -> Option<&str> {
        self.payload.get("step").and_then(|v| v.as_str())
    }

    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        self.step() == Some(FINISHED_STEP)
    }

    /// Borrowed, step-typed view of the payload.
    pub fn as_step(&self) -> WorkflowStep<'_> {
        match self.step() {
            Some("thinking") => WorkflowStep::Thinking {
                message: self.payload.get("message").and_then(|v| v.as_str()),
            },
            Some("clarification") => WorkflowStep::Clarification {
                prompt: self.payload.get("prompt").and_then(|v| v.as_str()),
            },
            Some(FINISHED_STEP) => WorkflowStep::Finished {
                result: self.payload.get("result"),
            },
            step => WorkflowStep::Other { step },
        }
    }
}

/// Known steps of a workflow run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WorkflowStep<'a> {
    /// Free-text progress message.
    Thinking { message: Option<&'a str> },
    /// The workflow needs input from the user.
    Clarification { prompt: Option<&'a str> },
    /// Terminal step carrying the run result.
    Finished { result: Option<&'a serde_json::Value> },
    /// Unrecognized or missing step; the event is still delivered as-is.
    Other { step: Option<&'a str> },
}

/// Why the stream watcher stopped. Delivered once the event channel is closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A `finished` event was delivered.
    Finished,
    /// The engine closed the stream before a terminal event.
    StreamEnded,
    /// Connecting to or reading from the stream failed.
    StreamFailed(String),
    /// Cancellation was requested through an `AbortHandle`.
    Cancelled,
    /// The consumer dropped the event receiver.
    ConsumerDropped,
}

impl WatchOutcome {
    /// Whether the run reached its terminal event.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }
}
