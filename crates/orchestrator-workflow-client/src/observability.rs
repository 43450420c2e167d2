use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_LOG_FILE: &str = "workflow-client.logs.jsonl";

static INSTALLED: OnceCell<bool> = OnceCell::new();

/// Where log records go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutput {
    /// Nothing is installed; the host application owns the subscriber.
    Disabled,
    /// Compact lines on stderr.
    Console,
    /// JSON lines appended to a file. Each record carries the `watch_run`
    /// span and its `run_id`.
    JsonFile(PathBuf),
}

/// Settings for [`init_observability_with`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub output: LogOutput,
    /// `EnvFilter` directive, for example `info` or
    /// `orchestrator_workflow_client=debug`.
    pub filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Console,
            filter: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Reads settings from the process environment.
    ///
    /// - `WORKFLOW_CLIENT_OBSERVABILITY`: `off`/`false`/`0` disables output.
    /// - `WORKFLOW_CLIENT_LOG_LEVEL`, then `RUST_LOG`: filter directive.
    /// - `WORKFLOW_CLIENT_JSON_LOG_PATH`: switch to JSON lines in this file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("WORKFLOW_CLIENT_OBSERVABILITY")
            .and_then(|v| parse_switch(&v))
            .unwrap_or(true);
        let output = if !enabled {
            LogOutput::Disabled
        } else if let Some(path) = lookup("WORKFLOW_CLIENT_JSON_LOG_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
        {
            LogOutput::JsonFile(PathBuf::from(path))
        } else {
            LogOutput::Console
        };
        let filter = ["WORKFLOW_CLIENT_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(&lookup)
            .find(|directive| EnvFilter::try_new(directive).is_ok())
            .unwrap_or_else(|| "info".to_string());
        Self { output, filter }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// JSON-lines layer that records the current span and the span list, so the
/// watcher's `run_id` shows up on every record it emits.
pub(crate) fn json_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(false)
        .with_writer(writer)
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file_name)
}

/// Installs the process-wide subscriber from [`ObservabilityConfig::from_env`].
///
/// Returns whether this crate's subscriber is the active global one.
pub fn init_observability() -> bool {
    init_observability_with(ObservabilityConfig::from_env())
}

/// Installs the process-wide subscriber once. Later calls return the first
/// call's result and ignore `config`.
pub fn init_observability_with(config: ObservabilityConfig) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::new(&config.filter);
        let installed = match &config.output {
            LogOutput::Disabled => return false,
            LogOutput::Console => tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogOutput::JsonFile(path) => {
                let (dir, file_name) = split_log_path(path);
                if let Err(err) = std::fs::create_dir_all(dir) {
                    eprintln!("workflow client log directory {}: {err}", dir.display());
                }
                tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer(tracing_appender::rolling::never(dir, file_name)))
                    .try_init()
            }
        };
        installed.is_ok()
    })
}
