use std::time::Duration;

use reqwest::Url;

use crate::errors::WorkflowClientError;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4111";

/// Configuration for talking to a workflow engine.
///
/// Passed explicitly into `WorkflowClient::new` so tests can point the client
/// at a local server.
#[derive(Clone, Debug)]
pub struct WorkflowClientConfig {
    /// Base URL of the workflow engine (scheme, host, port, optional prefix).
    pub base_url: String,
    /// Name of the workflow whose runs this client manages.
    pub workflow: String,
    /// Optional API key sent as a bearer token.
    pub api_key: Option<String>,
    /// Connect timeout applied to every request, including the watch stream.
    pub connect_timeout: Duration,
    /// Whole-request timeout for create-run and start. Not applied to watch.
    pub request_timeout: Duration,
    /// Bounded event buffer size between the watcher task and the consumer.
    pub stream_buffer_capacity: usize,
}

impl WorkflowClientConfig {
    /// Creates a config for `workflow` with default endpoint and timeouts.
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            workflow: workflow.into(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            stream_buffer_capacity: 128,
        }
    }

    /// Builds a config from `WORKFLOW_NAME`, `WORKFLOW_BASE_URL` and
    /// `WORKFLOW_API_KEY`.
    pub fn from_env() -> Result<Self, WorkflowClientError> {
        let workflow = std::env::var("WORKFLOW_NAME").unwrap_or_default();
        if workflow.trim().is_empty() {
            return Err(WorkflowClientError::Config(
                "missing WORKFLOW_NAME for workflow client".into(),
            ));
        }
        let mut config = Self::new(workflow.trim());
        if let Ok(base_url) = std::env::var("WORKFLOW_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config = config.base_url(base_url.trim());
        }
        if let Ok(api_key) = std::env::var("WORKFLOW_API_KEY")
            && !api_key.trim().is_empty()
        {
            config = config.api_key(api_key.trim());
        }
        Ok(config)
    }

    /// Overrides the engine base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the bearer API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the create-run/start request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Overrides the event buffer capacity.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), WorkflowClientError> {
        if self.workflow.trim().is_empty() {
            return Err(WorkflowClientError::Config(
                "workflow name must not be empty".into(),
            ));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(WorkflowClientError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        self.endpoint("create-run", None).map(|_| ())
    }

    pub(crate) fn create_run_url(&self) -> Result<Url, WorkflowClientError> {
        self.endpoint("create-run", None)
    }

    pub(crate) fn start_url(&self, run_id: &str) -> Result<Url, WorkflowClientError> {
        self.endpoint("start", Some(run_id))
    }

    pub(crate) fn watch_url(&self, run_id: &str) -> Result<Url, WorkflowClientError> {
        self.endpoint("watch", Some(run_id))
    }

    fn endpoint(&self, action: &str, run_id: Option<&str>) -> Result<Url, WorkflowClientError> {
        let raw = format!(
            "{}/api/workflows/{}/{action}",
            self.base_url.trim_end_matches('/'),
            self.workflow.trim()
        );
        let mut url = Url::parse(&raw).map_err(|e| {
            WorkflowClientError::Config(format!("invalid workflow endpoint {raw:?}: {e}"))
        })?;
        if let Some(run_id) = run_id {
            url.query_pairs_mut().append_pair("runId", run_id);
        }
        Ok(url)
    }
}
