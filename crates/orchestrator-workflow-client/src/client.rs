use std::path::Path;
use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::WorkflowClientConfig;
use crate::errors::WorkflowClientError;
use crate::run::RunHandle;

/// Header carrying the caller's working directory on the start request.
pub const CWD_HEADER: &str = "x-workflow-cwd";

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) config: WorkflowClientConfig,
}

impl ClientInner {
    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    pub(crate) async fn start_run(
        &self,
        start_url: &Url,
        cwd: &Path,
    ) -> Result<(), WorkflowClientError> {
        let req = self
            .http
            .post(start_url.clone())
            .timeout(self.config.request_timeout)
            .header(CWD_HEADER, cwd.to_string_lossy().into_owned());
        let response = self.authorize(req).send().await.map_err(|e| {
            WorkflowClientError::transport(format!("start request failed: {e}"))
        })?;
        ensure_success(response).await?;
        Ok(())
    }

    pub(crate) fn watch_request(&self, watch_url: &Url) -> reqwest::RequestBuilder {
        self.authorize(self.http.get(watch_url.clone()))
    }
}

/// Entry point for creating workflow runs against one engine and workflow.
#[derive(Clone)]
pub struct WorkflowClient {
    pub(crate) inner: Arc<ClientInner>,
}

#[derive(Deserialize)]
struct CreateRunResponse {
    #[serde(rename = "runId")]
    run_id: Option<serde_json::Value>,
}

impl WorkflowClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: WorkflowClientConfig) -> Result<Self, WorkflowClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| WorkflowClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner: Arc::new(ClientInner { http, config }),
        })
    }

    /// Creates a client from `WorkflowClientConfig::from_env`.
    pub fn from_env() -> Result<Self, WorkflowClientError> {
        Self::new(WorkflowClientConfig::from_env()?)
    }

    /// Returns the configuration this client was built with.
    pub fn config(&self) -> &WorkflowClientConfig {
        &self.inner.config
    }

    /// Creates a new run and returns its handle.
    ///
    /// Neither the watcher nor the workflow is started; call
    /// `RunHandle::watch` and then `RunHandle::start_workflow`.
    pub async fn create_run(&self, cwd: &Path) -> Result<RunHandle, WorkflowClientError> {
        let config = &self.inner.config;
        let url = config.create_run_url()?;
        debug!(workflow = %config.workflow, url = %url, "creating workflow run");

        let req = self
            .inner
            .http
            .post(url)
            .timeout(config.request_timeout)
            .json(&serde_json::json!({ "cwd": cwd.to_string_lossy() }));
        let response = self.inner.authorize(req).send().await.map_err(|e| {
            WorkflowClientError::transport(format!("create-run request failed: {e}"))
        })?;
        let body = ensure_success(response).await?;
        let run_id = parse_run_id(&body)?;

        let start_url = config.start_url(&run_id)?;
        let watch_url = config.watch_url(&run_id)?;
        info!(workflow = %config.workflow, run_id = %run_id, "workflow run created");
        Ok(RunHandle::new(
            self.inner.clone(),
            run_id,
            start_url,
            watch_url,
        ))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<String, WorkflowClientError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| WorkflowClientError::transport(format!("failed to read response body: {e}")));
    if !status.is_success() {
        return Err(WorkflowClientError::Status {
            status: status.as_u16(),
            body: body.unwrap_or_else(|_| "<unreadable body>".to_string()),
        });
    }
    body
}

fn parse_run_id(body: &str) -> Result<String, WorkflowClientError> {
    let parsed: CreateRunResponse = serde_json::from_str(body).map_err(|e| {
        WorkflowClientError::protocol(format!("invalid create-run response: {e}"))
    })?;
    match parsed.run_id {
        Some(serde_json::Value::String(id)) if !id.trim().is_empty() => Ok(id),
        Some(serde_json::Value::String(_)) => Err(WorkflowClientError::protocol(
            "create-run response has an empty runId",
        )),
        Some(other) => Err(WorkflowClientError::protocol(format!(
            "create-run response runId is not a string: {other}"
        ))),
        None => Err(WorkflowClientError::protocol(
            "create-run response is missing runId",
        )),
    }
}
