use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt as _;
use reqwest::Url;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::client::ClientInner;
use crate::errors::WorkflowClientError;
use crate::event::{WatchOutcome, WorkflowEvent};
use crate::framing::{RecordDecoder, Segment, decode_segment};

pub(crate) type ByteStream = Pin<
    Box<dyn futures::Stream<Item = Result<bytes::Bytes, WorkflowClientError>> + Send + 'static>,
>;

/// Handle used to request cancellation of a run's stream watcher.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The watcher closes the event channel and reports
    /// `WatchOutcome::Cancelled`. Has no effect once the watcher has stopped.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Channel ends that only the stream watcher may hold.
struct WatcherSeed {
    tx: mpsc::Sender<WorkflowEvent>,
    done_tx: oneshot::Sender<WatchOutcome>,
    abort_rx: watch::Receiver<bool>,
}

/// Handle for one workflow run, returned by `WorkflowClient::create_run`.
///
/// Attach the watcher with `watch()` before calling `start_workflow()`, then
/// drain events with `next_event()` and collect the outcome with `finish()`.
pub struct RunHandle {
    client: Arc<ClientInner>,
    run_id: String,
    start_url: Url,
    watch_url: Url,
    rx: mpsc::Receiver<WorkflowEvent>,
    done_rx: oneshot::Receiver<WatchOutcome>,
    seed: Option<WatcherSeed>,
    abort_handle: AbortHandle,
    dropped_segments: Arc<AtomicU64>,
    watcher: Option<JoinHandle<()>>,
}

impl RunHandle {
    pub(crate) fn new(
        client: Arc<ClientInner>,
        run_id: String,
        start_url: Url,
        watch_url: Url,
    ) -> Self {
        let (tx, rx) = mpsc::channel(client.config.stream_buffer_capacity);
        let (done_tx, done_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        Self {
            client,
            run_id,
            start_url,
            watch_url,
            rx,
            done_rx,
            seed: Some(WatcherSeed {
                tx,
                done_tx,
                abort_rx,
            }),
            abort_handle: AbortHandle { tx: abort_tx },
            dropped_segments: Arc::new(AtomicU64::new(0)),
            watcher: None,
        }
    }

    /// Returns the engine-assigned run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the URL used to start the run.
    pub fn start_url(&self) -> &Url {
        &self.start_url
    }

    /// Returns the URL of the run's event stream.
    pub fn watch_url(&self) -> &Url {
        &self.watch_url
    }

    /// Returns a handle that can cancel the watcher.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Number of framed segments skipped because they were not valid events.
    pub fn dropped_segments(&self) -> u64 {
        self.dropped_segments.load(Ordering::Relaxed)
    }

    /// Whether the watcher has been attached.
    pub fn is_watching(&self) -> bool {
        self.seed.is_none()
    }

    /// Whether the watcher task has run to completion.
    pub fn is_watcher_finished(&self) -> bool {
        self.watcher.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Spawns the stream watcher on the current tokio runtime and returns
    /// immediately.
    ///
    /// Can only be called once per run.
    pub fn watch(&mut self) -> Result<(), WorkflowClientError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            WorkflowClientError::Config(format!("watch requires a tokio runtime: {e}"))
        })?;
        let seed = self.seed.take().ok_or(WorkflowClientError::AlreadyWatching)?;
        debug!(run_id = %self.run_id, url = %self.watch_url, "attaching stream watcher");
        let source = StreamSource::Http {
            client: self.client.clone(),
            watch_url: self.watch_url.clone(),
        };
        let span = info_span!("watch_run", run_id = %self.run_id);
        self.watcher = Some(runtime.spawn(
            run_watcher(seed, source, self.dropped_segments.clone()).instrument(span),
        ));
        Ok(())
    }

    /// Asks the engine to start executing the run.
    ///
    /// Returns once the engine accepted the request; it does not wait for the
    /// run to finish. Events emitted before `watch()` is attached may be lost.
    pub async fn start_workflow(&self, cwd: &Path) -> Result<(), WorkflowClientError> {
        if !self.is_watching() {
            warn!(run_id = %self.run_id, "starting run before the watcher is attached");
        }
        self.client.start_run(&self.start_url, cwd).await?;
        info!(run_id = %self.run_id, "workflow run started");
        Ok(())
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the watcher has closed the event channel.
    pub async fn next_event(&mut self) -> Option<WorkflowEvent> {
        self.rx.recv().await
    }

    /// Drains remaining events and returns why the watcher stopped.
    pub async fn finish(mut self) -> Result<WatchOutcome, WorkflowClientError> {
        if !self.is_watching() {
            return Err(WorkflowClientError::NotWatching);
        }
        while self.rx.recv().await.is_some() {}

        let outcome = (&mut self.done_rx).await.map_err(|_| {
            WorkflowClientError::protocol(format!(
                "watcher for run {} ended without an outcome",
                self.run_id
            ))
        })?;
        if let Some(watcher) = self.watcher.take()
            && let Err(err) = watcher.await
        {
            warn!(run_id = %self.run_id, error = %err, "stream watcher task did not exit cleanly");
        }
        Ok(outcome)
    }
}

/// Where the watcher gets its bytes from.
enum StreamSource {
    Http {
        client: Arc<ClientInner>,
        watch_url: Url,
    },
    #[cfg(test)]
    Ready(ByteStream),
}

async fn run_watcher(seed: WatcherSeed, source: StreamSource, dropped_segments: Arc<AtomicU64>) {
    let WatcherSeed {
        tx,
        done_tx,
        mut abort_rx,
    } = seed;

    let opened = match source {
        StreamSource::Http { client, watch_url } => {
            open_stream(&client, &watch_url, &tx, &mut abort_rx).await
        }
        #[cfg(test)]
        StreamSource::Ready(stream) => Ok(stream),
    };
    let outcome = match opened {
        Ok(stream) => pump_events(stream, tx, &mut abort_rx, &dropped_segments).await,
        Err(outcome) => {
            drop(tx);
            outcome
        }
    };

    info!(
        outcome = ?outcome,
        dropped = dropped_segments.load(Ordering::Relaxed),
        "stream watcher stopped"
    );
    // The event sender is gone at this point, so consumers observe the closed
    // channel before the outcome.
    let _ = done_tx.send(outcome);
}

async fn open_stream(
    client: &ClientInner,
    watch_url: &Url,
    tx: &mpsc::Sender<WorkflowEvent>,
    abort_rx: &mut watch::Receiver<bool>,
) -> Result<ByteStream, WatchOutcome> {
    let response = tokio::select! {
        biased;
        _ = abort_requested(abort_rx) => return Err(WatchOutcome::Cancelled),
        _ = tx.closed() => return Err(WatchOutcome::ConsumerDropped),
        response = client.watch_request(watch_url).send() => response
            .map_err(|e| WatchOutcome::StreamFailed(format!("watch request failed: {e}")))?,
    };
    let status = response.status();
    if !status.is_success() {
        return Err(WatchOutcome::StreamFailed(format!(
            "watch request returned status {status}"
        )));
    }
    Ok(Box::pin(response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| WorkflowClientError::transport(format!("watch stream read failed: {e}")))
    })))
}

/// Reads `stream` until a terminal event, end of stream, a read error or
/// cancellation. `tx` is dropped on return, which closes the event channel.
pub(crate) async fn pump_events(
    mut stream: ByteStream,
    tx: mpsc::Sender<WorkflowEvent>,
    abort_rx: &mut watch::Receiver<bool>,
    dropped_segments: &AtomicU64,
) -> WatchOutcome {
    let mut decoder = RecordDecoder::default();
    loop {
        let next = tokio::select! {
            biased;
            _ = abort_requested(abort_rx) => return WatchOutcome::Cancelled,
            _ = tx.closed() => return WatchOutcome::ConsumerDropped,
            next = stream.next() => next,
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => return WatchOutcome::StreamFailed(err.to_string()),
            None => {
                let remainder = decoder.take_remainder();
                if !matches!(decode_segment(&remainder), Segment::Blank) {
                    note_dropped(dropped_segments, "unterminated trailing segment");
                }
                return WatchOutcome::StreamEnded;
            }
        };

        for segment in decoder.push_chunk(&chunk) {
            let event = match decode_segment(&segment) {
                Segment::Event(event) => event,
                Segment::Blank => continue,
                Segment::Malformed(reason) => {
                    note_dropped(dropped_segments, &reason);
                    continue;
                }
            };
            let terminal = event.is_terminal();
            let sent = tokio::select! {
                biased;
                _ = abort_requested(abort_rx) => return WatchOutcome::Cancelled,
                sent = tx.send(event) => sent.is_ok(),
            };
            if !sent {
                return WatchOutcome::ConsumerDropped;
            }
            if terminal {
                return WatchOutcome::Finished;
            }
        }
    }
}

fn note_dropped(dropped_segments: &AtomicU64, reason: &str) {
    let total = dropped_segments.fetch_add(1, Ordering::Relaxed) + 1;
    debug!(reason, dropped = total, "skipping undecodable watch segment");
}

/// Resolves once cancellation is requested. Never resolves if every
/// `AbortHandle` is gone without aborting.
async fn abort_requested(abort_rx: &mut watch::Receiver<bool>) {
    let requested = abort_rx.wait_for(|aborted| *aborted).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
