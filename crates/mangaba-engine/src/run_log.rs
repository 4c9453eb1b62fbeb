use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mangaba_core::event::EventBus;
use mangaba_core::types::FlowEvent;

/// JSONL run logger.
///
/// Subscribes to the EventBus and appends one JSON object per flow event to
/// `{log_dir}/{execution_id}.jsonl`, flushing after every line. The file is
/// opened on the first event and closed after the run's terminal event.
pub struct RunLogger {
    log_dir: PathBuf,
}

#[derive(Serialize, Debug)]
struct LogEntry {
    timestamp: String,
    execution_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    /// Subscribe now and log in a background task until the run ends or
    /// `cancel` fires.
    ///
    /// Subscribing before spawning means no event published after this call
    /// is missed.
    pub fn attach(self, bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = bus.subscribe();
        tokio::spawn(self.run(rx, cancel))
    }

    async fn run(self, mut rx: Receiver<FlowEvent>, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, path = %self.log_dir.display(), "Failed to create log directory");
            return;
        }

        let mut writer: Option<(PathBuf, BufWriter<File>)> = None;
        let mut skipped: u64 = 0;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => match result {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "RunLogger lagged, recording the gap");
                        skipped += n;
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        debug!("EventBus closed, RunLogger stopping");
                        break;
                    }
                },
            };

            if writer.is_none() {
                let path = self.log_path(&event.execution_id().0);
                match open_append(&path).await {
                    Ok(file) => {
                        info!(path = %path.display(), "RunLogger started");
                        writer = Some((path, BufWriter::new(file)));
                    }
                    Err(e) => {
                        error!(error = %e, path = %path.display(), "Failed to open log file");
                        return;
                    }
                }
            }

            let mut entries = Vec::with_capacity(2);
            if skipped > 0 {
                entries.push(gap_entry(&event, skipped));
                skipped = 0;
            }
            entries.push(to_entry(&event));

            if let Some((_, w)) = writer.as_mut() {
                for entry in &entries {
                    let Ok(json) = serde_json::to_string(entry) else {
                        continue;
                    };
                    if let Err(e) = w.write_all(format!("{}\n", json).as_bytes()).await {
                        error!(error = %e, "Failed to write log entry");
                        return;
                    }
                }
                if let Err(e) = w.flush().await {
                    error!(error = %e, "Failed to flush log");
                }
            }

            if event.is_terminal() {
                break;
            }
        }

        if let Some((path, mut w)) = writer {
            w.flush().await.ok();
            debug!(path = %path.display(), "RunLogger finished");
        }
    }

    fn log_path(&self, execution_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", execution_id))
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

/// Marks events the broadcast channel dropped before `event` arrived.
fn gap_entry(event: &FlowEvent, skipped: u64) -> LogEntry {
    LogEntry {
        timestamp: Utc::now().to_rfc3339(),
        execution_id: event.execution_id().0.clone(),
        event_type: "events_dropped",
        node_id: None,
        detail: Some(serde_json::json!({ "skipped": skipped })),
    }
}

fn to_entry(event: &FlowEvent) -> LogEntry {
    let timestamp = Utc::now().to_rfc3339();
    let execution_id = event.execution_id().0.clone();

    match event {
        FlowEvent::RunStarted { node_count, .. } => LogEntry {
            timestamp,
            execution_id,
            event_type: "run_started",
            node_id: None,
            detail: Some(serde_json::json!({ "node_count": node_count })),
        },
        FlowEvent::StepChanged { step, .. } => LogEntry {
            timestamp,
            execution_id,
            event_type: "step_changed",
            node_id: Some(step.node_id.clone()),
            detail: Some(serde_json::json!({
                "status": step.status,
                "error": step.error,
            })),
        },
        FlowEvent::RunCompleted { output, .. } => LogEntry {
            timestamp,
            execution_id,
            event_type: "run_completed",
            node_id: None,
            detail: output.as_ref().map(|o| serde_json::json!({ "output": o })),
        },
        FlowEvent::RunFailed { error, .. } => LogEntry {
            timestamp,
            execution_id,
            event_type: "run_failed",
            node_id: None,
            detail: Some(serde_json::json!({ "error": error })),
        },
    }
}
