#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::info;

use runboard_api::LogSource;
use runboard_ops::{tail_logs, CancelHandle, LogTail, StreamHandle, TailOptions};

use crate::model::{UiUpdate, UpdateSink};

/// Start a tail and a pump that forwards its entries to the UI as `[HH:MM:SS] payload` lines.
/// Dropping the returned handle stops both.
pub fn start_log_pump(
    handle: &Handle,
    source: Arc<dyn LogSource>,
    project: String,
    filter: String,
    opts: TailOptions,
    tail: u64,
    sink: Arc<dyn UpdateSink>,
) -> (CancelHandle, watch::Receiver<Option<DateTime<Utc>>>) {
    let _rt = handle.enter();
    info!(tail, project = %project, filter = %filter, "logs: start requested");
    let LogTail { entries: StreamHandle { mut rx, cancel }, last_timestamp } =
        tail_logs(source, project, filter, opts);
    let token = cancel.token();
    handle.spawn(async move {
        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = rx.recv() => item,
            };
            match item {
                Some(Ok(entry)) => sink.send(UiUpdate::LogLine { tail, line: entry.line() }),
                Some(Err(e)) => sink.send(UiUpdate::LogFailed { tail, error: e.to_string() }),
                None => {
                    sink.send(UiUpdate::LogEnded { tail });
                    break;
                }
            }
        }
        info!(tail, "logs: pump ended");
    });
    (cancel, last_timestamp)
}
