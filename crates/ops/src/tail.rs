#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use metrics::counter;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use runboard_api::{ApiResult, LogQuery, LogSource, Order};
use runboard_core::LogEntry;

use crate::{CancelHandle, StreamHandle, TailOptions};

/// A running log tail.
///
/// `entries` yields the backlog oldest-first, then every polled entry. An `Err` item means
/// the backlog fetch failed and the tail has stopped. `last_timestamp` tracks the newest
/// timestamp delivered so far.
pub struct LogTail {
    pub entries: StreamHandle<ApiResult<LogEntry>>,
    pub last_timestamp: watch::Receiver<Option<DateTime<Utc>>>,
}

/// Start tailing `filter` in `project`. Must be called inside a tokio runtime.
pub fn tail_logs(
    source: Arc<dyn LogSource>,
    project: String,
    filter: String,
    opts: TailOptions,
) -> LogTail {
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let (ts_tx, ts_rx) = watch::channel(None);
    let worker = Tailer { source, project, filter, opts, token: token.clone(), tx, last: ts_tx };
    tokio::spawn(worker.run());
    LogTail { entries: StreamHandle { rx, cancel: CancelHandle::new(token) }, last_timestamp: ts_rx }
}

struct Tailer {
    source: Arc<dyn LogSource>,
    project: String,
    filter: String,
    opts: TailOptions,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<ApiResult<LogEntry>>,
    last: watch::Sender<Option<DateTime<Utc>>>,
}

impl Tailer {
    async fn run(self) {
        info!(project = %self.project, filter = %self.filter, backlog = self.opts.backlog, "logtail: start");
        let anchor = match self.backlog().await {
            Ok(Some(ts)) => ts,
            // nothing recent: only show what arrives from now on
            Ok(None) => Utc::now(),
            Err(()) => return,
        };
        self.last.send_replace(Some(anchor));
        self.poll(anchor).await;
        info!(project = %self.project, "logtail: ended");
    }

    /// `Ok(max timestamp)` once the backlog is delivered, `Err` when the tail must stop.
    async fn backlog(&self) -> Result<Option<DateTime<Utc>>, ()> {
        let query = LogQuery {
            project: self.project.clone(),
            filter: self.filter.clone(),
            order: Order::NewestFirst,
            limit: Some(self.opts.backlog),
        };
        let mut stream = self.source.entries(query).take(self.opts.backlog);
        let mut newest_first = Vec::with_capacity(self.opts.backlog);
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(()),
                n = stream.next() => n,
            };
            match next {
                Some(Ok(entry)) => newest_first.push(entry),
                Some(Err(e)) => {
                    warn!(error = %e, "logtail: backlog fetch failed");
                    if !self.token.is_cancelled() {
                        let _ = self.tx.send(Err(e));
                    }
                    return Err(());
                }
                None => break,
            }
        }
        let mut last = None;
        for entry in newest_first.into_iter().rev() {
            if !self.deliver(entry, &mut last) {
                return Err(());
            }
        }
        debug!(last = ?last, "logtail: backlog delivered");
        Ok(last)
    }

    async fn poll(&self, mut last: DateTime<Utc>) {
        let period = self.opts.poll_interval;
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                _ = tick.tick() => {}
            }
            let query = LogQuery {
                project: self.project.clone(),
                filter: since_filter(&self.filter, last),
                order: Order::OldestFirst,
                limit: None,
            };
            let mut stream = self.source.entries(query);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = self.token.cancelled() => return,
                    n = stream.next() => n,
                };
                match next {
                    Some(Ok(entry)) => {
                        let mut seen = Some(last);
                        if !self.deliver(entry, &mut seen) {
                            return;
                        }
                        if let Some(ts) = seen {
                            last = ts;
                        }
                    }
                    Some(Err(e)) => {
                        counter!("logtail_poll_errors_total", 1u64);
                        debug!(error = %e, "logtail: poll failed; retrying next tick");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    /// Send one entry unless cancelled. Returns false when the tail should stop.
    fn deliver(&self, entry: LogEntry, last: &mut Option<DateTime<Utc>>) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        if last.map(|l| entry.timestamp > l).unwrap_or(true) {
            *last = Some(entry.timestamp);
            self.last.send_replace(*last);
        }
        counter!("logtail_entries_total", 1u64);
        self.tx.send(Ok(entry)).is_ok()
    }
}

/// `<filter> AND timestamp > "<ts>"` with nanosecond precision.
pub(crate) fn since_filter(filter: &str, ts: DateTime<Utc>) -> String {
    format!("{} AND timestamp > \"{}\"", filter, ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use runboard_api::mock::MockCloud;
    use runboard_api::ApiError;
    use std::time::Duration;

    fn at(s: u32) -> LogEntry {
        LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, s).unwrap(),
            severity: "INFO".into(),
            payload: format!("line {s}"),
        }
    }

    fn fast() -> TailOptions {
        TailOptions { backlog: 50, poll_interval: Duration::from_millis(20) }
    }

    async fn next(tail: &mut LogTail) -> LogEntry {
        tokio::time::timeout(Duration::from_secs(2), tail.entries.rx.recv())
            .await
            .expect("entry in time")
            .expect("channel open")
            .expect("entry ok")
    }

    #[tokio::test]
    async fn scenario_b_backlog_reversed_then_polled() {
        let cloud = Arc::new(MockCloud::new().with_log_backlog(vec![at(2), at(1)]));
        cloud.push_log_poll(Ok(vec![at(3)]));
        let mut tail = tail_logs(cloud.clone(), "p".into(), "f".into(), fast());
        assert_eq!(next(&mut tail).await.timestamp, at(1).timestamp);
        assert_eq!(next(&mut tail).await.timestamp, at(2).timestamp);
        assert_eq!(next(&mut tail).await.timestamp, at(3).timestamp);
        assert_eq!(*tail.last_timestamp.borrow(), Some(at(3).timestamp));
        let polled = cloud.calls().into_iter().find(|c| c.contains("OldestFirst")).unwrap();
        assert!(polled.contains(r#"f AND timestamp > "2024-05-01T10:00:02.000000000Z""#), "{polled}");
        tail.entries.cancel.cancel();
    }

    #[tokio::test]
    async fn backlog_is_bounded_and_chronological() {
        let rows: Vec<_> = (0..59).map(at).collect();
        let cloud = Arc::new(MockCloud::new().with_log_backlog(rows));
        let mut tail = tail_logs(cloud, "p".into(), "f".into(), fast());
        let mut got = Vec::new();
        for _ in 0..50 {
            got.push(next(&mut tail).await.timestamp);
        }
        assert!(got.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(got.last().copied(), Some(at(58).timestamp));
        assert_eq!(got.first().copied(), Some(at(9).timestamp));
    }

    #[tokio::test]
    async fn poll_errors_are_swallowed() {
        let cloud = Arc::new(MockCloud::new().with_log_backlog(vec![at(1)]));
        cloud.push_log_poll(Err(ApiError::Transport("hiccup".into())));
        cloud.push_log_poll(Ok(vec![at(5)]));
        let mut tail = tail_logs(cloud, "p".into(), "f".into(), fast());
        assert_eq!(next(&mut tail).await.timestamp, at(1).timestamp);
        assert_eq!(next(&mut tail).await.timestamp, at(5).timestamp);
    }

    #[tokio::test]
    async fn backlog_failure_is_reported_and_ends_tail() {
        struct Broken;
        impl LogSource for Broken {
            fn entries(&self, _q: LogQuery) -> futures::stream::BoxStream<'static, ApiResult<LogEntry>> {
                futures::stream::iter(vec![Err(ApiError::Auth("no token".into()))]).boxed()
            }
        }
        let mut tail = tail_logs(Arc::new(Broken), "p".into(), "f".into(), fast());
        let first = tail.entries.rx.recv().await.expect("one item");
        assert!(matches!(first, Err(ApiError::Auth(_))));
        assert!(tail.entries.rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn nothing_delivered_after_cancel() {
        struct Endless;
        impl LogSource for Endless {
            fn entries(&self, q: LogQuery) -> futures::stream::BoxStream<'static, ApiResult<LogEntry>> {
                if q.order == Order::NewestFirst {
                    return futures::stream::empty().boxed();
                }
                async_stream::stream! {
                    loop {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        yield Ok::<LogEntry, ApiError>(LogEntry { timestamp: Utc::now(), severity: "INFO".into(), payload: "x".into() });
                    }
                }
                .boxed()
            }
        }
        let mut tail = tail_logs(Arc::new(Endless), "p".into(), "f".into(), fast());
        let _ = next(&mut tail).await;
        let LogTail { entries: StreamHandle { mut rx, cancel }, .. } = tail;
        cancel.cancel();
        // drain whatever was queued before the cancel; then the channel must close
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "tail kept delivering after cancel");
    }

    #[test]
    fn since_filter_uses_nanos() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 3).unwrap();
        assert_eq!(since_filter("x", ts), r#"x AND timestamp > "2024-05-01T10:00:03.000000000Z""#);
    }
}
