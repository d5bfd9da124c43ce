//! Busy indicator: a self-driving spinner painted through the update sink.
//!
//! `start`, `stop` and `set_context` may be called from any thread. All mutable fields
//! live behind one lock, and a frame is only sent while holding it after re-checking the
//! loop's token, so a stopped or replaced loop never paints again.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::model::{Paint, UiUpdate, UpdateSink};

pub const GLYPHS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorState {
    Idle,
    Running { message: String, context: Option<String> },
}

struct Inner {
    state: IndicatorState,
    token: Option<CancellationToken>,
}

#[derive(Clone)]
pub struct Indicator {
    inner: Arc<Mutex<Inner>>,
    sink: Arc<dyn UpdateSink>,
    handle: Handle,
    period: Duration,
    loops: Arc<AtomicUsize>,
}

impl Indicator {
    /// Must be created inside a tokio runtime.
    pub fn new(sink: Arc<dyn UpdateSink>, period: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { state: IndicatorState::Idle, token: None })),
            sink,
            handle: Handle::current(),
            period,
            loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Show `message` with a spinner. Replaces a running animation.
    pub fn start(&self, message: impl Into<String>) {
        let message = message.into();
        let token = CancellationToken::new();
        {
            let mut g = self.lock();
            if let Some(old) = g.token.take() {
                old.cancel();
            }
            g.state = IndicatorState::Running { message: message.clone(), context: None };
            g.token = Some(token.clone());
        }
        trace!(%message, "indicator: start");
        let this = self.clone();
        self.handle.spawn(async move { this.animate(token).await });
    }

    /// Go idle. A non-empty `message` is painted once; an idle indicator ignores the call.
    pub fn stop(&self, message: &str) {
        let mut g = self.lock();
        if g.state == IndicatorState::Idle {
            return;
        }
        if let Some(t) = g.token.take() {
            t.cancel();
        }
        g.state = IndicatorState::Idle;
        let paint = if message.is_empty() { Paint::Clear } else { Paint::Final(message.to_string()) };
        self.sink.send(UiUpdate::Indicator(paint));
    }

    /// Secondary line under the spinner. Ignored while idle.
    pub fn set_context(&self, context: Option<String>) {
        let mut g = self.lock();
        if let IndicatorState::Running { context: c, .. } = &mut g.state {
            *c = context;
        }
    }

    pub fn state(&self) -> IndicatorState {
        self.lock().state.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock().state, IndicatorState::Running { .. })
    }

    /// Animation loops that have not exited yet.
    pub fn active_loops(&self) -> usize {
        self.loops.load(Ordering::SeqCst)
    }

    async fn animate(self, token: CancellationToken) {
        let _live = LoopGuard::enter(&self.loops);
        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame = 0usize;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {}
            }
            let g = self.lock();
            if token.is_cancelled() {
                break;
            }
            if let IndicatorState::Running { message, context } = &g.state {
                let text = format!("{} {}", GLYPHS[frame % GLYPHS.len()], message);
                self.sink.send(UiUpdate::Indicator(Paint::Frame { text, context: context.clone() }));
            }
            frame = frame.wrapping_add(1);
        }
    }
}

struct LoopGuard(Arc<AtomicUsize>);

impl LoopGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordingSink;

    fn paints(sink: &RecordingSink) -> Vec<Paint> {
        sink.drain()
            .into_iter()
            .filter_map(|u| match u {
                UiUpdate::Indicator(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    async fn settle_loops(ind: &Indicator, want: usize) {
        for _ in 0..100 {
            if ind.active_loops() == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn restart_leaves_one_loop() {
        let sink = Arc::new(RecordingSink::new());
        let ind = Indicator::new(sink.clone(), Duration::from_millis(10));
        ind.start("first");
        ind.start("second");
        settle_loops(&ind, 1).await;
        assert_eq!(ind.active_loops(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        sink.drain();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let frames = paints(&sink);
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|p| matches!(p, Paint::Frame { text, .. } if text.ends_with("second"))));
        ind.stop("");
        settle_loops(&ind, 0).await;
        assert_eq!(ind.active_loops(), 0);
    }

    #[tokio::test]
    async fn stop_then_stop_is_idle_without_message() {
        let sink = Arc::new(RecordingSink::new());
        let ind = Indicator::new(sink.clone(), Duration::from_millis(10));
        ind.start("working");
        ind.stop("");
        ind.stop("X");
        assert_eq!(ind.state(), IndicatorState::Idle);
        let got = paints(&sink);
        assert_eq!(got.last(), Some(&Paint::Clear));
        assert!(!got.contains(&Paint::Final("X".into())));
    }

    #[tokio::test]
    async fn nothing_painted_after_stop() {
        let sink = Arc::new(RecordingSink::new());
        let ind = Indicator::new(sink.clone(), Duration::from_millis(5));
        ind.start("busy");
        tokio::time::sleep(Duration::from_millis(30)).await;
        ind.stop("done");
        assert_eq!(paints(&sink).last(), Some(&Paint::Final("done".into())));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(paints(&sink).is_empty());
    }

    #[tokio::test]
    async fn context_rides_along_with_frames() {
        let sink = Arc::new(RecordingSink::new());
        let ind = Indicator::new(sink.clone(), Duration::from_millis(5));
        ind.start("Please wait");
        ind.set_context(Some("Projects...".into()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        ind.stop("");
        let ctx = paints(&sink).into_iter().find_map(|p| match p {
            Paint::Frame { context, .. } => context,
            _ => None,
        });
        assert_eq!(ctx.as_deref(), Some("Projects..."));
        ind.set_context(Some("ignored".into()));
        assert_eq!(ind.state(), IndicatorState::Idle);
    }
}
