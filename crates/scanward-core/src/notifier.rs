//! Rate-limited progress indicator.
//!
//! Gating happens synchronously under the notifier lock; rendering and the
//! actual publish run on a separate task so engine callbacks and command
//! dispatch never wait on the status sink.

use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, Instrument};
use url::Url;

use crate::engine::MediaEngine;
use crate::CoreError;

/// Identifier of the single indicator slot.
pub const INDICATOR_ID: u32 = 43;

/// Default minimum interval between two published updates.
pub const DEFAULT_NOTIFICATION_DELAY: Duration = Duration::from_millis(1000);

const TITLE: &str = "Scanning media library";
const PARSING_TEXT: &str = "Parsing media";
const DISCOVERING_TEXT: &str = "Discovering";

/// Publication gate for the progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyState {
    /// Nothing published since the last reset; the next request goes out
    PendingFirst,
    /// Last update was published (or armed) at this instant
    Active(Instant),
    /// Session is shutting down; nothing is ever published again
    Suppressed,
}

impl NotifyState {
    /// Records `now` and returns `true` when an update may be published.
    pub fn try_stamp(&mut self, now: Instant, delay: Duration) -> bool {
        match *self {
            NotifyState::Suppressed => false,
            NotifyState::Active(last) if now.saturating_duration_since(last) < delay => false,
            _ => {
                *self = NotifyState::Active(now);
                true
            }
        }
    }

    /// Starts the throttle window without publishing.
    pub fn arm(&mut self, now: Instant) {
        if *self == NotifyState::PendingFirst {
            *self = NotifyState::Active(now);
        }
    }

    /// Lets the next request through immediately.
    pub fn reset(&mut self) {
        if *self != NotifyState::Suppressed {
            *self = NotifyState::PendingFirst;
        }
    }

    pub fn is_suppressed(&self) -> bool {
        *self == NotifyState::Suppressed
    }
}

/// Progress values rendered into the indicator body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub parsing_percent: u8,
    pub discovery: Option<String>,
}

impl StatusSnapshot {
    /// Parsing progress wins over the discovery path.
    pub fn body(&self) -> String {
        if self.parsing_percent > 0 {
            format!("{PARSING_TEXT} {}%", self.parsing_percent)
        } else if let Some(path) = &self.discovery {
            format!("{DISCOVERING_TEXT} {}", display_path(path))
        } else {
            TITLE.to_string()
        }
    }
}

/// Turns an engine entry point (`file://` MRL or plain path, possibly
/// percent-encoded) into a readable path.
pub fn display_path(entry_point: &str) -> String {
    let raw = entry_point.strip_prefix("file://").unwrap_or(entry_point);
    if !raw.starts_with('/') {
        return percent_decode_str(raw).decode_utf8_lossy().into_owned();
    }

    let escaped = raw.replace('#', "%23").replace('?', "%3F");
    Url::parse(&format!("file://{escaped}"))
        .ok()
        .and_then(|url| url.to_file_path().ok())
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Toggle offered on the indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    Pause,
    Resume,
}

impl ToggleKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToggleKind::Pause => "Pause",
            ToggleKind::Resume => "Resume",
        }
    }
}

/// The indicator's single action. `generation` only changes when the action
/// is rebuilt, so hosts can keep the same button across updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorAction {
    pub kind: ToggleKind,
    pub generation: u64,
}

/// A persistent, non-dismissable progress indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressIndicator {
    pub id: u32,
    pub title: String,
    pub body: String,
    pub ongoing: bool,
    pub action: Option<IndicatorAction>,
}

/// Destination of rendered indicators.
pub trait StatusSink: Send + Sync {
    /// Replace whatever occupies `indicator.id`.
    fn publish(&self, indicator: &ProgressIndicator) -> Result<(), CoreError>;

    fn withdraw(&self, id: u32);
}

/// Builds indicators, re-creating the toggle only when the working flag flips.
#[derive(Debug, Default)]
pub struct IndicatorRenderer {
    was_working: Option<bool>,
    action: Option<IndicatorAction>,
    generation: u64,
}

impl IndicatorRenderer {
    pub fn render(&mut self, snapshot: &StatusSnapshot, is_working: bool) -> ProgressIndicator {
        if self.was_working != Some(is_working) {
            self.was_working = Some(is_working);
            self.generation += 1;
            self.action = Some(IndicatorAction {
                kind: if is_working {
                    ToggleKind::Pause
                } else {
                    ToggleKind::Resume
                },
                generation: self.generation,
            });
        }

        ProgressIndicator {
            id: INDICATOR_ID,
            title: TITLE.to_string(),
            body: snapshot.body(),
            ongoing: true,
            action: self.action,
        }
    }
}

/// Throttled front end of the indicator publisher.
pub struct Notifier {
    gate: Arc<Mutex<NotifyState>>,
    delay: Duration,
    updates: mpsc::UnboundedSender<StatusSnapshot>,
    sink: Arc<dyn StatusSink>,
}

impl Notifier {
    /// Create the notifier and spawn its publisher task on the current runtime.
    pub fn spawn(sink: Arc<dyn StatusSink>, engine: Arc<dyn MediaEngine>, delay: Duration) -> Self {
        let gate = Arc::new(Mutex::new(NotifyState::PendingFirst));
        let (updates, rx) = mpsc::unbounded_channel();

        tokio::spawn(
            publish_loop(rx, gate.clone(), sink.clone(), engine)
                .instrument(tracing::Span::current()),
        );

        Self {
            gate,
            delay,
            updates,
            sink,
        }
    }

    pub fn state(&self) -> NotifyState {
        *self.gate.lock()
    }

    /// Queue an update unless throttled or suppressed.
    ///
    /// `snapshot` is only evaluated when the update actually goes out.
    pub fn request<F>(&self, snapshot: F) -> bool
    where
        F: FnOnce() -> StatusSnapshot,
    {
        let mut gate = self.gate.lock();
        if !gate.try_stamp(Instant::now(), self.delay) {
            return false;
        }
        self.updates.send(snapshot()).is_ok()
    }

    pub fn arm(&self) {
        self.gate.lock().arm(Instant::now());
    }

    pub fn reset(&self) {
        self.gate.lock().reset();
    }

    /// Mute the notifier for good and remove the indicator.
    /// Returns `false` if it was already withdrawn.
    pub fn withdraw(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.is_suppressed() {
            return false;
        }
        *gate = NotifyState::Suppressed;
        self.sink.withdraw(INDICATOR_ID);
        true
    }
}

async fn publish_loop(
    mut rx: mpsc::UnboundedReceiver<StatusSnapshot>,
    gate: Arc<Mutex<NotifyState>>,
    sink: Arc<dyn StatusSink>,
    engine: Arc<dyn MediaEngine>,
) {
    let mut renderer = IndicatorRenderer::default();

    while let Some(snapshot) = rx.recv().await {
        let indicator = renderer.render(&snapshot, engine.is_working());

        let state = gate.lock();
        if state.is_suppressed() {
            debug!("Indicator withdrawn, dropping update");
            continue;
        }
        match sink.publish(&indicator) {
            Ok(()) => debug!(body = %indicator.body, "Indicator published"),
            Err(e) => debug!(error = %e, "Indicator publish failed"),
        }
    }
}
