//! Scan session: the single task that owns coordinator state.
//!
//! Commands, engine callbacks and bootstrap results are all funnelled into
//! one ordered channel and applied by [`ScanSession::run`]. Nothing else
//! mutates the state, so the reload counter, lock flag and progress values
//! need no locking of their own.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::bootstrap::{Bootstrap, BootstrapOutcome, DevicePrompter, FollowUp};
use crate::command::ScanCommand;
use crate::config::{DaemonConfig, StorageConfig};
use crate::engine::{banned_path, non_empty, CallbackId, EngineCallbacks, EngineEvent, MediaEngine};
use crate::lifecycle::{LifecycleBus, LifecycleSignal};
use crate::notifier::{Notifier, NotifyState, StatusSink, StatusSnapshot, DEFAULT_NOTIFICATION_DELAY};
use crate::power::{PowerGuard, ResourceLock};
use crate::queue::TaskQueue;
use crate::reload::ReloadGuard;
use crate::CoreError;

const DEFAULT_QUEUE_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const QUEUE_NAME: &str = "scan-queue";

/// Collaborators shared by every session of a coordinator.
///
/// Clones share one [`TaskQueue`], so engine operations left queued by an
/// ended session still run before anything the next session submits.
#[derive(Clone)]
pub struct SessionDeps {
    pub engine: Arc<dyn MediaEngine>,
    pub resource_lock: Arc<dyn ResourceLock>,
    pub status_sink: Arc<dyn StatusSink>,
    pub prompter: Arc<dyn DevicePrompter>,
    pub lifecycle: LifecycleBus,
    pub storage: StorageConfig,
    pub notification_delay: Duration,
    pub queue: TaskQueue,
}

impl SessionDeps {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        resource_lock: Arc<dyn ResourceLock>,
        status_sink: Arc<dyn StatusSink>,
        prompter: Arc<dyn DevicePrompter>,
    ) -> Self {
        Self {
            engine,
            resource_lock,
            status_sink,
            prompter,
            lifecycle: LifecycleBus::default(),
            storage: StorageConfig::default(),
            notification_delay: DEFAULT_NOTIFICATION_DELAY,
            queue: TaskQueue::new(QUEUE_NAME, DEFAULT_QUEUE_IDLE_TIMEOUT),
        }
    }

    /// Take storage layout and timings from the daemon configuration.
    pub fn with_config(mut self, config: &DaemonConfig) -> Self {
        self.storage = config.storage.clone();
        self.notification_delay = config.notification_delay();
        self.with_queue_idle_timeout(config.queue_idle_timeout())
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleBus) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_notification_delay(mut self, delay: Duration) -> Self {
        self.notification_delay = delay;
        self
    }

    /// Replaces the queue; call before the deps are shared.
    pub fn with_queue_idle_timeout(mut self, timeout: Duration) -> Self {
        self.queue = TaskQueue::new(QUEUE_NAME, timeout);
        self
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    DiscoveryFinished,
    ParsingFinished,
    ReloadFinished,
    /// Requested by the host
    Stopped,
    /// The session task went away without a regular shutdown
    Dropped,
}

/// Point-in-time view of a session, for status reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub parsing_percent: u8,
    pub current_discovery: Option<String>,
    pub reload_count: u32,
    pub lock_held: bool,
    pub notify_state: NotifyState,
    pub pending_operations: usize,
    pub bootstrapping: bool,
    pub ended: bool,
}

enum Input {
    Command(ScanCommand),
    Unrecognized(String),
    Engine(EngineEvent),
    Bootstrapped(Option<BootstrapOutcome>),
    Stop,
    Inspect(oneshot::Sender<SessionSnapshot>),
}

/// Engine callback adapter: turns each callback into a queued [`EngineEvent`].
struct EventForwarder {
    tx: mpsc::UnboundedSender<Input>,
}

impl EventForwarder {
    fn forward(&self, event: EngineEvent) {
        if self.tx.send(Input::Engine(event)).is_err() {
            trace!("Engine event after session end, ignored");
        }
    }
}

impl EngineCallbacks for EventForwarder {
    fn on_discovery_started(&self, entry_point: &str) {
        self.forward(EngineEvent::DiscoveryStarted(entry_point.to_string()));
    }

    fn on_discovery_progress(&self, entry_point: &str) {
        self.forward(EngineEvent::DiscoveryProgress(entry_point.to_string()));
    }

    fn on_discovery_completed(&self, entry_point: &str) {
        self.forward(EngineEvent::DiscoveryCompleted(entry_point.to_string()));
    }

    fn on_parsing_stats_updated(&self, percent: u8) {
        self.forward(EngineEvent::ParsingStatsUpdated(percent));
    }

    fn on_reload_started(&self, entry_point: Option<&str>) {
        self.forward(EngineEvent::ReloadStarted(entry_point.map(String::from)));
    }

    fn on_reload_completed(&self, entry_point: Option<&str>) {
        self.forward(EngineEvent::ReloadCompleted(entry_point.map(String::from)));
    }
}

/// Mutable coordinator state, owned by the session task.
struct CoordinatorState {
    parsing_percent: u8,
    current_discovery: Option<String>,
    reload: ReloadGuard,
    power: PowerGuard,
    bootstrapping: bool,
}

impl CoordinatorState {
    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            parsing_percent: self.parsing_percent,
            discovery: self.current_discovery.clone(),
        }
    }
}

/// Cloneable handle used to feed a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Input>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the session still accepts input
    pub fn is_active(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn dispatch(&self, command: ScanCommand) -> Result<(), CoreError> {
        self.send(Input::Command(command))
    }

    /// Report a command the transport could not decode.
    pub fn dispatch_unrecognized(&self, action: impl Into<String>) -> Result<(), CoreError> {
        self.send(Input::Unrecognized(action.into()))
    }

    /// Ask the session to shut down and release its resources.
    pub fn stop(&self) -> Result<(), CoreError> {
        self.send(Input::Stop)
    }

    pub async fn inspect(&self) -> Result<SessionSnapshot, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(Input::Inspect(reply))?;
        rx.await.map_err(|_| CoreError::SessionEnded)
    }

    /// Resolves once the session stopped accepting input.
    pub async fn ended(&self) {
        self.tx.closed().await
    }

    fn send(&self, input: Input) -> Result<(), CoreError> {
        self.tx.send(input).map_err(|_| CoreError::SessionEnded)
    }
}

/// A single coordinator session, from lock acquisition to shutdown.
pub struct ScanSession {
    id: Uuid,
    state: CoordinatorState,
    engine: Arc<dyn MediaEngine>,
    prompter: Arc<dyn DevicePrompter>,
    lifecycle: LifecycleBus,
    storage: StorageConfig,
    queue: TaskQueue,
    notifier: Notifier,
    callback_id: CallbackId,
    tx: mpsc::UnboundedSender<Input>,
    rx: mpsc::UnboundedReceiver<Input>,
    replay: Option<mpsc::UnboundedSender<ScanCommand>>,
    ended: bool,
}

impl ScanSession {
    /// Acquire the resource lock, register engine callbacks and spawn the
    /// session task on the current runtime.
    pub fn start(deps: SessionDeps) -> SessionHandle {
        Self::start_with_replay(deps, None)
    }

    /// Like [`ScanSession::start`]; commands still queued when the session
    /// ends are sent to `replay` instead of being dropped.
    pub fn start_with_replay(
        deps: SessionDeps,
        replay: Option<mpsc::UnboundedSender<ScanCommand>>,
    ) -> SessionHandle {
        let id = Uuid::new_v4();
        let span = info_span!("session", id = %id);

        let session = span.in_scope(|| {
            let (tx, rx) = mpsc::unbounded_channel();

            let mut power = PowerGuard::new(deps.resource_lock.clone());
            power.acquire();

            let callback_id = deps
                .engine
                .add_callbacks(Arc::new(EventForwarder { tx: tx.clone() }));
            let notifier = Notifier::spawn(
                deps.status_sink.clone(),
                deps.engine.clone(),
                deps.notification_delay,
            );

            info!("Scan session started");

            ScanSession {
                id,
                state: CoordinatorState {
                    parsing_percent: 0,
                    current_discovery: None,
                    reload: ReloadGuard::new(),
                    power,
                    bootstrapping: false,
                },
                engine: deps.engine,
                prompter: deps.prompter,
                lifecycle: deps.lifecycle,
                storage: deps.storage,
                queue: deps.queue,
                notifier,
                callback_id,
                tx,
                rx,
                replay,
                ended: false,
            }
        });

        let handle = SessionHandle {
            id,
            tx: session.tx.clone(),
        };
        tokio::spawn(session.run().instrument(span));
        handle
    }

    async fn run(mut self) {
        while let Some(input) = self.rx.recv().await {
            match input {
                Input::Command(command) => self.handle_command(command),
                Input::Unrecognized(action) => {
                    debug!(%action, "Unrecognized command");
                    self.notifier.arm();
                    self.lifecycle.emit(LifecycleSignal::SessionStarted);
                }
                Input::Engine(event) => self.handle_event(event),
                Input::Bootstrapped(outcome) => self.on_bootstrapped(outcome),
                Input::Stop => self.shutdown(ShutdownReason::Stopped),
                Input::Inspect(reply) => {
                    let _ = reply.send(self.snapshot());
                }
            }

            if self.ended {
                break;
            }
        }

        self.drain();
    }

    /// Close the channel and hand back commands that raced with shutdown.
    fn drain(&mut self) {
        self.rx.close();
        while let Ok(input) = self.rx.try_recv() {
            match input {
                Input::Command(command) => match &self.replay {
                    Some(replay) => {
                        debug!(%command, "Replaying command into the next session");
                        let _ = replay.send(command);
                    }
                    None => debug!(%command, "Command dropped, session ended"),
                },
                Input::Inspect(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                _ => {}
            }
        }
    }

    fn handle_command(&mut self, command: ScanCommand) {
        debug!(%command, "Command received");
        self.notifier.arm();

        match command {
            ScanCommand::Init { upgrade } => self.init(upgrade),
            ScanCommand::Reload { path } => match non_empty(path.as_deref()) {
                None => self.global_reload(),
                Some(path) => {
                    let engine = self.engine.clone();
                    let path = path.to_string();
                    self.submit("reload-path", move || engine.reload_path(&path));
                }
            },
            ScanCommand::Discover { path } => match non_empty(path.as_deref()) {
                None => debug!("Discover without a path ignored"),
                Some(path) => {
                    let engine = self.engine.clone();
                    let path = path.to_string();
                    self.submit("discover", move || engine.discover(&path));
                }
            },
            ScanCommand::DiscoverDevice { path } if path.is_empty() => {
                debug!("Device discovery without a path ignored");
            }
            ScanCommand::DiscoverDevice { path } => {
                let engine = self.engine.clone();
                self.submit("discover-device", move || {
                    for folder in engine.blacklist() {
                        engine.ban_folder(&banned_path(&path, &folder));
                    }
                    engine.discover(&path);
                });
            }
            ScanCommand::Pause => {
                self.state.power.release();
                self.engine.pause_background_operations();
                self.refresh_now();
            }
            ScanCommand::Resume => {
                self.state.power.acquire();
                self.engine.resume_background_operations();
                self.refresh_now();
            }
        }

        self.lifecycle.emit(LifecycleSignal::SessionStarted);
    }

    fn init(&mut self, upgrade: bool) {
        if self.engine.is_initiated() {
            self.engine.resume_background_operations();
            return;
        }
        if self.state.bootstrapping {
            debug!("Bootstrap already queued");
            return;
        }

        let bootstrap = Bootstrap {
            engine: self.engine.clone(),
            storage: self.storage.clone(),
            prompter: self.prompter.clone(),
            lifecycle: self.lifecycle.clone(),
            queue: self.queue.clone(),
            upgrade,
        };
        let tx = self.tx.clone();
        self.state.bootstrapping = self.submit("bootstrap", move || {
            let outcome = bootstrap.run();
            let _ = tx.send(Input::Bootstrapped(outcome));
        });
    }

    fn on_bootstrapped(&mut self, outcome: Option<BootstrapOutcome>) {
        self.state.bootstrapping = false;
        if let Some(outcome) = outcome {
            if outcome.follow_up == FollowUp::GlobalReload {
                self.global_reload();
            }
        }
    }

    fn global_reload(&mut self) {
        if self.state.reload.is_reloading() {
            debug!(in_flight = self.state.reload.count(), "Global reload already running");
            return;
        }
        let engine = self.engine.clone();
        self.submit("reload", move || engine.reload());
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::DiscoveryStarted(path) => debug!(%path, "Discovery started"),
            EngineEvent::DiscoveryProgress(path) => {
                trace!(%path, "Discovery progress");
                self.state.current_discovery = Some(path);
                self.request_notify();
            }
            EngineEvent::DiscoveryCompleted(path) => {
                debug!(%path, "Discovery completed");
                if !self.engine.is_working() {
                    self.shutdown(ShutdownReason::DiscoveryFinished);
                }
            }
            EngineEvent::ParsingStatsUpdated(percent) => {
                let percent = percent.min(100);
                trace!(percent, "Parsing progress");
                self.state.parsing_percent = percent;
                if percent > 0 {
                    self.state.current_discovery = None;
                }
                if percent == 100 {
                    self.shutdown(ShutdownReason::ParsingFinished);
                } else {
                    self.request_notify();
                }
            }
            EngineEvent::ReloadStarted(path) => {
                debug!(path = path.as_deref().unwrap_or(""), "Reload started");
                self.state.reload.on_started(path.as_deref());
            }
            EngineEvent::ReloadCompleted(path) => {
                debug!(path = path.as_deref().unwrap_or(""), "Reload completed");
                if self.state.reload.on_completed(path.as_deref()) && !self.engine.is_working() {
                    self.shutdown(ShutdownReason::ReloadFinished);
                }
            }
        }
    }

    fn request_notify(&self) {
        let state = &self.state;
        self.notifier.request(|| state.status());
    }

    fn refresh_now(&self) {
        self.notifier.reset();
        self.request_notify();
    }

    fn submit<F>(&self, label: &'static str, op: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.queue.submit(label, op) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, job = label, "Failed to queue operation");
                false
            }
        }
    }

    fn shutdown(&mut self, reason: ShutdownReason) {
        if self.ended {
            return;
        }
        self.ended = true;

        self.lifecycle.emit(LifecycleSignal::SessionEnded);
        self.notifier.withdraw();
        self.engine.remove_callbacks(self.callback_id);
        self.state.power.release();

        info!(?reason, pending = self.queue.pending(), "Scan session ended");
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            parsing_percent: self.state.parsing_percent,
            current_discovery: self.state.current_discovery.clone(),
            reload_count: self.state.reload.count(),
            lock_held: self.state.power.is_held(),
            notify_state: self.notifier.state(),
            pending_operations: self.queue.pending(),
            bootstrapping: self.state.bootstrapping,
            ended: self.ended,
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.shutdown(ShutdownReason::Dropped);
    }
}
