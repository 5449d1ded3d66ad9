//! The poll scheduler.
//!
//! A single tokio task owns the timer and the in-flight poll. It waits on
//! four things at once: control messages from the [`SchedulerHandle`], the
//! completion of the current poll, configuration events, and the next tick.
//! Because all of them are handled on that one task, publication and config
//! reads never race, and at most one poll is ever running.
//!
//! ```text
//!            start()                      stop() / handle dropped
//!   Idle ───────────────▶ Polling ─────────────────────────────▶ Stopped
//!                          │  ▲
//!        tick, refresh,    │  │ poll finished
//!        watch-list change ▼  │ (snapshot published)
//!                       [poll in flight]
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dockwatch_types::StatusSnapshot;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigEvent, ConfigManager};
use crate::invoker::{CommandInvoker, CommandSpec, ProcessInvoker, DEFAULT_DOCKER};
use crate::output::SnapshotSink;
use crate::parser::parse;
use crate::reconcile::{error_snapshot, reconcile};

/// Time budget for one status command.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a [`PollScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Built but not started.
    Idle,
    /// Running: polls on every tick.
    Polling,
    /// Stopped for good. No further snapshots are published.
    Stopped,
}

#[derive(Debug)]
enum Control {
    Refresh,
    Stop,
}

/// Run one poll cycle: invoke, parse, reconcile.
///
/// An invocation failure becomes an error snapshot; this never fails.
pub async fn poll_once(
    invoker: &dyn ProcessInvoker,
    command: &CommandSpec,
    timeout: Duration,
    watch_list: &[String],
) -> StatusSnapshot {
    match invoker.invoke(command, timeout).await {
        Ok(output) => {
            let parsed = parse(&output.stdout);
            let snapshot = reconcile(watch_list, &parsed);
            debug!(
                "Poll listed {} containers, {} of {} watched not running",
                parsed.len(),
                snapshot.unhealthy().count(),
                watch_list.len()
            );
            snapshot
        }
        Err(e) => {
            warn!("Poll failed: {}", e);
            error_snapshot(&e)
        }
    }
}

/// Drives periodic polls and publishes a snapshot for each.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use dockwatch::{ConfigManager, PollScheduler, SnapshotSink};
///
/// #[tokio::main]
/// async fn main() {
///     let config = Arc::new(ConfigManager::in_memory());
///     config.import_names(["traefik", "grafana"]).unwrap();
///
///     let (sink, mut rx) = SnapshotSink::channel(16);
///     let handle = PollScheduler::builder(config, sink).build().start();
///
///     if let Some(snapshot) = rx.recv().await {
///         println!("healthy: {}", snapshot.aggregate_healthy());
///     }
///     handle.stop().await;
/// }
/// ```
#[derive(Debug)]
pub struct PollScheduler {
    config: Arc<ConfigManager>,
    invoker: Arc<dyn ProcessInvoker>,
    sink: SnapshotSink,
    command: CommandSpec,
    timeout: Duration,
    state: watch::Sender<SchedulerState>,
}

impl PollScheduler {
    /// Create a builder. Polls read `config` and publish to `sink`.
    pub fn builder(config: Arc<ConfigManager>, sink: SnapshotSink) -> PollSchedulerBuilder {
        PollSchedulerBuilder::new(config, sink)
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Start polling on the current tokio runtime.
    ///
    /// The first poll starts immediately; later ones follow the configured
    /// interval.
    pub fn start(self) -> SchedulerHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let state = self.state.subscribe();

        self.state.send_replace(SchedulerState::Polling);
        let task = tokio::spawn(self.run(control_rx, stopped.clone()));

        SchedulerHandle {
            control: control_tx,
            stopped,
            state,
            task: Some(task),
        }
    }

    async fn run(self, mut control: mpsc::UnboundedReceiver<Control>, stopped: Arc<AtomicBool>) {
        let mut events = self.config.subscribe();
        let mut period = self.config.get_config().interval();
        let mut next_tick = Instant::now() + period;
        let mut in_flight: Option<JoinHandle<StatusSnapshot>> = None;
        let mut refresh_pending = false;

        info!("Polling container status every {:?}", period);
        self.begin_poll(&mut in_flight);

        loop {
            tokio::select! {
                biased;

                message = control.recv() => match message {
                    Some(Control::Refresh) => {
                        self.request_poll(&mut in_flight, &mut refresh_pending);
                    }
                    Some(Control::Stop) | None => break,
                },

                finished = wait_for(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    match finished {
                        Ok(snapshot) if !stopped.load(Ordering::SeqCst) => {
                            self.sink.publish(snapshot).await;
                        }
                        Ok(_) => debug!("Discarding snapshot finished after stop"),
                        Err(e) => error!("Poll task failed: {}", e),
                    }
                    if refresh_pending {
                        refresh_pending = false;
                        self.begin_poll(&mut in_flight);
                    }
                }

                event = events.recv() => match event {
                    Ok(ConfigEvent::IntervalChanged(seconds)) => {
                        period = Duration::from_secs(u64::from(seconds));
                        next_tick = Instant::now() + period;
                        info!("Rescheduled polling every {:?}", period);
                    }
                    Ok(ConfigEvent::WatchListChanged) => {
                        self.request_poll(&mut in_flight, &mut refresh_pending);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Missed {} config events, re-reading config", missed);
                        let interval = self.config.get_config().interval();
                        if interval != period {
                            period = interval;
                            next_tick = Instant::now() + period;
                        }
                        self.request_poll(&mut in_flight, &mut refresh_pending);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Config manager went away, stopping");
                        break;
                    }
                },

                _ = sleep_until(next_tick) => {
                    next_tick = Instant::now() + period;
                    if in_flight.is_some() {
                        debug!("Previous poll still running, skipping tick");
                    } else {
                        self.begin_poll(&mut in_flight);
                    }
                }
            }
        }

        if let Some(task) = in_flight.take() {
            debug!("Cancelling in-flight poll");
            task.abort();
        }
        self.state.send_replace(SchedulerState::Stopped);
        info!("Polling stopped");
    }

    /// Poll now, or right after the current poll if one is running.
    fn request_poll(
        &self,
        in_flight: &mut Option<JoinHandle<StatusSnapshot>>,
        refresh_pending: &mut bool,
    ) {
        if in_flight.is_some() {
            debug!("Poll in flight, refreshing once it completes");
            *refresh_pending = true;
        } else {
            self.begin_poll(in_flight);
        }
    }

    /// Start a poll against the config as it is right now.
    fn begin_poll(&self, in_flight: &mut Option<JoinHandle<StatusSnapshot>>) {
        let config = self.config.get_config();
        let invoker = Arc::clone(&self.invoker);
        let command = self.command.clone();
        let timeout = self.timeout;

        debug!("Polling {} watched containers", config.watch_list().len());
        *in_flight = Some(tokio::spawn(async move {
            poll_once(invoker.as_ref(), &command, timeout, config.watch_list()).await
        }));
    }
}

async fn wait_for(
    in_flight: &mut Option<JoinHandle<StatusSnapshot>>,
) -> Result<StatusSnapshot, JoinError> {
    match in_flight {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

/// Builder for configuring a [`PollScheduler`].
#[derive(Debug)]
pub struct PollSchedulerBuilder {
    config: Arc<ConfigManager>,
    sink: SnapshotSink,
    invoker: Option<Arc<dyn ProcessInvoker>>,
    command: Option<CommandSpec>,
    timeout: Option<Duration>,
}

impl PollSchedulerBuilder {
    pub fn new(config: Arc<ConfigManager>, sink: SnapshotSink) -> Self {
        Self {
            config,
            sink,
            invoker: None,
            command: None,
            timeout: None,
        }
    }

    /// Use a custom invoker. Defaults to [`CommandInvoker`].
    pub fn invoker(mut self, invoker: Arc<dyn ProcessInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Set the status command. Defaults to the docker status listing.
    pub fn command(mut self, command: CommandSpec) -> Self {
        self.command = Some(command);
        self
    }

    /// Set the per-poll time budget.
    ///
    /// Defaults to [`DEFAULT_POLL_TIMEOUT`] if not specified.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> PollScheduler {
        let (state, _) = watch::channel(SchedulerState::Idle);
        PollScheduler {
            config: self.config,
            invoker: self
                .invoker
                .unwrap_or_else(|| Arc::new(CommandInvoker::new())),
            sink: self.sink,
            command: self
                .command
                .unwrap_or_else(|| CommandSpec::docker_status(DEFAULT_DOCKER)),
            timeout: self.timeout.unwrap_or(DEFAULT_POLL_TIMEOUT),
            state,
        }
    }
}

/// Handle for controlling a running scheduler.
///
/// Drop this handle to stop polling, or call `stop()` to also wait for the
/// scheduler task to finish.
#[derive(Debug)]
pub struct SchedulerHandle {
    control: mpsc::UnboundedSender<Control>,
    stopped: Arc<AtomicBool>,
    state: watch::Receiver<SchedulerState>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Poll as soon as possible. Coalesced with a poll already running.
    pub fn refresh(&self) {
        let _ = self.control.send(Control::Refresh);
    }

    /// Stop polling and wait for the scheduler to wind down.
    ///
    /// An in-flight poll is cancelled, killing its process; nothing is
    /// published after this is called.
    pub async fn stop(mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Scheduler task failed: {}", e);
            }
        }
    }

    fn signal_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.control.send(Control::Stop);
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
