//! Async owner of one session.
//!
//! A single task owns the [`SessionMachine`]. Orientation edges, the
//! completion poll, remote-creation results and user commands all arrive as
//! messages to that task, so transitions are applied one at a time.
//!
//! Teardown order is fixed: the sensor subscription is released first, then
//! the poll timer, then the session itself. It runs when the session reaches
//! a terminal state, on [`SessionController::shutdown`], and when the
//! controller is dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::machine::{
    PersistenceRequest, SessionInput, SessionMachine, SessionSnapshot, SessionState,
};
use crate::error::{SessionError, ValidationError};
use crate::events::Event;
use crate::orientation::{
    play_completion, EdgeKind, HapticFeedback, HapticPattern, OrientationMonitor,
    OrientationSource, Thresholds,
};
use crate::persistence::{PersistenceGateway, RemoteSessionId};

const EVENT_CAPACITY: usize = 64;

/// Tunables for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub target_secs: u64,
    /// Completion poll period.
    pub tick_interval: Duration,
    pub sampling_interval: Duration,
    pub thresholds: Thresholds,
    /// How long teardown waits for in-flight remote calls.
    pub flush_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            target_secs: 1200,
            tick_interval: Duration::from_millis(100),
            sampling_interval: Duration::from_millis(100),
            thresholds: Thresholds::default(),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
enum Command {
    Edge(EdgeKind),
    Input(SessionInput),
    Query(oneshot::Sender<SessionSnapshot>),
}

/// Handle to a running session.
pub struct SessionController {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<Event>,
    task: Option<JoinHandle<SessionSnapshot>>,
    release: CancellationToken,
    _release_on_drop: DropGuard,
}

impl SessionController {
    /// Start a session in `Waiting` and subscribe to `source`.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroTarget`] if `options.target_secs` is zero.
    pub fn spawn(
        options: SessionOptions,
        source: Arc<dyn OrientationSource>,
        haptics: Option<Arc<dyn HapticFeedback>>,
        gateway: PersistenceGateway,
    ) -> Result<Self, ValidationError> {
        let machine = SessionMachine::new(options.target_secs)?;
        let (commands, inbox) = mpsc::unbounded_channel();

        let edges = commands.clone();
        let monitor = OrientationMonitor::start(
            source,
            options.sampling_interval,
            options.thresholds,
            haptics.clone(),
            move |edge| {
                // Fails only after the session has been released.
                let _ = edges.send(Command::Edge(edge.kind()));
            },
        );
        let sensor_available = monitor.is_available();

        let (snapshot_tx, snapshots) =
            watch::channel(machine.snapshot(Instant::now(), sensor_available));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut ticker = tokio::time::interval(options.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let release = CancellationToken::new();
        let actor = SessionActor {
            machine,
            monitor: Some(monitor),
            sensor_available,
            ticker,
            gateway,
            haptics,
            snapshots: snapshot_tx,
            events: events.clone(),
            pending_create: None,
            finalizers: JoinSet::new(),
            flush_timeout: options.flush_timeout,
        };
        let task = tokio::spawn(actor.run(inbox, release.clone()));

        info!(
            target_secs = options.target_secs,
            sensor_available, "session waiting"
        );

        Ok(Self {
            commands,
            snapshots,
            events,
            task: Some(task),
            _release_on_drop: release.clone().drop_guard(),
            release,
        })
    }

    pub fn manual_start(&self) -> Result<(), SessionError> {
        self.send(SessionInput::ManualStart)
    }

    pub fn manual_pause(&self) -> Result<(), SessionError> {
        self.send(SessionInput::ManualPause)
    }

    pub fn manual_resume(&self) -> Result<(), SessionError> {
        self.send(SessionInput::ManualResume)
    }

    pub fn cancel(&self) -> Result<(), SessionError> {
        self.send(SessionInput::Cancel)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Snapshot taken after every command sent so far has been applied.
    pub async fn settled_snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Query(reply))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Events emitted after this call.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Wait for the session to end and its remote calls to flush.
    ///
    /// Cancel-safe; can be polled again after being dropped mid-wait.
    pub async fn finished(&mut self) -> Result<SessionSnapshot, SessionError> {
        let task = self.task.as_mut().ok_or(SessionError::Closed)?;
        let result = task.await;
        self.task = None;
        result.map_err(|e| {
            warn!("session task failed: {e}");
            SessionError::Closed
        })
    }

    /// Release the session now, whatever its state, and return the final snapshot.
    ///
    /// A session released before a terminal state makes no finalizing remote call.
    pub async fn shutdown(mut self) -> Result<SessionSnapshot, SessionError> {
        self.release.cancel();
        self.finished().await
    }

    fn send(&self, input: SessionInput) -> Result<(), SessionError> {
        self.commands
            .send(Command::Input(input))
            .map_err(|_| SessionError::Closed)
    }
}

struct SessionActor {
    machine: SessionMachine,
    monitor: Option<OrientationMonitor>,
    sensor_available: bool,
    ticker: Interval,
    gateway: PersistenceGateway,
    haptics: Option<Arc<dyn HapticFeedback>>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<Event>,
    pending_create: Option<JoinHandle<Option<RemoteSessionId>>>,
    /// Remote calls in flight. A deferred finalizer yields the id it resolved.
    finalizers: JoinSet<Option<RemoteSessionId>>,
    flush_timeout: Duration,
}

impl SessionActor {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<Command>,
        release: CancellationToken,
    ) -> SessionSnapshot {
        while !self.machine.state().is_terminal() {
            let active = self.machine.state() == SessionState::Active;
            tokio::select! {
                _ = release.cancelled() => {
                    debug!(state = ?self.machine.state(), "session released before finishing");
                    break;
                }
                Some(command) = inbox.recv() => self.handle(command),
                _ = self.ticker.tick(), if active => self.apply(SessionInput::Tick),
                id = join_create(&mut self.pending_create), if self.pending_create.is_some() => {
                    self.pending_create = None;
                    if let Some(id) = id {
                        self.link(id);
                    }
                }
            }
        }
        // Later commands fail with `SessionError::Closed`.
        drop(inbox);
        self.teardown().await
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Edge(edge) => {
                self.emit(Event::OrientationChanged {
                    edge,
                    at: Utc::now(),
                });
                self.apply(SessionInput::Edge(edge));
            }
            Command::Input(input) => self.apply(input),
            Command::Query(reply) => {
                let _ = reply.send(self.machine.snapshot(Instant::now(), self.sensor_available));
            }
        }
    }

    fn apply(&mut self, input: SessionInput) {
        let now = Instant::now();
        let Some(transition) = self.machine.apply(input, now) else {
            if input == SessionInput::Tick {
                self.publish(now);
            } else {
                debug!(?input, state = ?self.machine.state(), "input ignored");
            }
            return;
        };

        info!(
            from = ?transition.from,
            to = ?transition.to,
            elapsed_secs = self.machine.elapsed_secs_at(now),
            interruptions = self.machine.interruption_count(),
            "session transition"
        );

        if transition.to == SessionState::Active {
            self.ticker.reset();
        }
        // Sensor starts already pulsed on the edge itself.
        if input == SessionInput::ManualStart {
            if let Some(haptics) = &self.haptics {
                haptics.pulse(HapticPattern::Success);
            }
        }
        if let Some(request) = transition.persistence {
            self.persist(request);
        }
        if transition.to == SessionState::Completed {
            if let Some(haptics) = &self.haptics {
                play_completion(Arc::clone(haptics));
            }
        }
        self.emit(transition.event);
        self.publish(now);
    }

    fn link(&mut self, id: RemoteSessionId) {
        if self.machine.link_remote(id.clone()) {
            self.emit(Event::RemoteSessionLinked {
                remote_id: id,
                at: Utc::now(),
            });
            self.publish(Instant::now());
        }
    }

    fn persist(&mut self, request: PersistenceRequest) {
        if !self.gateway.is_configured() {
            return;
        }
        let gateway = self.gateway.clone();

        if let PersistenceRequest::Create { target_secs } = request {
            self.pending_create = Some(tokio::spawn(async move {
                gateway.create_remote_session(target_secs).await
            }));
            return;
        }

        match (self.machine.remote_id().cloned(), self.pending_create.take()) {
            (Some(id), _) => {
                self.finalizers.spawn(async move {
                    finalize(&gateway, Some(&id), request).await;
                    None
                });
            }
            (None, Some(create)) => {
                debug!("remote creation still in flight; deferring finalization");
                self.finalizers.spawn(async move {
                    let id = create.await.ok().flatten();
                    match &id {
                        Some(id) => finalize(&gateway, Some(id), request).await,
                        None => debug!("no remote session was created; finalization skipped"),
                    }
                    id
                });
            }
            (None, None) => debug!("no remote session; finalization skipped"),
        }
    }

    async fn teardown(self) -> SessionSnapshot {
        let SessionActor {
            mut machine,
            monitor,
            sensor_available,
            ticker,
            snapshots,
            events,
            pending_create,
            mut finalizers,
            flush_timeout,
            ..
        } = self;

        if let Some(mut monitor) = monitor {
            monitor.stop();
        }
        drop(ticker);

        let released_at = Instant::now();
        let snapshot = machine.snapshot(released_at, sensor_available);
        snapshots.send_replace(snapshot.clone());

        // Released mid-session: let an in-flight creation finish, nothing more.
        if let Some(create) = pending_create {
            finalizers.spawn(async move { create.await.ok().flatten() });
        }

        let mut resolved = None;
        let flush = async {
            while let Some(result) = finalizers.join_next().await {
                match result {
                    Ok(Some(id)) => resolved = Some(id),
                    Ok(None) => {}
                    Err(e) => warn!("persistence task failed: {e}"),
                }
            }
        };
        if tokio::time::timeout(flush_timeout, flush).await.is_err() {
            warn!(
                pending = finalizers.len(),
                "abandoning persistence calls still in flight"
            );
            finalizers.abort_all();
        }

        let snapshot = match resolved {
            Some(id) if machine.link_remote(id.clone()) => {
                let _ = events.send(Event::RemoteSessionLinked {
                    remote_id: id,
                    at: Utc::now(),
                });
                let snapshot = machine.snapshot(released_at, sensor_available);
                snapshots.send_replace(snapshot.clone());
                snapshot
            }
            _ => snapshot,
        };

        info!(
            state = ?snapshot.state,
            elapsed_secs = snapshot.elapsed_secs,
            "session released"
        );
        snapshot
    }

    fn emit(&self, event: Event) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self, now: Instant) {
        self.snapshots
            .send_replace(self.machine.snapshot(now, self.sensor_available));
    }
}

async fn join_create(
    create: &mut Option<JoinHandle<Option<RemoteSessionId>>>,
) -> Option<RemoteSessionId> {
    match create {
        Some(handle) => handle.await.ok().flatten(),
        None => std::future::pending().await,
    }
}

async fn finalize(
    gateway: &PersistenceGateway,
    id: Option<&RemoteSessionId>,
    request: PersistenceRequest,
) {
    // Failures are logged by the gateway.
    let _ = match request {
        PersistenceRequest::Complete {
            actual_secs,
            interruption_count,
        } => {
            gateway
                .complete_remote_session(id, actual_secs, interruption_count)
                .await
        }
        PersistenceRequest::Cancel {
            actual_secs,
            interruption_count,
        } => {
            gateway
                .cancel_remote_session(id, actual_secs, interruption_count)
                .await
        }
        PersistenceRequest::Create { .. } => Ok(()),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::recording::RecordingHaptics;
    use crate::orientation::{FeedSource, UnavailableSource};

    fn options(target_secs: u64) -> SessionOptions {
        SessionOptions {
            target_secs,
            ..SessionOptions::default()
        }
    }

    #[tokio::test]
    async fn zero_target_is_rejected() {
        let result = SessionController::spawn(
            options(0),
            Arc::new(UnavailableSource),
            None,
            PersistenceGateway::local_only(),
        );
        assert!(matches!(result, Err(ValidationError::ZeroTarget)));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_plays_both_haptic_pulses() {
        let feed = FeedSource::new();
        let haptics = Arc::new(RecordingHaptics::default());
        let mut controller = SessionController::spawn(
            options(5),
            Arc::new(feed.clone()),
            Some(haptics.clone() as Arc<dyn HapticFeedback>),
            PersistenceGateway::local_only(),
        )
        .unwrap();

        feed.push(0.95);
        let snapshot = controller.finished().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Completed);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(
            haptics.pulses(),
            vec![
                HapticPattern::Success,
                HapticPattern::Success,
                HapticPattern::HeavyImpact
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_start_without_sensor_pulses_once() {
        let haptics = Arc::new(RecordingHaptics::default());
        let controller = SessionController::spawn(
            options(60),
            Arc::new(UnavailableSource),
            Some(haptics.clone() as Arc<dyn HapticFeedback>),
            PersistenceGateway::local_only(),
        )
        .unwrap();

        controller.manual_start().unwrap();
        controller.manual_pause().unwrap();
        controller.manual_resume().unwrap();
        let snapshot = controller.settled_snapshot().await.unwrap();

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(haptics.pulses(), vec![HapticPattern::Success]);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_after_release_report_closed() {
        let mut controller = SessionController::spawn(
            options(60),
            Arc::new(UnavailableSource),
            None,
            PersistenceGateway::local_only(),
        )
        .unwrap();

        controller.cancel().unwrap();
        let snapshot = controller.finished().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Cancelled);
        assert!(matches!(controller.manual_start(), Err(SessionError::Closed)));
        assert!(matches!(controller.finished().await, Err(SessionError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn settled_snapshot_sees_queued_edges() {
        let feed = FeedSource::new();
        let controller = SessionController::spawn(
            options(60),
            Arc::new(feed.clone()),
            None,
            PersistenceGateway::local_only(),
        )
        .unwrap();

        feed.push(0.9);
        feed.push(0.1);
        let snapshot = controller.settled_snapshot().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Paused);
        assert_eq!(snapshot.interruption_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_controller_releases_the_sensor() {
        let feed = FeedSource::new();
        let controller = SessionController::spawn(
            options(60),
            Arc::new(feed.clone()),
            None,
            PersistenceGateway::local_only(),
        )
        .unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        drop(controller);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_session_keeps_local_state() {
        let feed = FeedSource::new();
        let controller = SessionController::spawn(
            options(60),
            Arc::new(feed.clone()),
            None,
            PersistenceGateway::local_only(),
        )
        .unwrap();

        feed.push(0.9);
        tokio::time::sleep(Duration::from_secs(3)).await;
        let snapshot = controller.shutdown().await.unwrap();

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.elapsed_secs, 3);
        assert_eq!(feed.subscriber_count(), 0);
    }
}
