//! Session state machine.
//!
//! A wall-clock-based machine with no internal threads: the owner feeds it
//! inputs together with the current instant, and it answers with at most one
//! [`Transition`]. Completion is time-based, so the owner must also deliver
//! [`SessionInput::Tick`] periodically while the session is active.
//!
//! ## State Transitions
//!
//! ```text
//! Waiting -> Active <-> Paused -> Completed | Cancelled
//!    \______________________________________/ (cancel)
//! ```
//!
//! Elapsed time is `baseline + (now - anchor)`, where `anchor` is the instant
//! of the latest Active entry and `baseline` is the time frozen at the last
//! pause. This is the same quantity as `now - (anchor - baseline)`, i.e. the
//! reference start shifted back by the frozen elapsed time, so a pause and
//! immediate resume neither loses nor gains time.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ValidationError;
use crate::events::{Event, Trigger};
use crate::orientation::EdgeKind;
use crate::persistence::RemoteSessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for the phone to be placed face-down.
    Waiting,
    /// Timer running.
    Active,
    /// Phone picked up; timer frozen.
    Paused,
    Completed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

/// Anything that can move the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    /// Debounced orientation edge.
    Edge(EdgeKind),
    /// Fallback start control, equivalent to a FaceDown edge while Waiting.
    ManualStart,
    /// Fallback pause control, equivalent to a FaceUp edge while Active.
    ManualPause,
    /// Fallback resume control, equivalent to a FaceDown edge while Paused.
    ManualResume,
    Cancel,
    /// Completion poll.
    Tick,
}

impl SessionInput {
    fn trigger(self) -> Trigger {
        match self {
            SessionInput::Edge(_) => Trigger::Sensor,
            SessionInput::Tick => Trigger::Timer,
            _ => Trigger::Manual,
        }
    }
}

/// Remote mirror call requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceRequest {
    Create {
        target_secs: u64,
    },
    Complete {
        actual_secs: u64,
        interruption_count: u32,
    },
    Cancel {
        actual_secs: u64,
        interruption_count: u32,
    },
}

/// Outcome of an accepted input.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub event: Event,
    pub persistence: Option<PersistenceRequest>,
}

/// The session record. Only the machine mutates it.
#[derive(Debug, Clone, PartialEq)]
struct Session {
    remote_id: Option<RemoteSessionId>,
    target: Duration,
    elapsed: Duration,
    interruption_count: u32,
    state: SessionState,
}

/// Read-only projection for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub target_secs: u64,
    pub interruption_count: u32,
    pub sensor_available: bool,
    pub remote_id: Option<RemoteSessionId>,
    /// 0.0 .. 1.0
    pub progress: f64,
}

impl SessionSnapshot {
    /// Remaining time as `MM:SS`.
    pub fn remaining_clock(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.remaining_secs / 60,
            self.remaining_secs % 60
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    session: Session,
    /// Elapsed time accumulated before the current running window.
    elapsed_baseline: Duration,
    /// Instant of the latest Active entry; `Some` only while Active.
    running_anchor: Option<Instant>,
}

impl SessionMachine {
    /// New session in `Waiting`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroTarget`] if `target_secs` is zero.
    pub fn new(target_secs: u64) -> Result<Self, ValidationError> {
        if target_secs == 0 {
            return Err(ValidationError::ZeroTarget);
        }
        Ok(Self {
            session: Session {
                remote_id: None,
                target: Duration::from_secs(target_secs),
                elapsed: Duration::ZERO,
                interruption_count: 0,
                state: SessionState::Waiting,
            },
            elapsed_baseline: Duration::ZERO,
            running_anchor: None,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn target_secs(&self) -> u64 {
        self.session.target.as_secs()
    }

    pub fn interruption_count(&self) -> u32 {
        self.session.interruption_count
    }

    pub fn remote_id(&self) -> Option<&RemoteSessionId> {
        self.session.remote_id.as_ref()
    }

    /// Elapsed time as of `now`, without mutating anything.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        match (self.session.state, self.running_anchor) {
            (SessionState::Active, Some(anchor)) => self
                .elapsed_baseline
                .saturating_add(now.saturating_duration_since(anchor)),
            _ => self.session.elapsed,
        }
    }

    pub fn elapsed_secs_at(&self, now: Instant) -> u64 {
        self.elapsed_at(now).as_secs()
    }

    /// Whole seconds left, counted from the floored elapsed so that
    /// `elapsed + remaining == target` always holds.
    pub fn remaining_secs_at(&self, now: Instant) -> u64 {
        self.target_secs()
            .saturating_sub(self.elapsed_at(now).min(self.session.target).as_secs())
    }

    pub fn snapshot(&self, now: Instant, sensor_available: bool) -> SessionSnapshot {
        let elapsed = self.elapsed_at(now).min(self.session.target);
        SessionSnapshot {
            state: self.session.state,
            elapsed_secs: elapsed.as_secs(),
            remaining_secs: self.remaining_secs_at(now),
            target_secs: self.target_secs(),
            interruption_count: self.session.interruption_count,
            sensor_available,
            remote_id: self.session.remote_id.clone(),
            progress: elapsed.as_secs_f64() / self.session.target.as_secs_f64(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Attach the id returned by remote creation. Ignored if one is already set.
    pub fn link_remote(&mut self, remote_id: RemoteSessionId) -> bool {
        if self.session.remote_id.is_some() {
            return false;
        }
        self.session.remote_id = Some(remote_id);
        true
    }

    /// Apply one input. Returns `None` when the input is not valid in the
    /// current state (duplicate edges, anything after a terminal state).
    pub fn apply(&mut self, input: SessionInput, now: Instant) -> Option<Transition> {
        if self.session.state == SessionState::Active {
            if let Some(done) = self.check_completion(now) {
                return Some(done);
            }
        }

        let trigger = input.trigger();
        match (self.session.state, input) {
            (
                SessionState::Waiting,
                SessionInput::Edge(EdgeKind::FaceDown) | SessionInput::ManualStart,
            ) => Some(self.start(now, trigger)),
            (
                SessionState::Active,
                SessionInput::Edge(EdgeKind::FaceUp) | SessionInput::ManualPause,
            ) => Some(self.pause(now, trigger)),
            (
                SessionState::Paused,
                SessionInput::Edge(EdgeKind::FaceDown) | SessionInput::ManualResume,
            ) => Some(self.resume(now, trigger)),
            (
                SessionState::Waiting | SessionState::Active | SessionState::Paused,
                SessionInput::Cancel,
            ) => Some(self.cancel(now)),
            _ => None,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn check_completion(&mut self, now: Instant) -> Option<Transition> {
        if self.elapsed_at(now) < self.session.target {
            return None;
        }
        let from = self.session.state;
        self.session.elapsed = self.session.target;
        self.elapsed_baseline = self.session.target;
        self.running_anchor = None;
        self.session.state = SessionState::Completed;

        let actual_secs = self.target_secs();
        Some(Transition {
            from,
            to: SessionState::Completed,
            event: Event::SessionCompleted {
                elapsed_secs: actual_secs,
                interruption_count: self.session.interruption_count,
                at: Utc::now(),
            },
            persistence: Some(PersistenceRequest::Complete {
                actual_secs,
                interruption_count: self.session.interruption_count,
            }),
        })
    }

    fn start(&mut self, now: Instant, trigger: Trigger) -> Transition {
        self.session.state = SessionState::Active;
        self.session.elapsed = Duration::ZERO;
        self.elapsed_baseline = Duration::ZERO;
        self.running_anchor = Some(now);

        let target_secs = self.target_secs();
        Transition {
            from: SessionState::Waiting,
            to: SessionState::Active,
            event: Event::SessionStarted {
                target_secs,
                trigger,
                at: Utc::now(),
            },
            persistence: Some(PersistenceRequest::Create { target_secs }),
        }
    }

    fn pause(&mut self, now: Instant, trigger: Trigger) -> Transition {
        self.freeze(now);
        self.session.state = SessionState::Paused;
        self.session.interruption_count += 1;

        Transition {
            from: SessionState::Active,
            to: SessionState::Paused,
            event: Event::SessionPaused {
                elapsed_secs: self.session.elapsed.as_secs(),
                interruption_count: self.session.interruption_count,
                trigger,
                at: Utc::now(),
            },
            persistence: None,
        }
    }

    fn resume(&mut self, now: Instant, trigger: Trigger) -> Transition {
        self.elapsed_baseline = self.session.elapsed;
        self.running_anchor = Some(now);
        self.session.state = SessionState::Active;

        Transition {
            from: SessionState::Paused,
            to: SessionState::Active,
            event: Event::SessionResumed {
                elapsed_secs: self.session.elapsed.as_secs(),
                trigger,
                at: Utc::now(),
            },
            persistence: None,
        }
    }

    fn cancel(&mut self, now: Instant) -> Transition {
        let from = self.session.state;
        self.freeze(now);
        self.session.state = SessionState::Cancelled;

        let actual_secs = self.session.elapsed.as_secs();
        // Nothing was created remotely for a session that never started.
        let persistence = (from != SessionState::Waiting).then_some(PersistenceRequest::Cancel {
            actual_secs,
            interruption_count: self.session.interruption_count,
        });

        Transition {
            from,
            to: SessionState::Cancelled,
            event: Event::SessionCancelled {
                elapsed_secs: actual_secs,
                interruption_count: self.session.interruption_count,
                from,
                at: Utc::now(),
            },
            persistence,
        }
    }

    fn freeze(&mut self, now: Instant) {
        self.session.elapsed = self.elapsed_at(now);
        self.elapsed_baseline = self.session.elapsed;
        self.running_anchor = None;
    }
}
