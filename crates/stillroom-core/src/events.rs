use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orientation::EdgeKind;
use crate::persistence::RemoteSessionId;
use crate::session::{SessionSnapshot, SessionState};

/// What caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Sensor,
    Manual,
    Timer,
}

/// Every state change in a session produces an Event.
/// The UI listens for them; the CLI prints them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionStarted {
        target_secs: u64,
        trigger: Trigger,
        at: DateTime<Utc>,
    },
    SessionPaused {
        elapsed_secs: u64,
        interruption_count: u32,
        trigger: Trigger,
        at: DateTime<Utc>,
    },
    SessionResumed {
        elapsed_secs: u64,
        trigger: Trigger,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        elapsed_secs: u64,
        interruption_count: u32,
        at: DateTime<Utc>,
    },
    SessionCancelled {
        elapsed_secs: u64,
        interruption_count: u32,
        /// State the session was in when the user cancelled.
        from: SessionState,
        at: DateTime<Utc>,
    },
    /// Remote creation succeeded and the session now has a backend id.
    RemoteSessionLinked {
        remote_id: RemoteSessionId,
        at: DateTime<Utc>,
    },
    /// Debounced orientation change, reported whether or not it moved the session.
    OrientationChanged {
        edge: EdgeKind,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        snapshot: SessionSnapshot,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// The session state this event leaves the session in, if it is a transition.
    pub fn resulting_state(&self) -> Option<SessionState> {
        match self {
            Event::SessionStarted { .. } | Event::SessionResumed { .. } => {
                Some(SessionState::Active)
            }
            Event::SessionPaused { .. } => Some(SessionState::Paused),
            Event::SessionCompleted { .. } => Some(SessionState::Completed),
            Event::SessionCancelled { .. } => Some(SessionState::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = Event::SessionPaused {
            elapsed_secs: 10,
            interruption_count: 1,
            trigger: Trigger::Sensor,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session_paused");
        assert_eq!(json["trigger"], "sensor");
        assert_eq!(json["elapsed_secs"], 10);
    }

    #[test]
    fn resulting_state_follows_transition() {
        let at = Utc::now();
        assert_eq!(
            Event::SessionResumed {
                elapsed_secs: 3,
                trigger: Trigger::Manual,
                at
            }
            .resulting_state(),
            Some(SessionState::Active)
        );
        assert_eq!(
            Event::OrientationChanged {
                edge: EdgeKind::FaceUp,
                at
            }
            .resulting_state(),
            None
        );
    }
}
