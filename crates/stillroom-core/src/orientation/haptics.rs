//! Haptic feedback collaborator.
//!
//! Pulses are fire-and-forget and have no bearing on session correctness;
//! a headless build can use [`NoHaptics`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::debouncer::EdgeKind;

/// Delay between the two pulses of the completion pattern.
pub const COMPLETION_FOLLOW_UP: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticPattern {
    Success,
    Warning,
    HeavyImpact,
}

impl From<EdgeKind> for HapticPattern {
    fn from(kind: EdgeKind) -> Self {
        match kind {
            EdgeKind::FaceDown => HapticPattern::Success,
            EdgeKind::FaceUp => HapticPattern::Warning,
        }
    }
}

pub trait HapticFeedback: Send + Sync {
    fn pulse(&self, pattern: HapticPattern);
}

/// Discards every pulse.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHaptics;

impl HapticFeedback for NoHaptics {
    fn pulse(&self, _pattern: HapticPattern) {}
}

/// Reports pulses through `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHaptics;

impl HapticFeedback for TracingHaptics {
    fn pulse(&self, pattern: HapticPattern) {
        debug!(?pattern, "haptic pulse");
    }
}

/// Success pulse now, heavy impact shortly after.
///
/// Must be called from inside a tokio runtime.
pub fn play_completion(haptics: Arc<dyn HapticFeedback>) {
    haptics.pulse(HapticPattern::Success);
    tokio::spawn(async move {
        tokio::time::sleep(COMPLETION_FOLLOW_UP).await;
        haptics.pulse(HapticPattern::HeavyImpact);
    });
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Test double that remembers every pulse.
    #[derive(Default)]
    pub struct RecordingHaptics {
        pulses: Mutex<Vec<HapticPattern>>,
    }

    impl RecordingHaptics {
        pub fn pulses(&self) -> Vec<HapticPattern> {
            self.pulses.lock().unwrap().clone()
        }
    }

    impl HapticFeedback for RecordingHaptics {
        fn pulse(&self, pattern: HapticPattern) {
            self.pulses.lock().unwrap().push(pattern);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingHaptics;
    use super::*;

    #[test]
    fn edges_map_to_distinct_patterns() {
        assert_eq!(HapticPattern::from(EdgeKind::FaceDown), HapticPattern::Success);
        assert_eq!(HapticPattern::from(EdgeKind::FaceUp), HapticPattern::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_plays_two_pulses() {
        let haptics = Arc::new(RecordingHaptics::default());
        play_completion(haptics.clone());
        assert_eq!(haptics.pulses(), vec![HapticPattern::Success]);

        tokio::time::sleep(COMPLETION_FOLLOW_UP + Duration::from_millis(1)).await;
        assert_eq!(
            haptics.pulses(),
            vec![HapticPattern::Success, HapticPattern::HeavyImpact]
        );
    }
}
