mod debouncer;
mod haptics;
mod monitor;
mod source;

pub use debouncer::{
    EdgeKind, OrientationDebouncer, OrientationEdge, OrientationSample, Thresholds,
    FACE_DOWN_THRESHOLD, FACE_UP_THRESHOLD,
};
pub use haptics::{
    play_completion, HapticFeedback, HapticPattern, NoHaptics, TracingHaptics,
    COMPLETION_FOLLOW_UP,
};
pub use monitor::OrientationMonitor;
pub use source::{
    FeedSource, OrientationSource, SampleCallback, ScriptPhase, ScriptedSource,
    SubscriptionHandle, UnavailableSource,
};

#[cfg(test)]
pub(crate) use haptics::recording;
