//! Sensor source abstraction and the sources shipped with the core.
//!
//! A source is callback-based, matching the platform accelerometer APIs:
//! `subscribe` registers a callback that receives raw samples at roughly the
//! requested interval until `unsubscribe` is called with the returned handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::debouncer::OrientationSample;
use crate::error::SensorError;

/// Callback invoked for every raw sample.
pub type SampleCallback = Arc<dyn Fn(OrientationSample) + Send + Sync>;

/// Opaque token returned by [`OrientationSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl SubscriptionHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Every orientation sensor implements this trait.
pub trait OrientationSource: Send + Sync {
    /// Whether the device has a usable sensor.
    fn is_available(&self) -> bool;

    /// Start delivering samples to `callback`.
    fn subscribe(
        &self,
        interval: Duration,
        callback: SampleCallback,
    ) -> Result<SubscriptionHandle, SensorError>;

    /// Stop delivering samples. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// A device without an accelerometer.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableSource;

impl OrientationSource for UnavailableSource {
    fn is_available(&self) -> bool {
        false
    }

    fn subscribe(
        &self,
        _interval: Duration,
        _callback: SampleCallback,
    ) -> Result<SubscriptionHandle, SensorError> {
        Err(SensorError::Unavailable)
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) {}
}

/// Push-driven source: readings arrive from outside (stdin, a platform
/// bridge, a test) through [`FeedSource::push`] and fan out synchronously
/// to every subscriber.
#[derive(Clone, Default)]
pub struct FeedSource {
    subscribers: Arc<Mutex<HashMap<SubscriptionHandle, SampleCallback>>>,
}

impl FeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one reading to all current subscribers.
    pub fn push(&self, vertical_axis_acceleration: f64) {
        let callbacks: Vec<SampleCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        let sample = OrientationSample::now(vertical_axis_acceleration);
        for callback in callbacks {
            callback(sample);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl OrientationSource for FeedSource {
    fn is_available(&self) -> bool {
        true
    }

    fn subscribe(
        &self,
        _interval: Duration,
        callback: SampleCallback,
    ) -> Result<SubscriptionHandle, SensorError> {
        let handle = SubscriptionHandle::next();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(handle, callback);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&handle);
    }
}

/// One segment of a [`ScriptedSource`] script.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptPhase {
    pub hold: Duration,
    pub vertical_axis_acceleration: f64,
}

impl ScriptPhase {
    pub fn new(hold: Duration, vertical_axis_acceleration: f64) -> Self {
        Self {
            hold,
            vertical_axis_acceleration,
        }
    }
}

/// Timer-driven source replaying a fixed script, one sample per interval.
///
/// Each subscription spawns a tokio task, so `subscribe` must be called from
/// inside a runtime. After the last phase the final reading keeps repeating.
#[derive(Clone)]
pub struct ScriptedSource {
    script: Arc<Vec<ScriptPhase>>,
    running: Arc<Mutex<HashMap<SubscriptionHandle, CancellationToken>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<ScriptPhase>) -> Self {
        Self {
            script: Arc::new(script),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn reading_at(script: &[ScriptPhase], offset: Duration) -> Option<f64> {
        let mut boundary = Duration::ZERO;
        for phase in script {
            boundary += phase.hold;
            if offset < boundary {
                return Some(phase.vertical_axis_acceleration);
            }
        }
        script.last().map(|phase| phase.vertical_axis_acceleration)
    }
}

impl OrientationSource for ScriptedSource {
    fn is_available(&self) -> bool {
        !self.script.is_empty()
    }

    fn subscribe(
        &self,
        interval: Duration,
        callback: SampleCallback,
    ) -> Result<SubscriptionHandle, SensorError> {
        if self.script.is_empty() {
            return Err(SensorError::Unavailable);
        }
        if interval.is_zero() {
            return Err(SensorError::SubscribeFailed(
                "sampling interval must be non-zero".into(),
            ));
        }

        let handle = SubscriptionHandle::next();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let script = Arc::clone(&self.script);

        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    now = ticker.tick() => {
                        if let Some(z) = Self::reading_at(&script, now - started) {
                            callback(OrientationSample::new(z, now));
                        }
                    }
                }
            }
            debug!("scripted orientation source stopped");
        });

        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(handle, token);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(token) = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&handle)
        {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback() -> (SampleCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback: SampleCallback = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    #[test]
    fn unavailable_source_refuses_subscription() {
        let (callback, _) = counting_callback();
        let source = UnavailableSource;
        assert!(!source.is_available());
        assert_eq!(
            source.subscribe(Duration::from_millis(100), callback),
            Err(SensorError::Unavailable)
        );
    }

    #[test]
    fn feed_source_stops_after_unsubscribe() {
        let (callback, count) = counting_callback();
        let source = FeedSource::new();
        let handle = source
            .subscribe(Duration::from_millis(100), callback)
            .unwrap();
        source.push(0.9);
        source.unsubscribe(handle);
        source.push(0.1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn script_lookup_follows_phase_boundaries() {
        let script = vec![
            ScriptPhase::new(Duration::from_secs(1), 0.9),
            ScriptPhase::new(Duration::from_secs(2), 0.1),
        ];
        assert_eq!(ScriptedSource::reading_at(&script, Duration::ZERO), Some(0.9));
        assert_eq!(
            ScriptedSource::reading_at(&script, Duration::from_millis(1500)),
            Some(0.1)
        );
        assert_eq!(
            ScriptedSource::reading_at(&script, Duration::from_secs(10)),
            Some(0.1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_source_samples_at_interval() {
        let (callback, count) = counting_callback();
        let source = ScriptedSource::new(vec![ScriptPhase::new(Duration::from_secs(1), 0.9)]);
        let handle = source
            .subscribe(Duration::from_millis(100), callback)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(950)).await;
        source.unsubscribe(handle);
        let delivered = count.load(Ordering::SeqCst);
        assert_eq!(delivered, 10);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), delivered);
    }
}
