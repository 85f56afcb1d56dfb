use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use super::debouncer::{OrientationDebouncer, OrientationEdge, Thresholds};
use super::haptics::{HapticFeedback, HapticPattern};
use super::source::{OrientationSource, SampleCallback, SubscriptionHandle};

/// Live subscription to an orientation source, filtered through a debouncer.
///
/// The subscription is released by [`OrientationMonitor::stop`] or, failing
/// that, when the monitor is dropped.
pub struct OrientationMonitor {
    source: Arc<dyn OrientationSource>,
    subscription: Option<SubscriptionHandle>,
    debouncer: Arc<Mutex<OrientationDebouncer>>,
    available: bool,
}

impl OrientationMonitor {
    /// Subscribe to `source` and forward every debounced edge to `on_edge`.
    ///
    /// An unavailable source (or a refused subscription) yields a monitor
    /// that reports `is_available() == false` and never emits.
    pub fn start<F>(
        source: Arc<dyn OrientationSource>,
        interval: Duration,
        thresholds: Thresholds,
        haptics: Option<Arc<dyn HapticFeedback>>,
        on_edge: F,
    ) -> Self
    where
        F: Fn(OrientationEdge) + Send + Sync + 'static,
    {
        let debouncer = Arc::new(Mutex::new(OrientationDebouncer::new(thresholds)));

        if !source.is_available() {
            warn!("orientation sensor unavailable; manual controls required");
            return Self {
                source,
                subscription: None,
                debouncer,
                available: false,
            };
        }

        let latch = Arc::clone(&debouncer);
        let callback: SampleCallback = Arc::new(move |sample| {
            let edge = latch
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .observe(sample);
            if let Some(edge) = edge {
                debug!(
                    kind = ?edge.kind(),
                    sample_age_ms = edge.at().elapsed().as_millis() as u64,
                    "orientation edge"
                );
                if let Some(haptics) = &haptics {
                    haptics.pulse(HapticPattern::from(edge.kind()));
                }
                on_edge(edge);
            }
        });

        match source.subscribe(interval, callback) {
            Ok(handle) => Self {
                source,
                subscription: Some(handle),
                debouncer,
                available: true,
            },
            Err(e) => {
                warn!("orientation subscription failed: {e}");
                Self {
                    source,
                    subscription: None,
                    debouncer,
                    available: false,
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn is_face_down(&self) -> bool {
        self.debouncer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_face_down()
    }

    /// Unsubscribe and clear the latch. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.source.unsubscribe(handle);
            debug!("orientation subscription released");
        }
        self.debouncer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reset();
    }
}

impl Drop for OrientationMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
