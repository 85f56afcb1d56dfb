//! Hysteresis debouncer for the vertical-axis accelerometer reading.
//!
//! The phone reports `z ≈ +1` when lying screen-down and `z ≈ -1` when the
//! screen faces the user. Two thresholds are used instead of one:
//!
//! ```text
//!  -1.0 ........ 0.3 ======== 0.7 ........ 1.0
//!       face-up   |  dead zone |  face-down
//! ```
//!
//! A FaceDown edge needs `z > 0.7` while the latch is clear, a FaceUp edge
//! needs `z < 0.3` while it is set. Anything inside the band leaves the latch
//! alone, so a phone resting near the boundary angle cannot chatter.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ValidationError;

/// Default enter threshold for the face-down latch.
pub const FACE_DOWN_THRESHOLD: f64 = 0.7;
/// Default exit threshold for the face-down latch.
pub const FACE_UP_THRESHOLD: f64 = 0.3;

/// One raw accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Gravity component along the axis normal to the screen, in g.
    pub vertical_axis_acceleration: f64,
    pub at: Instant,
}

impl OrientationSample {
    pub fn new(vertical_axis_acceleration: f64, at: Instant) -> Self {
        Self {
            vertical_axis_acceleration,
            at,
        }
    }

    /// Sample stamped with the current (tokio) instant.
    pub fn now(vertical_axis_acceleration: f64) -> Self {
        Self::new(vertical_axis_acceleration, Instant::now())
    }
}

/// Kind of a debounced edge, without its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    FaceDown,
    FaceUp,
}

/// A threshold crossing reported by the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationEdge {
    FaceDown { at: Instant },
    FaceUp { at: Instant },
}

impl OrientationEdge {
    pub fn kind(&self) -> EdgeKind {
        match self {
            OrientationEdge::FaceDown { .. } => EdgeKind::FaceDown,
            OrientationEdge::FaceUp { .. } => EdgeKind::FaceUp,
        }
    }

    pub fn at(&self) -> Instant {
        match *self {
            OrientationEdge::FaceDown { at } | OrientationEdge::FaceUp { at } => at,
        }
    }
}

/// Enter/exit pair forming the hysteresis band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    face_down: f64,
    face_up: f64,
}

impl Thresholds {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidThresholds`] unless
    /// `-1 <= face_up < face_down <= 1`.
    pub fn new(face_down: f64, face_up: f64) -> Result<Self, ValidationError> {
        let in_range = |v: f64| (-1.0..=1.0).contains(&v);
        if !in_range(face_down) || !in_range(face_up) || face_up >= face_down {
            return Err(ValidationError::InvalidThresholds { face_down, face_up });
        }
        Ok(Self { face_down, face_up })
    }

    pub fn face_down(&self) -> f64 {
        self.face_down
    }

    pub fn face_up(&self) -> f64 {
        self.face_up
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            face_down: FACE_DOWN_THRESHOLD,
            face_up: FACE_UP_THRESHOLD,
        }
    }
}

/// Single-latch debouncer. Emits only on crossings; steady readings are silent.
#[derive(Debug, Clone)]
pub struct OrientationDebouncer {
    thresholds: Thresholds,
    face_down: bool,
}

impl OrientationDebouncer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            face_down: false,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Current latch value.
    pub fn is_face_down(&self) -> bool {
        self.face_down
    }

    /// Feed one sample. Returns an edge only when the latch flips.
    pub fn observe(&mut self, sample: OrientationSample) -> Option<OrientationEdge> {
        let z = sample.vertical_axis_acceleration;
        if z.is_nan() {
            return None;
        }

        if !self.face_down && z > self.thresholds.face_down {
            self.face_down = true;
            Some(OrientationEdge::FaceDown { at: sample.at })
        } else if self.face_down && z < self.thresholds.face_up {
            self.face_down = false;
            Some(OrientationEdge::FaceUp { at: sample.at })
        } else {
            None
        }
    }

    /// Clear the latch, as if the phone were face-up.
    pub fn reset(&mut self) {
        self.face_down = false;
    }
}

impl Default for OrientationDebouncer {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}
