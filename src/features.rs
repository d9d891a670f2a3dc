//! Landmark normalization.
//!
//! Turns the raw landmarks of one hand into the feature vector every classifier is trained on and
//! queried with. Training data and live detections go through the same function,
//! [`normalize_positions`], so features never drift between the two.
//!
//! The normalization is:
//!
//! 1. Translate all points so that the wrist is the origin.
//! 2. Divide X and Y of every point by the distance (in the XY plane) between the wrist and the
//!    middle finger tip, plus [`SCALE_EPSILON`]. Z is left unscaled.
//! 3. Flatten the points into `[x0, y0, z0, x1, y1, z1, ...]`.
//!
//! This makes the features invariant to where the hand is in the image and how large it appears,
//! but not to its rotation.

use std::ops::Index;

use crate::hand::{HandLandmarks, LandmarkIdx, Position, NUM_LANDMARKS};

/// Number of values in a [`FeatureVector`].
pub const FEATURE_LEN: usize = NUM_LANDMARKS * 3;

/// Index of the landmark used as the origin.
pub const WRIST: usize = LandmarkIdx::Wrist as usize;

/// Index of the landmark whose distance from the wrist defines the scale.
pub const MID_TIP: usize = LandmarkIdx::MiddleFingerTip as usize;

/// Added to the scale so that a degenerate hand (middle finger tip on the wrist) does not divide
/// by zero.
pub const SCALE_EPSILON: f32 = 1e-6;

/// A normalized hand pose, as consumed by the classifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    /// Wraps already-normalized values.
    pub fn from_array(values: [f32; FEATURE_LEN]) -> Self {
        Self(values)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Returns the normalized position of landmark `index`.
    pub fn point(&self, index: usize) -> Position {
        let i = index * 3;
        [self.0[i], self.0[i + 1], self.0[i + 2]]
    }
}

impl Index<usize> for FeatureVector {
    type Output = f32;

    #[inline]
    fn index(&self, index: usize) -> &f32 {
        &self.0[index]
    }
}

/// Normalizes the landmarks of a detected hand.
pub fn normalize(hand: &HandLandmarks) -> FeatureVector {
    normalize_positions(hand.positions())
}

/// Normalizes 21 raw landmark positions.
///
/// All arithmetic is `f32`. The result is fully determined by the input, and is finite as long as
/// the input is.
pub fn normalize_positions(points: &[Position; NUM_LANDMARKS]) -> FeatureVector {
    let [wx, wy, wz] = points[WRIST];
    let translated = points.map(|[x, y, z]| [x - wx, y - wy, z - wz]);

    let [mx, my, _] = translated[MID_TIP];
    let scale = (mx * mx + my * my).sqrt() + SCALE_EPSILON;

    let mut out = [0.0; FEATURE_LEN];
    for (chunk, [x, y, z]) in out.chunks_exact_mut(3).zip(translated) {
        chunk[0] = x / scale;
        chunk[1] = y / scale;
        chunk[2] = z;
    }
    FeatureVector(out)
}
