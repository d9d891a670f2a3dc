//! Hand detection and landmark estimation.
//!
//! [`PalmLandmarker`] runs two networks in sequence: [`detection::PalmDetector`] locates the most
//! confident palm in the image, and [`landmark::LandmarkNetwork`] estimates the 21 hand landmarks
//! inside a rotated region around that palm.

pub mod detection;
pub mod landmark;

use crate::{config::DetectorConfig, image::Image, timer::Timer};

use self::{detection::PalmDetector, landmark::LandmarkNetwork};

pub use self::landmark::{HandLandmarks, LandmarkIdx, Position, NUM_LANDMARKS};

/// Turns an image into the landmarks of (at most) one hand.
///
/// Implementations are shared between concurrent requests, so they must not require exclusive
/// access to run.
pub trait HandDetector: Send + Sync {
    /// Locates a hand in `image` and estimates its landmarks.
    ///
    /// Returns `Ok(None)` when no hand is visible. Errors are reserved for faults of the detector
    /// itself.
    fn detect(&self, image: &Image) -> anyhow::Result<Option<HandLandmarks>>;
}

/// The ONNX-based [`HandDetector`]: palm detection followed by landmark estimation.
///
/// Loading optimizes both networks, which is slow, so this should be created once and shared.
pub struct PalmLandmarker {
    palm: PalmDetector,
    landmarks: LandmarkNetwork,
    t_palm: Timer,
    t_landmarks: Timer,
}

impl PalmLandmarker {
    /// Loads both networks from the paths in `config`.
    pub fn load(config: &DetectorConfig) -> anyhow::Result<Self> {
        let palm = PalmDetector::load(&config.palm_model, config.min_detection_confidence)?;
        let landmarks = LandmarkNetwork::load(&config.landmark_model, config.min_presence)?;
        log::info!(
            "loaded hand detector ({} palm input, {} landmark input)",
            palm.input_resolution(),
            landmarks.cnn().input_resolution(),
        );

        Ok(Self {
            palm,
            landmarks,
            t_palm: Timer::new("palm"),
            t_landmarks: Timer::new("landmarks"),
        })
    }

    /// Returns the profiling timers of both stages.
    pub fn timers(&self) -> impl IntoIterator<Item = &Timer> {
        [&self.t_palm, &self.t_landmarks]
    }
}

impl HandDetector for PalmLandmarker {
    fn detect(&self, image: &Image) -> anyhow::Result<Option<HandLandmarks>> {
        let palm = match self.t_palm.time(|| self.palm.detect(image))? {
            Some(palm) => palm,
            None => return Ok(None),
        };
        log::trace!(
            "palm at {:?} (confidence {:.2}, {:.1}°)",
            palm.center(),
            palm.confidence(),
            palm.angle_radians().to_degrees(),
        );

        let roi = palm.hand_roi();
        self.t_landmarks
            .time(|| self.landmarks.estimate(image, &roi))
    }
}
