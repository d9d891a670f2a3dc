//! Hand gesture classification from still images.
//!
//! The crate is split into two halves that share one piece of arithmetic:
//!
//! * **Inference**: an image is decoded, a hand is located with [`hand::PalmLandmarker`] (or any
//!   other [`hand::HandDetector`]), its 21 landmarks are turned into a
//!   [`features::FeatureVector`], and a loaded [`classifier::Classifier`] maps that vector to a
//!   gesture label. [`pipeline::InferencePipeline`] wires these steps together.
//! * **Training**: a CSV of raw landmarks is cleaned, normalized and split by [`dataset`], and
//!   [`train`] fits, evaluates and persists the supported classifier kinds.
//!
//! Both halves normalize landmarks through [`features::normalize_positions`], so a model never
//! sees features computed differently from the ones it was trained on.
//!
//! # Coordinates
//!
//! Landmark coordinates produced by the detector are normalized to the input image: X points to
//! the right and Y points *down*, both roughly in `0.0..=1.0`. Z is a relative depth estimate
//! on approximately the same scale as X, with smaller values being closer to the camera.
//!
//! # Environment Variables
//!
//! * `HANDSIGN_CONFIG`: path to a TOML configuration file, used when no path is passed
//!   explicitly (see [`config::Config::from_env`]).
//! * `RUST_LOG`: overrides the log levels set by [`init_logger!`].

pub mod classifier;
pub mod config;
pub mod controls;
pub mod dataset;
pub mod detection;
pub mod features;
pub mod hand;
pub mod image;
pub mod metrics;
pub mod nn;
pub mod pipeline;
pub mod timer;
pub mod train;

use log::LevelFilter;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("tract_core"), LevelFilter::Warn)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and handsign will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `tract` will always log at *warn* level, everything else at *info*.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
