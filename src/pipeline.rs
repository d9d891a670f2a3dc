//! The inference pipeline: image bytes in, gesture label out.

use std::{error::Error, fmt, sync::Arc};

use itertools::Itertools as _;

use crate::{
    classifier::{Classifier, Label, Model},
    config::Config,
    features,
    hand::{HandDetector, PalmLandmarker},
    image::Image,
    timer::Timer,
};

/// An image media type accepted by [`InferencePipeline::infer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
}

impl MediaType {
    /// Parses a declared content type. Only the exact strings `image/jpeg` and `image/png` are
    /// accepted.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Guesses the media type from a file extension (`jpg`, `jpeg` or `png`, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// The ways an inference request can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The declared content type is neither JPEG nor PNG.
    UnsupportedMediaType,
    /// The bytes are not a valid JPEG or PNG image.
    UndecodableImage,
    /// The detector found no hand in the image.
    NoHandDetected,
    /// The classifier failed on a valid feature vector.
    PredictionFailed,
    /// The detector itself failed to run.
    DetectionFailed,
}

impl ErrorKind {
    /// Returns the HTTP-style status code of this kind.
    pub fn status(&self) -> u16 {
        match self {
            Self::UnsupportedMediaType => 415,
            Self::UndecodableImage => 400,
            Self::NoHandDetected => 422,
            Self::PredictionFailed => 500,
            Self::DetectionFailed => 503,
        }
    }

    /// Returns the message shown to callers.
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType => "file must be a JPEG or PNG image",
            Self::UndecodableImage => "could not decode image",
            Self::NoHandDetected => "no hand detected",
            Self::PredictionFailed => "internal server error",
            Self::DetectionFailed => "hand detector unavailable",
        }
    }
}

/// Error returned by [`InferencePipeline::infer`].
///
/// The [`fmt::Display`] output is the caller-facing message of the [`ErrorKind`] and never
/// contains internal details. The underlying cause, if any, is available via
/// [`PipelineError::cause`] and [`Error::source`].
#[derive(Debug)]
pub struct PipelineError {
    kind: ErrorKind,
    cause: Option<anyhow::Error>,
}

impl PipelineError {
    fn new(kind: ErrorKind) -> Self {
        Self { kind, cause: None }
    }

    fn with_cause(kind: ErrorKind, cause: anyhow::Error) -> Self {
        Self {
            kind,
            cause: Some(cause),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.message())
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Decodes an image, finds a hand, and classifies its gesture.
///
/// The detector and classifier are loaded once and shared; `infer` only needs `&self` and may
/// be called from many threads at once.
pub struct InferencePipeline {
    detector: Arc<dyn HandDetector>,
    classifier: Arc<dyn Classifier>,
    t_decode: Timer,
    t_detect: Timer,
    t_predict: Timer,
}

impl InferencePipeline {
    pub fn new(detector: Arc<dyn HandDetector>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            detector,
            classifier,
            t_decode: Timer::new("decode"),
            t_detect: Timer::new("detect"),
            t_predict: Timer::new("predict"),
        }
    }

    /// Loads the ONNX hand detector and the classifier model named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let detector = PalmLandmarker::load(&config.detector)?;
        let model = Model::load(&config.classifier.model)?;
        Ok(Self::new(Arc::new(detector), Arc::new(model)))
    }

    /// Classifies the hand gesture in an uploaded image.
    ///
    /// `content_type` is checked before the bytes are looked at. It only gates the request; the
    /// decoder is picked from the bytes, so a PNG declared as `image/jpeg` still decodes.
    pub fn infer(&self, image_bytes: &[u8], content_type: &str) -> Result<Label, PipelineError> {
        let media_type = MediaType::from_content_type(content_type).ok_or_else(|| {
            log::debug!("rejecting upload with content type '{content_type}'");
            PipelineError::new(ErrorKind::UnsupportedMediaType)
        })?;

        let image = self
            .t_decode
            .time(|| Image::decode_any(image_bytes))
            .map_err(|e| {
                log::debug!("failed to decode {} upload: {e:#}", media_type.content_type());
                PipelineError::with_cause(ErrorKind::UndecodableImage, e)
            })?;

        let landmarks = match self.t_detect.time(|| self.detector.detect(&image)) {
            Ok(Some(landmarks)) => landmarks,
            Ok(None) => {
                log::debug!("no hand in {} image", image.resolution());
                return Err(PipelineError::new(ErrorKind::NoHandDetected));
            }
            Err(e) => {
                log::error!("hand detection failed: {e:#}");
                return Err(PipelineError::with_cause(ErrorKind::DetectionFailed, e));
            }
        };

        let features = features::normalize(&landmarks);
        let label = self
            .t_predict
            .time(|| self.classifier.predict(&features))
            .map_err(|e| {
                log::error!("prediction failed: {e:#}");
                PipelineError::with_cause(ErrorKind::PredictionFailed, e)
            })?;

        log::debug!("predicted '{label}'");
        Ok(label)
    }

    /// Returns the profiling timers of the decode, detect and predict stages.
    pub fn timers(&self) -> impl IntoIterator<Item = &Timer> {
        [&self.t_decode, &self.t_detect, &self.t_predict]
    }

    /// Logs the average stage timings collected since the last call, and resets them.
    pub fn log_timers(&self) {
        log::debug!("{}", self.timers().into_iter().map(|t| t.to_string()).join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_types() {
        assert_eq!(MediaType::from_content_type("image/png"), Some(MediaType::Png));
        assert_eq!(MediaType::from_content_type("image/jpeg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_content_type("image/jpg"), None);
        assert_eq!(MediaType::from_content_type("IMAGE/PNG"), None);
        assert_eq!(MediaType::from_content_type("image/png; q=1"), None);
        assert_eq!(MediaType::from_extension("JPG"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_extension("gif"), None);
    }

    #[test]
    fn kinds_have_distinct_statuses() {
        let kinds = [
            ErrorKind::UnsupportedMediaType,
            ErrorKind::UndecodableImage,
            ErrorKind::NoHandDetected,
            ErrorKind::PredictionFailed,
            ErrorKind::DetectionFailed,
        ];
        let statuses = kinds.iter().map(|k| k.status()).collect::<Vec<_>>();
        assert_eq!(statuses, [415, 400, 422, 500, 503]);
    }

    #[test]
    fn display_hides_cause() {
        let err = PipelineError::with_cause(
            ErrorKind::PredictionFailed,
            anyhow::anyhow!("weights file truncated"),
        );
        assert_eq!(err.to_string(), "internal server error");
        assert!(err.source().is_some());
        assert_eq!(err.cause().unwrap().to_string(), "weights file truncated");
    }
}
