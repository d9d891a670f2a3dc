//! Palm detection.

use std::path::Path;

use nalgebra::{Rotation2, Vector2};

use crate::{
    detection::{sigmoid, Anchor, Anchors, LayerInfo},
    image::{Image, Resolution, RotatedRect},
    nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs},
};

/// A keypoint of a [`PalmDetection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

const NUM_KEYPOINTS: usize = 7;
const BOX_PARAMS: usize = 4 + NUM_KEYPOINTS * 2;

/// Offset of the hand region from the palm box center, in units of the box height.
const ROI_SHIFT_Y: f32 = -0.5;
/// Size of the hand region relative to the longer side of the palm box.
const ROI_SCALE: f32 = 2.6;

/// A detected palm, in image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PalmDetection {
    confidence: f32,
    center: [f32; 2],
    width: f32,
    height: f32,
    keypoints: [[f32; 2]; NUM_KEYPOINTS],
}

impl PalmDetection {
    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn center(&self) -> [f32; 2] {
        self.center
    }

    pub fn keypoint(&self, kp: Keypoint) -> [f32; 2] {
        self.keypoints[kp as usize]
    }

    /// Computes the clockwise rotation of the palm compared to an upright position.
    ///
    /// A rotation of 0° means that the fingers point upwards.
    pub fn angle_radians(&self) -> f32 {
        let [fx, fy] = self.keypoint(Keypoint::MiddleFingerMcp);
        let [wx, wy] = self.keypoint(Keypoint::Wrist);
        let rel = Vector2::new(wx - fx, wy - fy);
        Rotation2::rotation_between(&Vector2::y(), &rel).angle()
    }

    /// Returns the rotated square region the landmark network should look at.
    ///
    /// The region is centered slightly towards the fingers, so that it contains the whole hand
    /// and not just the palm.
    pub fn hand_roi(&self) -> RotatedRect {
        let [x, y] = self.center;
        RotatedRect::new(x, y, self.width, self.height, self.angle_radians())
            .shift_local(0.0, ROI_SHIFT_Y * self.height)
            .square_scaled(ROI_SCALE)
    }
}

/// The palm detection network.
///
/// Looks at the whole (letterboxed) image and reports the most confident palm.
#[derive(Clone)]
pub struct PalmDetector {
    cnn: Cnn,
    anchors: Anchors,
    threshold: f32,
}

impl PalmDetector {
    /// Loads the palm detection network from an ONNX file.
    ///
    /// Detections with a confidence below `threshold` are ignored.
    pub fn load<P: AsRef<Path>>(path: P, threshold: f32) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?;
        anyhow::ensure!(
            nn.num_outputs() == 2,
            "palm detection network has {} outputs, expected 2",
            nn.num_outputs(),
        );
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(0.0..=1.0))?;
        let anchors = Anchors::calculate(
            cnn.input_resolution(),
            &[LayerInfo::new(2, 8), LayerInfo::new(6, 16)],
        );
        log::debug!(
            "palm detector input {}, {} anchors",
            cnn.input_resolution(),
            anchors.anchor_count()
        );

        Ok(Self {
            cnn,
            anchors,
            threshold,
        })
    }

    pub fn input_resolution(&self) -> Resolution {
        self.cnn.input_resolution()
    }

    /// Detects the most confident palm in `image`.
    pub fn detect(&self, image: &Image) -> anyhow::Result<Option<PalmDetection>> {
        let rect = RotatedRect::letterbox(image.resolution());
        let outputs = self.cnn.estimate(image, &rect)?;
        self.extract(&outputs, &rect)
    }

    fn extract(
        &self,
        outputs: &Outputs,
        rect: &RotatedRect,
    ) -> anyhow::Result<Option<PalmDetection>> {
        let num_anchors = self.anchors.anchor_count();
        anyhow::ensure!(
            outputs.len() >= 2,
            "palm detection network has {} outputs, expected 2",
            outputs.len(),
        );
        let boxes = outputs.flat(0, &[1, num_anchors, BOX_PARAMS])?;
        let scores = outputs.flat(1, &[1, num_anchors, 1])?;

        let best = scores
            .iter()
            .map(|&score| sigmoid(score))
            .enumerate()
            .filter(|&(_, conf)| conf >= self.threshold)
            .max_by(|(_, a), (_, b)| a.total_cmp(b));

        let Some((index, confidence)) = best else {
            return Ok(None);
        };

        let params = &boxes[index * BOX_PARAMS..][..BOX_PARAMS];
        Ok(Some(decode(
            &self.anchors[index],
            self.input_resolution(),
            rect,
            params,
            confidence,
        )))
    }
}

/// Decodes one row of box parameters, mapping it from network input pixels to image pixels.
fn decode(
    anchor: &Anchor,
    input_res: Resolution,
    rect: &RotatedRect,
    box_params: &[f32],
    confidence: f32,
) -> PalmDetection {
    let input_w = input_res.width() as f32;
    let input_h = input_res.height() as f32;
    let to_image = |x: f32, y: f32| {
        rect.transform_out(
            (x + anchor.x_center() * input_w) / input_w,
            (y + anchor.y_center() * input_h) / input_h,
        )
    };

    let mut keypoints = [[0.0; 2]; NUM_KEYPOINTS];
    for (i, kp) in keypoints.iter_mut().enumerate() {
        *kp = to_image(box_params[4 + i * 2], box_params[5 + i * 2]);
    }

    PalmDetection {
        confidence,
        center: to_image(box_params[0], box_params[1]),
        width: box_params[2] * rect.width() / input_w,
        height: box_params[3] * rect.height() / input_h,
        keypoints,
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;

    fn params(center: [f32; 2], size: f32, wrist: [f32; 2], middle: [f32; 2]) -> Vec<f32> {
        let mut params = vec![0.0; BOX_PARAMS];
        params[..4].copy_from_slice(&[center[0], center[1], size, size]);
        params[4..6].copy_from_slice(&wrist);
        params[8..10].copy_from_slice(&middle);
        params
    }

    #[test]
    fn decode_upright_palm() {
        let anchors = Anchors::calculate(Resolution::new(192, 192), &[LayerInfo::new(1, 96)]);
        // A single anchor in the middle of the input.
        assert_eq!(anchors.anchor_count(), 4);
        let anchor = &anchors[3];

        // 384x384 image, so input pixels are scaled by 2.
        let rect = RotatedRect::letterbox(Resolution::new(384, 384));
        let det = decode(
            anchor,
            Resolution::new(192, 192),
            &rect,
            &params([0.0, 0.0], 20.0, [0.0, 10.0], [0.0, -10.0]),
            0.9,
        );

        assert_abs_diff_eq!(det.center()[0], 288.0);
        assert_abs_diff_eq!(det.center()[1], 288.0);
        assert_abs_diff_eq!(det.keypoint(Keypoint::Wrist)[1], 308.0);
        assert_abs_diff_eq!(det.angle_radians(), 0.0);

        let roi = det.hand_roi();
        assert_abs_diff_eq!(roi.width(), 40.0 * ROI_SCALE, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.center()[0], 288.0, epsilon = 1e-4);
        // Shifted up, towards the fingers.
        assert_abs_diff_eq!(roi.center()[1], 268.0, epsilon = 1e-4);
    }

    #[test]
    fn sideways_palm_is_rotated() {
        let anchors = Anchors::calculate(Resolution::new(192, 192), &[LayerInfo::new(1, 192)]);
        let rect = RotatedRect::letterbox(Resolution::new(192, 192));
        // Fingers pointing to the right.
        let det = decode(
            &anchors[0],
            Resolution::new(192, 192),
            &rect,
            &params([0.0, 0.0], 20.0, [-10.0, 0.0], [10.0, 0.0]),
            0.9,
        );

        assert_abs_diff_eq!(det.angle_radians().abs(), FRAC_PI_2, epsilon = 1e-5);
        let roi = det.hand_roi();
        // Shifted to the right, towards the fingers.
        assert_abs_diff_eq!(roi.center()[0], 106.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.center()[1], 96.0, epsilon = 1e-4);
    }
}
