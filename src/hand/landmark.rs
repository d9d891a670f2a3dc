//! Hand landmark prediction.

use std::path::Path;

use crate::{
    image::{Image, RotatedRect},
    nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork},
};

/// The number of landmarks the hand landmark network estimates.
pub const NUM_LANDMARKS: usize = 21;

/// A 3D landmark position (`[x, y, z]`).
pub type Position = [f32; 3];

/// Names for the hand pose landmarks, in the order the landmark network outputs them.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// The 21 landmarks of one detected hand.
///
/// X and Y are normalized to the source image (`0.0..=1.0` inside the image, Y pointing down), Z
/// is a relative depth estimate on the same scale as X. Instances always hold exactly
/// [`NUM_LANDMARKS`] positions and are immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    positions: [Position; NUM_LANDMARKS],
}

impl HandLandmarks {
    pub fn new(positions: [Position; NUM_LANDMARKS]) -> Self {
        Self { positions }
    }

    /// Creates a landmark set from exactly 63 coordinates (`x0, y0, z0, x1, ...`).
    pub fn from_flat(coords: &[f32]) -> anyhow::Result<Self> {
        anyhow::ensure!(
            coords.len() == NUM_LANDMARKS * 3,
            "expected {} landmark coordinates, got {}",
            NUM_LANDMARKS * 3,
            coords.len(),
        );

        let mut positions = [[0.0; 3]; NUM_LANDMARKS];
        for (out, chunk) in positions.iter_mut().zip(coords.chunks_exact(3)) {
            *out = [chunk[0], chunk[1], chunk[2]];
        }
        Ok(Self { positions })
    }

    /// Returns all positions, indexed by [`LandmarkIdx`].
    pub fn positions(&self) -> &[Position; NUM_LANDMARKS] {
        &self.positions
    }

    pub fn position(&self, idx: LandmarkIdx) -> Position {
        self.positions[idx as usize]
    }

    /// Returns an iterator over all landmark positions, in [`LandmarkIdx`] order.
    pub fn iter(&self) -> impl Iterator<Item = Position> + '_ {
        self.positions.iter().copied()
    }

    fn map_positions(&mut self, f: impl FnMut(Position) -> Position) {
        self.positions = self.positions.map(f);
    }
}

/// The hand landmark network, run on a region of interest found by palm detection.
#[derive(Clone)]
pub struct LandmarkNetwork {
    cnn: Cnn,
    min_presence: f32,
}

impl LandmarkNetwork {
    /// Loads the landmark network from an ONNX file.
    ///
    /// Estimates whose hand presence score is below `min_presence` are discarded.
    pub fn load<P: AsRef<Path>>(path: P, min_presence: f32) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?;
        anyhow::ensure!(
            nn.num_outputs() == 4,
            "hand landmark network has {} outputs, expected 4",
            nn.num_outputs(),
        );
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(0.0..=1.0))?;
        Ok(Self { cnn, min_presence })
    }

    pub fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    /// Runs the network on the part of `image` inside `roi`.
    ///
    /// Returns `Ok(None)` if the network is not confident that `roi` contains a hand.
    pub fn estimate(
        &self,
        image: &Image,
        roi: &RotatedRect,
    ) -> anyhow::Result<Option<HandLandmarks>> {
        let outputs = self.cnn.estimate(image, roi)?;
        anyhow::ensure!(
            outputs.len() == 4,
            "hand landmark network has {} outputs, expected 4",
            outputs.len(),
        );

        let screen = outputs.flat(0, &[1, NUM_LANDMARKS * 3])?;
        let presence = outputs.flat(1, &[1, 1])?[0];
        let handedness = outputs.flat(2, &[1, 1])?[0];
        outputs.flat(3, &[1, NUM_LANDMARKS * 3])?;

        log::trace!("hand presence={presence:.3} handedness={handedness:.3}");
        if presence < self.min_presence {
            return Ok(None);
        }

        let input = self.cnn.input_resolution();
        let (in_w, in_h) = (input.width() as f32, input.height() as f32);
        let (img_w, img_h) = (image.width() as f32, image.height() as f32);

        let mut landmarks = HandLandmarks::from_flat(&screen)?;
        landmarks.map_positions(|[x, y, z]| {
            let [ix, iy] = roi.transform_out(x / in_w, y / in_h);
            [ix / img_w, iy / img_h, z / in_w * roi.width() / img_w]
        });

        Ok(Some(landmarks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmark_indices() {
        assert_eq!(LandmarkIdx::Wrist as usize, 0);
        assert_eq!(LandmarkIdx::MiddleFingerMcp as usize, 9);
        assert_eq!(LandmarkIdx::MiddleFingerTip as usize, 12);
        assert_eq!(LandmarkIdx::PinkyTip as usize, NUM_LANDMARKS - 1);
    }

    #[test]
    fn from_flat_requires_63_values() {
        let coords = (0..63).map(|i| i as f32).collect::<Vec<_>>();
        let hand = HandLandmarks::from_flat(&coords).unwrap();
        assert_eq!(hand.position(LandmarkIdx::Wrist), [0.0, 1.0, 2.0]);
        assert_eq!(hand.position(LandmarkIdx::MiddleFingerTip), [36.0, 37.0, 38.0]);
        assert_eq!(hand.positions().len(), NUM_LANDMARKS);

        assert!(HandLandmarks::from_flat(&coords[..60]).is_err());
        assert!(HandLandmarks::from_flat(&[]).is_err());
    }

    #[test]
    fn new_preserves_order() {
        let mut positions = [[0.0; 3]; NUM_LANDMARKS];
        for (i, pos) in positions.iter_mut().enumerate() {
            *pos = [i as f32, 0.0, 0.0];
        }
        let hand = HandLandmarks::new(positions);
        assert_eq!(hand.positions(), &positions);
    }
}
