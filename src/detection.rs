//! Anchor generation and score decoding for Single Shot MultiBox Detectors (SSDs).
//!
//! Only the subset needed by the palm detector is implemented: square anchors of fixed size, so
//! each anchor is just a center point. Offsets predicted by the network are relative to that
//! center.

use std::ops::Index;

use crate::image::Resolution;

/// Applies the standard sigmoid/logistic function to the input.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// An anchor of an SSD network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    // both range from 0 to 1
    x_center: f32,
    y_center: f32,
}

impl Anchor {
    pub fn x_center(&self) -> f32 {
        self.x_center
    }

    pub fn y_center(&self) -> f32 {
        self.y_center
    }
}

/// Describes an output layer of an SSD network.
#[derive(Debug, Clone, Copy)]
pub struct LayerInfo {
    /// Number of anchors per feature map cell. Must be non-zero.
    boxes_per_cell: u32,
    /// Downscaling factor between the network input and this layer's feature map.
    stride: u32,
}

impl LayerInfo {
    /// Creates a new SSD layer description.
    ///
    /// # Parameters
    ///
    /// - `boxes_per_cell`: the number of boxes associated with each cell in this feature map.
    /// - `stride`: how many input pixels one feature map cell covers along each axis.
    pub fn new(boxes_per_cell: u32, stride: u32) -> Self {
        assert_ne!(boxes_per_cell, 0);
        assert_ne!(stride, 0);
        Self {
            boxes_per_cell,
            stride,
        }
    }

    fn feature_map(&self, input: Resolution) -> Resolution {
        Resolution::new(input.width() / self.stride, input.height() / self.stride)
    }
}

/// The set of anchors of one SSD network, in output order.
#[derive(Debug, Clone)]
pub struct Anchors {
    anchors: Vec<Anchor>,
}

impl Anchors {
    /// Computes the anchors of a network with the given input resolution and output layers.
    ///
    /// Every cell of every layer contributes `boxes_per_cell` anchors sharing the cell's center.
    pub fn calculate(input: Resolution, layers: &[LayerInfo]) -> Self {
        let mut anchors = Vec::new();

        for layer in layers {
            let map = layer.feature_map(input);
            let (width, height) = (map.width(), map.height());

            for y in 0..height {
                for x in 0..width {
                    let anchor = Anchor {
                        x_center: (x as f32 + 0.5) / width as f32,
                        y_center: (y as f32 + 0.5) / height as f32,
                    };
                    anchors.extend((0..layer.boxes_per_cell).map(|_| anchor));
                }
            }
        }

        Self { anchors }
    }

    /// Returns the total number of SSD anchors/priors.
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

impl Index<usize> for Anchors {
    type Output = Anchor;

    fn index(&self, index: usize) -> &Anchor {
        &self.anchors[index]
    }
}
