use nalgebra::{Rotation2, Vector2};

use super::Resolution;

/// A rectangle in image coordinates, rotated clockwise around its center.
///
/// Coordinates are continuous pixel coordinates with Y pointing down, so a positive rotation
/// turns the rectangle clockwise on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    center: Vector2<f32>,
    width: f32,
    height: f32,
    radians: f32,
}

impl RotatedRect {
    /// Creates a rectangle of the given size around `(x_center, y_center)`, rotated by `radians`.
    pub fn new(x_center: f32, y_center: f32, width: f32, height: f32, radians: f32) -> Self {
        Self {
            center: Vector2::new(x_center, y_center),
            width,
            height,
            radians,
        }
    }

    /// Returns the smallest unrotated square that contains an image of resolution `res`, centered
    /// on that image.
    ///
    /// Viewing an image through this rectangle adds black bars to the shorter side.
    pub fn letterbox(res: Resolution) -> Self {
        let (w, h) = (res.width() as f32, res.height() as f32);
        let side = w.max(h);
        Self::new(w / 2.0, h / 2.0, side, side, 0.0)
    }

    #[inline]
    pub fn center(&self) -> [f32; 2] {
        [self.center.x, self.center.y]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Maps relative coordinates inside of this rectangle to image coordinates.
    ///
    /// `(0.0, 0.0)` is the rectangle's (rotated) top left corner and `(1.0, 1.0)` is its bottom
    /// right corner.
    pub fn transform_out(&self, u: f32, v: f32) -> [f32; 2] {
        let local = Vector2::new((u - 0.5) * self.width, (v - 0.5) * self.height);
        let out = self.center + Rotation2::new(self.radians) * local;
        [out.x, out.y]
    }

    /// Moves the center by `(dx, dy)` given in the rectangle's own, rotated coordinate system.
    pub fn shift_local(&self, dx: f32, dy: f32) -> Self {
        let offset = Rotation2::new(self.radians) * Vector2::new(dx, dy);
        Self {
            center: self.center + offset,
            ..*self
        }
    }

    /// Turns the rectangle into a square whose side is the longer side of `self`, scaled by
    /// `scale`.
    pub fn square_scaled(&self, scale: f32) -> Self {
        let side = self.width.max(self.height) * scale;
        Self {
            width: side,
            height: side,
            ..*self
        }
    }
}
