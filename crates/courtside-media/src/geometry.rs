//! Pixel-space geometry shared by calibration, detection and tracking.

use serde::{Deserialize, Serialize};

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &PixelPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from center and size.
    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    #[inline]
    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Distance from `point` to the nearest edge; zero inside the box.
    pub fn distance_to_point(&self, point: &PixelPoint) -> f64 {
        let dx = (self.x - point.x).max(point.x - self.x2()).max(0.0);
        let dy = (self.y - point.y).max(point.y - self.y2()).max(0.0);
        (dx * dx + dy * dy).sqrt()
    }

    /// Intersect with the frame; `None` when nothing is left.
    pub fn clip_to(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = self.x2().min(frame_width as f64);
        let y2 = self.y2().min(frame_height as f64);

        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BoundingBox::new(50.0, 50.0, 100.0, 100.0);
        // 2500 / 17500
        assert!((a.iou(&b) - 0.143).abs() < 0.01);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_clip_to_frame() {
        let b = BoundingBox::new(-10.0, 90.0, 50.0, 50.0);
        let clipped = b.clip_to(100, 100).unwrap();
        assert_eq!(clipped, BoundingBox::new(0.0, 90.0, 40.0, 10.0));
        assert!(BoundingBox::new(200.0, 0.0, 5.0, 5.0).clip_to(100, 100).is_none());
    }

    #[test]
    fn test_distance_to_point() {
        let b = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(b.distance_to_point(&PixelPoint::new(15.0, 25.0)), 0.0);
        assert_eq!(b.distance_to_point(&PixelPoint::new(40.0, 20.0)), 10.0);
        assert_eq!(b.distance_to_point(&PixelPoint::new(33.0, 34.0)), 5.0);
    }

    #[test]
    fn test_center() {
        let b = BoundingBox::from_center(50.0, 40.0, 20.0, 10.0);
        assert_eq!(b.x, 40.0);
        assert_eq!(b.center(), PixelPoint::new(50.0, 40.0));
    }
}
