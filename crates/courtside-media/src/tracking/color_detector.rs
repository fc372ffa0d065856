//! Ball fallback when the object detector finds nothing: small, near-circular
//! blobs in tennis-ball colors.
//!
//! Optic yellow and white are thresholded in HSV, cleaned with a 3x3 opening
//! and closing, and the external contours scored by circularity
//! `4 pi area / perimeter^2`. Without OpenCV the fallback never fires.

use image::RgbImage;

use crate::geometry::PixelPoint;

#[cfg(feature = "opencv")]
use opencv::{
    core::{self, Mat, Point, Point2f, Scalar, Size, Vector},
    imgproc,
    prelude::*,
};
#[cfg(feature = "opencv")]
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ColorDetectorConfig {
    /// Optic yellow hue band in degrees
    pub yellow_hue: (f64, f64),
    /// Saturation and value bounds in `[0, 1]`
    pub yellow_min_saturation: f64,
    pub yellow_min_value: f64,
    pub white_max_saturation: f64,
    pub white_min_value: f64,
    /// Accepted contour area in pixels
    pub min_area: f64,
    pub max_area: f64,
    pub min_circularity: f64,
}

impl Default for ColorDetectorConfig {
    fn default() -> Self {
        Self {
            yellow_hue: (40.0, 60.0),
            yellow_min_saturation: 100.0 / 255.0,
            yellow_min_value: 100.0 / 255.0,
            white_max_saturation: 30.0 / 255.0,
            white_min_value: 200.0 / 255.0,
            min_area: 10.0,
            max_area: 500.0,
            min_circularity: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColorBallDetector {
    config: ColorDetectorConfig,
}

impl ColorBallDetector {
    pub fn new(config: ColorDetectorConfig) -> Self {
        Self { config }
    }

    /// Most circular ball-colored blob, with its circularity as confidence.
    #[cfg(feature = "opencv")]
    pub fn detect(&self, frame: &RgbImage) -> Option<(PixelPoint, f64)> {
        match self.find_ball(frame) {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "Color ball detection failed");
                None
            }
        }
    }

    #[cfg(not(feature = "opencv"))]
    pub fn detect(&self, _frame: &RgbImage) -> Option<(PixelPoint, f64)> {
        None
    }

    #[cfg(feature = "opencv")]
    fn find_ball(&self, frame: &RgbImage) -> opencv::Result<Option<(PixelPoint, f64)>> {
        let mask = self.ball_mask(frame)?;
        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours_def(
            &mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
        )?;

        let c = &self.config;
        let mut best: Option<(f64, f64, Vector<Point>)> = None;
        for contour in contours {
            let area = imgproc::contour_area_def(&contour)?;
            if area < c.min_area || area > c.max_area {
                continue;
            }
            let perimeter = imgproc::arc_length(&contour, true)?;
            if perimeter <= 0.0 {
                continue;
            }
            let circularity = 4.0 * std::f64::consts::PI * area / (perimeter * perimeter);
            if circularity <= c.min_circularity {
                continue;
            }
            let better = best.as_ref().map_or(true, |(bc, ba, _)| {
                circularity > *bc || (circularity == *bc && area > *ba)
            });
            if better {
                best = Some((circularity, area, contour));
            }
        }

        let Some((circularity, _, contour)) = best else {
            return Ok(None);
        };
        let mut center = Point2f::default();
        let mut radius = 0.0f32;
        imgproc::min_enclosing_circle(&contour, &mut center, &mut radius)?;
        Ok(Some((
            PixelPoint::new(center.x as f64, center.y as f64),
            circularity.min(1.0),
        )))
    }

    /// Yellow or white pixels after a 3x3 opening then closing.
    #[cfg(feature = "opencv")]
    fn ball_mask(&self, frame: &RgbImage) -> opencv::Result<Mat> {
        let c = &self.config;
        let hsv = crate::imaging::hsv_mat(frame)?;
        // 8-bit HSV stores hue in half degrees
        let byte = |v: f64| (v * 255.0).round().clamp(0.0, 255.0);

        let yellow_low = Scalar::new(
            c.yellow_hue.0 / 2.0,
            byte(c.yellow_min_saturation),
            byte(c.yellow_min_value),
            0.0,
        );
        let yellow_high = Scalar::new(c.yellow_hue.1 / 2.0, 255.0, 255.0, 0.0);
        let white_low = Scalar::new(0.0, 0.0, byte(c.white_min_value), 0.0);
        let white_high = Scalar::new(180.0, byte(c.white_max_saturation), 255.0, 0.0);

        let mut yellow = Mat::default();
        core::in_range(&hsv, &yellow_low, &yellow_high, &mut yellow)?;
        let mut white = Mat::default();
        core::in_range(&hsv, &white_low, &white_high, &mut white)?;
        let mut mask = Mat::default();
        core::bitwise_or_def(&yellow, &white, &mut mask)?;

        let kernel = imgproc::get_structuring_element_def(imgproc::MORPH_RECT, Size::new(3, 3))?;
        let mut opened = Mat::default();
        imgproc::morphology_ex_def(&mask, &mut opened, imgproc::MORPH_OPEN, &kernel)?;
        let mut closed = Mat::default();
        imgproc::morphology_ex_def(&opened, &mut closed, imgproc::MORPH_CLOSE, &kernel)?;
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn draw_disc(img: &mut RgbImage, cx: f64, cy: f64, r: f64, color: Rgb<u8>) {
        for y in 0..img.height() {
            for x in 0..img.width() {
                if ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt() <= r {
                    img.put_pixel(x, y, color);
                }
            }
        }
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_finds_yellow_ball() {
        let mut img = RgbImage::from_pixel(120, 80, Rgb([30, 80, 160]));
        draw_disc(&mut img, 70.0, 30.0, 4.0, Rgb([230, 220, 40]));

        let (center, confidence) = ColorBallDetector::default().detect(&img).unwrap();
        assert!((center.x - 70.0).abs() < 1.0);
        assert!((center.y - 30.0).abs() < 1.0);
        assert!(confidence > 0.5);
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_ignores_lines_and_large_areas() {
        let mut img = RgbImage::from_pixel(120, 80, Rgb([30, 80, 160]));
        // White court line
        for x in 0..120 {
            for y in 50..53 {
                img.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        // Large yellow board
        draw_disc(&mut img, 30.0, 20.0, 15.0, Rgb([230, 220, 40]));

        assert!(ColorBallDetector::default().detect(&img).is_none());
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_without_opencv_never_fires() {
        let mut img = RgbImage::from_pixel(120, 80, Rgb([30, 80, 160]));
        draw_disc(&mut img, 70.0, 30.0, 4.0, Rgb([230, 220, 40]));
        assert!(ColorBallDetector::default().detect(&img).is_none());
    }
}
