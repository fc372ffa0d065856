//! Pixel to court-meter calibration from a single frame.
//!
//! Canny edges feed the probabilistic Hough transform, the resulting segments
//! are merged into lines, and the outermost horizontal and lateral lines are
//! taken as the baselines and singles sidelines. Their intersections give the four court
//! corners. Service lines and the centre line, when found, add correspondences
//! before the final least-squares fit. Any failure falls back to a fixed inset
//! quadrilateral flagged as low confidence.

use image::RgbImage;
use tracing::{debug, info, warn};

use courtside_models::{court, CalibrationSummary, CourtPosition};

use super::homography::Homography;
use super::lines::{classify_lines, detect_lines, HoughLine, LineDetectorParams};
use crate::geometry::PixelPoint;

/// Court corners in meters: far-left, far-right, near-right, near-left.
const COURT_CORNERS_M: [(f64, f64); 4] = [
    (0.0, 0.0),
    (court::WIDTH_M, 0.0),
    (court::WIDTH_M, court::LENGTH_M),
    (0.0, court::LENGTH_M),
];

#[derive(Debug, Clone)]
pub struct CalibratorConfig {
    pub lines: LineDetectorParams,
    /// Maximum tilt from horizontal for baselines and service lines (degrees)
    pub horizontal_tilt_deg: f64,
    /// Minimum tilt from horizontal for sidelines (degrees)
    pub lateral_tilt_deg: f64,
    /// Minimum baseline and sideline separation as a fraction of the frame
    pub min_span_fraction: f64,
    /// Minimum court quadrilateral area as a fraction of the frame
    pub min_area_fraction: f64,
    /// Tolerance in meters when matching inner lines to service/centre lines
    pub inner_line_tolerance_m: f64,
    /// Inset of the fallback quadrilateral from each frame edge
    pub default_inset: f64,
    /// Meters per pixel used with the fallback quadrilateral
    pub default_pixel_to_meter: f64,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            lines: LineDetectorParams::default(),
            horizontal_tilt_deg: 20.0,
            lateral_tilt_deg: 25.0,
            min_span_fraction: 0.2,
            min_area_fraction: 0.05,
            inner_line_tolerance_m: 1.0,
            default_inset: 0.10,
            default_pixel_to_meter: 0.05,
        }
    }
}

/// Mapping from pixel space to court meters for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct CourtCalibration {
    homography: Homography,
    corners: [PixelPoint; 4],
    pixel_to_meter: f64,
    court_center: PixelPoint,
    low_confidence: bool,
}

impl CourtCalibration {
    /// The degraded calibration used when no court geometry is found.
    pub fn fallback(width: u32, height: u32, config: &CalibratorConfig) -> Self {
        let (w, h) = (width.max(1) as f64, height.max(1) as f64);
        let inset = config.default_inset.clamp(0.0, 0.45);
        let corners = [
            PixelPoint::new(w * inset, h * inset),
            PixelPoint::new(w * (1.0 - inset), h * inset),
            PixelPoint::new(w * (1.0 - inset), h * (1.0 - inset)),
            PixelPoint::new(w * inset, h * (1.0 - inset)),
        ];
        let scale = config.default_pixel_to_meter;
        let homography = Homography::fit(&corners.map(|c| (c.x, c.y)), &COURT_CORNERS_M)
            .unwrap_or_else(|| {
                Homography::from_rows([[scale, 0.0, 0.0], [0.0, scale, 0.0], [0.0, 0.0, 1.0]])
            });

        Self {
            homography,
            corners,
            pixel_to_meter: scale,
            court_center: PixelPoint::new(w / 2.0, h / 2.0),
            low_confidence: true,
        }
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    pub fn corners(&self) -> &[PixelPoint; 4] {
        &self.corners
    }

    /// Approximate meters per pixel, always positive.
    pub fn pixel_to_meter(&self) -> f64 {
        self.pixel_to_meter
    }

    pub fn court_center(&self) -> PixelPoint {
        self.court_center
    }

    pub fn is_low_confidence(&self) -> bool {
        self.low_confidence
    }

    /// Project a pixel onto the court plane.
    pub fn pixel_to_court(&self, point: &PixelPoint) -> Option<CourtPosition> {
        self.homography
            .project(point.x, point.y)
            .map(|(x, y)| CourtPosition(x, y))
    }

    /// Project a court position back into the frame.
    pub fn court_to_pixel(&self, position: &CourtPosition) -> Option<PixelPoint> {
        self.homography
            .inverse()?
            .project(position.x(), position.y())
            .map(|(x, y)| PixelPoint::new(x, y))
    }

    pub fn summary(&self) -> CalibrationSummary {
        CalibrationSummary {
            pixel_to_meter: self.pixel_to_meter,
            corners: self.corners.map(|c| [c.x, c.y]),
            court_center: [self.court_center.x, self.court_center.y],
            low_confidence: self.low_confidence,
        }
    }
}

/// Derives a [`CourtCalibration`] from a representative frame.
#[derive(Debug, Clone, Default)]
pub struct CourtCalibrator {
    config: CalibratorConfig,
}

impl CourtCalibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    /// Calibrate against `frame`. Never fails: missing or degenerate court
    /// geometry yields the low-confidence fallback.
    pub fn calibrate(&self, frame: &RgbImage) -> CourtCalibration {
        let (width, height) = frame.dimensions();
        match self.detect(frame) {
            Some(calibration) => {
                info!(
                    pixel_to_meter = calibration.pixel_to_meter,
                    "Court calibrated from line geometry"
                );
                calibration
            }
            None => {
                warn!(width, height, "Court lines not found, using default calibration");
                CourtCalibration::fallback(width, height, &self.config)
            }
        }
    }

    fn detect(&self, frame: &RgbImage) -> Option<CourtCalibration> {
        let (width, height) = frame.dimensions();
        if width < 16 || height < 16 {
            return None;
        }
        let (w, h) = (width as f64, height as f64);

        let lines = match detect_lines(frame, &self.config.lines) {
            Ok(lines) => lines,
            Err(e) => {
                debug!(error = %e, "Court line detection unavailable");
                return None;
            }
        };
        let classified = classify_lines(
            &lines,
            self.config.horizontal_tilt_deg,
            self.config.lateral_tilt_deg,
            w,
        );
        debug!(
            lines = lines.len(),
            horizontal = classified.horizontal.len(),
            lateral = classified.lateral.len(),
            "Court line candidates"
        );

        let far = *classified.horizontal.first()?;
        let near = *classified.horizontal.last()?;
        let (far_y, near_y) = (far.y_at(w / 2.0)?, near.y_at(w / 2.0)?);
        if near_y - far_y < self.config.min_span_fraction * h {
            return None;
        }

        let mid_y = (far_y + near_y) / 2.0;
        let mut lateral: Vec<(f64, HoughLine)> = classified
            .lateral
            .iter()
            .filter_map(|l| l.x_at(mid_y).map(|x| (x, *l)))
            .collect();
        lateral.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (left_x, left) = *lateral.first()?;
        let (right_x, right) = *lateral.last()?;
        if right_x - left_x < self.config.min_span_fraction * w {
            return None;
        }

        let corners = [
            far.intersect(&left)?,
            far.intersect(&right)?,
            near.intersect(&right)?,
            near.intersect(&left)?,
        ];
        if !self.is_plausible_quad(&corners, w, h) {
            debug!(?corners, "Rejected court quadrilateral");
            return None;
        }

        let mut src: Vec<(f64, f64)> = corners.to_vec();
        let mut dst: Vec<(f64, f64)> = COURT_CORNERS_M.to_vec();
        let initial = Homography::fit(&src, &dst)?;

        // Inner lines refine the fit when they sit where the court model expects them.
        let inner: Vec<&HoughLine> = classified.horizontal[1..classified.horizontal.len() - 1]
            .iter()
            .collect();
        let mut service_lines = Vec::new();
        for target_y in [court::far_service_line_y(), court::near_service_line_y()] {
            let matched = inner.iter().find_map(|line| {
                let a = line.intersect(&left)?;
                let b = line.intersect(&right)?;
                let (_, ya) = initial.project(a.0, a.1)?;
                let (_, yb) = initial.project(b.0, b.1)?;
                let tol = self.config.inner_line_tolerance_m;
                ((ya - target_y).abs() < tol && (yb - target_y).abs() < tol).then_some((a, b, **line))
            });
            if let Some((a, b, line)) = matched {
                src.extend([a, b]);
                dst.extend([(0.0, target_y), (court::WIDTH_M, target_y)]);
                service_lines.push((line, target_y));
            }
        }

        let centre = lateral[1..lateral.len() - 1].iter().find_map(|(_, line)| {
            let (sx, sy) = far.intersect(line).or_else(|| near.intersect(line))?;
            let (cx, _) = initial.project(sx, sy)?;
            ((cx - court::CENTER_X_M).abs() < self.config.inner_line_tolerance_m).then_some(*line)
        });
        if let Some(centre) = centre {
            for (service, y) in &service_lines {
                if let Some(p) = centre.intersect(service) {
                    src.push(p);
                    dst.push((court::CENTER_X_M, *y));
                }
            }
        }

        let homography = if src.len() > 4 {
            Homography::fit(&src, &dst).unwrap_or(initial)
        } else {
            initial
        };
        debug!(correspondences = src.len(), "Fitted court homography");

        let corner_points = corners.map(|(x, y)| PixelPoint::new(x, y));
        let top = corner_points[0].distance_to(&corner_points[1]);
        let bottom = corner_points[3].distance_to(&corner_points[2]);
        let pixel_to_meter = court::WIDTH_M / ((top + bottom) / 2.0);
        if !(pixel_to_meter.is_finite() && pixel_to_meter > 0.0) {
            return None;
        }

        let court_center = homography
            .inverse()
            .and_then(|inv| inv.project(court::CENTER_X_M, court::NET_Y_M))
            .map(|(x, y)| PixelPoint::new(x, y))
            .unwrap_or_else(|| {
                let n = corner_points.len() as f64;
                PixelPoint::new(
                    corner_points.iter().map(|c| c.x).sum::<f64>() / n,
                    corner_points.iter().map(|c| c.y).sum::<f64>() / n,
                )
            });

        Some(CourtCalibration {
            homography,
            corners: corner_points,
            pixel_to_meter,
            court_center,
            low_confidence: false,
        })
    }

    /// Convex, large enough, and not far outside the frame.
    fn is_plausible_quad(&self, corners: &[(f64, f64); 4], w: f64, h: f64) -> bool {
        let margin = 0.25;
        let inside = corners.iter().all(|&(x, y)| {
            x >= -margin * w && x <= (1.0 + margin) * w && y >= -margin * h && y <= (1.0 + margin) * h
        });

        let crosses: Vec<f64> = (0..4)
            .map(|i| {
                let a = corners[i];
                let b = corners[(i + 1) % 4];
                let c = corners[(i + 2) % 4];
                (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0)
            })
            .collect();
        let convex = crosses.iter().all(|c| *c > 0.0) || crosses.iter().all(|c| *c < 0.0);

        let area = 0.5
            * (0..4)
                .map(|i| {
                    let (a, b) = (corners[i], corners[(i + 1) % 4]);
                    a.0 * b.1 - b.0 * a.1
                })
                .sum::<f64>()
                .abs();

        inside && convex && area >= self.config.min_area_fraction * w * h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const W: u32 = 640;
    const H: u32 = 360;
    #[cfg(feature = "opencv")]
    const PIXEL_CORNERS: [(f64, f64); 4] = [(220.0, 60.0), (420.0, 60.0), (560.0, 330.0), (80.0, 330.0)];

    #[cfg(feature = "opencv")]
    fn draw_segment(img: &mut RgbImage, a: (f64, f64), b: (f64, f64)) {
        let steps = (((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt() * 2.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps.max(1) as f64;
            let (x, y) = (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (px, py) = (x.round() as i64 + dx, y.round() as i64 + dy);
                    if px >= 0 && py >= 0 && (px as u32) < W && (py as u32) < H {
                        img.put_pixel(px as u32, py as u32, Rgb([240, 240, 240]));
                    }
                }
            }
        }
    }

    /// Render singles court lines under a known perspective.
    #[cfg(feature = "opencv")]
    fn synthetic_court() -> (RgbImage, Homography) {
        let court_to_pixel = Homography::fit(&COURT_CORNERS_M, &PIXEL_CORNERS).unwrap();
        let p = |x: f64, y: f64| court_to_pixel.project(x, y).unwrap();
        let mut img = RgbImage::from_pixel(W, H, Rgb([40, 90, 40]));

        let (fw, fl) = (court::WIDTH_M, court::LENGTH_M);
        let (s1, s2) = (court::far_service_line_y(), court::near_service_line_y());
        let segments = [
            ((0.0, 0.0), (fw, 0.0)),
            ((0.0, fl), (fw, fl)),
            ((0.0, 0.0), (0.0, fl)),
            ((fw, 0.0), (fw, fl)),
            ((0.0, s1), (fw, s1)),
            ((0.0, s2), (fw, s2)),
            ((court::CENTER_X_M, s1), (court::CENTER_X_M, s2)),
        ];
        for (a, b) in segments {
            draw_segment(&mut img, p(a.0, a.1), p(b.0, b.1));
        }
        (img, court_to_pixel)
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_calibrates_synthetic_court() {
        let (img, _) = synthetic_court();
        let calibration = CourtCalibrator::default().calibrate(&img);

        assert!(!calibration.is_low_confidence());
        for (found, expected) in calibration.corners().iter().zip(PIXEL_CORNERS) {
            assert!(
                found.distance_to(&PixelPoint::new(expected.0, expected.1)) < 6.0,
                "corner {:?} vs {:?}",
                found,
                expected
            );
        }
        assert!(calibration.pixel_to_meter() > 0.0);
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_projection_lands_on_court_model() {
        let (img, court_to_pixel) = synthetic_court();
        let calibration = CourtCalibrator::default().calibrate(&img);

        let (px, py) = court_to_pixel
            .project(court::CENTER_X_M, court::near_service_line_y())
            .unwrap();
        let pos = calibration.pixel_to_court(&PixelPoint::new(px, py)).unwrap();
        assert!((pos.x() - court::CENTER_X_M).abs() < 0.5);
        assert!((pos.y() - court::near_service_line_y()).abs() < 0.5);
    }

    #[test]
    fn test_blank_frame_falls_back() {
        let img = RgbImage::from_pixel(W, H, Rgb([40, 90, 40]));
        let calibration = CourtCalibrator::default().calibrate(&img);

        assert!(calibration.is_low_confidence());
        assert_eq!(calibration.pixel_to_meter(), 0.05);
        assert_eq!(calibration.corners()[0], PixelPoint::new(64.0, 36.0));
        assert_eq!(calibration.corners()[2], PixelPoint::new(576.0, 324.0));

        let far_left = calibration.pixel_to_court(&PixelPoint::new(64.0, 36.0)).unwrap();
        assert!(far_left.x().abs() < 1e-6 && far_left.y().abs() < 1e-6);
    }

    #[test]
    fn test_summary_round_trips_court_to_pixel() {
        let calibration = CourtCalibration::fallback(100, 100, &CalibratorConfig::default());
        let summary = calibration.summary();
        assert!(summary.low_confidence);
        assert_eq!(summary.corners[1], [90.0, 10.0]);

        let pixel = calibration
            .court_to_pixel(&CourtPosition(court::WIDTH_M, court::LENGTH_M))
            .unwrap();
        assert!(pixel.distance_to(&PixelPoint::new(90.0, 90.0)) < 1e-6);
    }
}
