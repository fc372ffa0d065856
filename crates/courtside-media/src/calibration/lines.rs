//! Straight court lines from Canny edges and the probabilistic Hough transform.
//!
//! A painted line produces an edge on each side and usually breaks into
//! several segments, so nearly collinear segments are merged and refitted as
//! one line through their endpoints.

use std::f64::consts::PI;

use image::RgbImage;

use crate::error::MediaResult;

#[cfg(feature = "opencv")]
use crate::error::MediaError;
#[cfg(feature = "opencv")]
use opencv::{
    core::{Mat, Vec4i, Vector},
    imgproc,
    prelude::*,
};

/// A line in normal form: `x cos(theta) + y sin(theta) = rho`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughLine {
    pub rho: f64,
    /// Normal angle in radians, in `[0, pi)`
    pub theta: f64,
    /// Total length of the edge segments behind this line, pixels
    pub support: f64,
}

impl HoughLine {
    /// Angle of the line itself from the horizontal, in degrees `[0, 90]`.
    pub fn tilt_degrees(&self) -> f64 {
        (90.0 - self.theta.to_degrees()).abs()
    }

    /// X coordinate where the line crosses row `y`, if it is not horizontal.
    pub fn x_at(&self, y: f64) -> Option<f64> {
        let (s, c) = self.theta.sin_cos();
        (c.abs() > 1e-9).then(|| (self.rho - y * s) / c)
    }

    /// Y coordinate where the line crosses column `x`, if it is not vertical.
    pub fn y_at(&self, x: f64) -> Option<f64> {
        let (s, c) = self.theta.sin_cos();
        (s.abs() > 1e-9).then(|| (self.rho - x * c) / s)
    }

    /// Unsigned distance from a point to the line.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        let (s, c) = self.theta.sin_cos();
        (x * c + y * s - self.rho).abs()
    }

    pub fn intersect(&self, other: &HoughLine) -> Option<(f64, f64)> {
        let (s1, c1) = self.theta.sin_cos();
        let (s2, c2) = other.theta.sin_cos();
        let det = c1 * s2 - s1 * c2;
        if det.abs() < 1e-6 {
            return None;
        }
        let x = (self.rho * s2 - other.rho * s1) / det;
        let y = (c1 * other.rho - c2 * self.rho) / det;
        Some((x, y))
    }
}

/// An edge segment as returned by the Hough transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: (f64, f64),
    pub end: (f64, f64),
}

impl Segment {
    pub fn new(start: (f64, f64), end: (f64, f64)) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end.0 - self.start.0).hypot(self.end.1 - self.start.1)
    }

    fn midpoint(&self) -> (f64, f64) {
        ((self.start.0 + self.end.0) / 2.0, (self.start.1 + self.end.1) / 2.0)
    }

    /// The infinite line through the segment.
    pub fn line(&self) -> HoughLine {
        let (dx, dy) = (self.end.0 - self.start.0, self.end.1 - self.start.1);
        let theta = dx.atan2(-dy).rem_euclid(PI);
        let (s, c) = theta.sin_cos();
        HoughLine {
            rho: self.start.0 * c + self.start.1 * s,
            theta,
            support: self.length(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LineDetectorParams {
    pub canny_low: f64,
    pub canny_high: f64,
    pub canny_aperture: i32,
    /// Accumulator resolution
    pub rho_step_px: f64,
    pub theta_step_deg: f64,
    /// Accumulator votes and segment length, as fractions of the frame's
    /// shorter side so a downscaled decode behaves like full HD
    pub min_votes_fraction: f64,
    pub min_length_fraction: f64,
    /// Largest gap bridged within one segment
    pub max_gap_px: f64,
    /// Segments closer than this in angle and offset belong to one line
    pub merge_angle_deg: f64,
    pub merge_distance_px: f64,
    pub max_lines: usize,
}

impl Default for LineDetectorParams {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            canny_aperture: 3,
            rho_step_px: 1.0,
            theta_step_deg: 1.0,
            min_votes_fraction: 0.1,
            min_length_fraction: 0.1,
            max_gap_px: 10.0,
            merge_angle_deg: 4.0,
            merge_distance_px: 6.0,
            max_lines: 16,
        }
    }
}

/// Edge segments of `frame`: grayscale, Canny, then `HoughLinesP`.
#[cfg(feature = "opencv")]
pub fn detect_segments(frame: &RgbImage, params: &LineDetectorParams) -> MediaResult<Vec<Segment>> {
    let shorter = frame.width().min(frame.height()) as f64;
    let run = || -> opencv::Result<Vector<Vec4i>> {
        let gray = crate::imaging::gray_mat(frame)?;
        let mut edges = Mat::default();
        imgproc::canny(
            &gray,
            &mut edges,
            params.canny_low,
            params.canny_high,
            params.canny_aperture,
            false,
        )?;

        let mut segments = Vector::<Vec4i>::new();
        imgproc::hough_lines_p(
            &edges,
            &mut segments,
            params.rho_step_px,
            params.theta_step_deg.to_radians(),
            (shorter * params.min_votes_fraction).max(1.0) as i32,
            shorter * params.min_length_fraction,
            params.max_gap_px,
        )?;
        Ok(segments)
    };

    let segments = run().map_err(|e| MediaError::detection_failed(format!("Line detection: {e}")))?;
    Ok(segments
        .iter()
        .map(|s| Segment::new((s[0] as f64, s[1] as f64), (s[2] as f64, s[3] as f64)))
        .collect())
}

#[cfg(not(feature = "opencv"))]
pub fn detect_segments(_frame: &RgbImage, _params: &LineDetectorParams) -> MediaResult<Vec<Segment>> {
    Err(crate::error::MediaError::detection_failed("OpenCV feature not enabled"))
}

/// The strongest straight lines in `frame`.
pub fn detect_lines(frame: &RgbImage, params: &LineDetectorParams) -> MediaResult<Vec<HoughLine>> {
    let segments = detect_segments(frame, params)?;
    Ok(merge_segments(&segments, params))
}

/// Group nearly collinear segments, longest first, and refit each group.
pub fn merge_segments(segments: &[Segment], params: &LineDetectorParams) -> Vec<HoughLine> {
    let mut sorted: Vec<&Segment> = segments.iter().filter(|s| s.length() > 0.0).collect();
    sorted.sort_by(|a, b| b.length().total_cmp(&a.length()));

    let max_angle = params.merge_angle_deg.to_radians();
    // (seed line, members)
    let mut groups: Vec<(HoughLine, Vec<&Segment>)> = Vec::new();
    for segment in sorted {
        let line = segment.line();
        let (mx, my) = segment.midpoint();
        let group = groups.iter_mut().find(|(seed, _)| {
            angle_between(seed.theta, line.theta) <= max_angle
                && seed.distance_to(mx, my) <= params.merge_distance_px
        });
        match group {
            Some((_, members)) => members.push(segment),
            None => groups.push((line, vec![segment])),
        }
    }

    let mut lines: Vec<HoughLine> = groups
        .into_iter()
        .map(|(seed, members)| fit_line(&members).unwrap_or(seed))
        .collect();
    lines.sort_by(|a, b| b.support.total_cmp(&a.support));
    lines.truncate(params.max_lines);
    lines
}

/// Smallest angle between two normal angles in `[0, pi)`.
fn angle_between(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % PI;
    d.min(PI - d)
}

/// Total least squares through the segment endpoints, weighted by length.
fn fit_line(members: &[&Segment]) -> Option<HoughLine> {
    let support: f64 = members.iter().map(|s| s.length()).sum();
    if support <= 0.0 {
        return None;
    }

    let points = || {
        members
            .iter()
            .flat_map(|s| [(s.start, s.length() / 2.0), (s.end, s.length() / 2.0)])
    };
    let mx = points().map(|((x, _), w)| x * w).sum::<f64>() / support;
    let my = points().map(|((_, y), w)| y * w).sum::<f64>() / support;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for ((x, y), w) in points() {
        let (dx, dy) = (x - mx, y - my);
        sxx += w * dx * dx;
        syy += w * dy * dy;
        sxy += w * dx * dy;
    }

    let direction = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let theta = (direction + PI / 2.0).rem_euclid(PI);
    let (s, c) = theta.sin_cos();
    Some(HoughLine {
        rho: mx * c + my * s,
        theta,
        support,
    })
}

/// Lines split by orientation.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedLines {
    /// Baselines and service lines, sorted top to bottom
    pub horizontal: Vec<HoughLine>,
    /// Sidelines and the centre service line
    pub lateral: Vec<HoughLine>,
}

/// Horizontal lines tilt at most `horizontal_tilt_deg`; lateral lines at least `lateral_tilt_deg`.
pub fn classify_lines(
    lines: &[HoughLine],
    horizontal_tilt_deg: f64,
    lateral_tilt_deg: f64,
    frame_width: f64,
) -> ClassifiedLines {
    let mut out = ClassifiedLines::default();
    for line in lines {
        let tilt = line.tilt_degrees();
        if tilt <= horizontal_tilt_deg {
            out.horizontal.push(*line);
        } else if tilt >= lateral_tilt_deg {
            out.lateral.push(*line);
        }
    }

    let mid_x = frame_width / 2.0;
    out.horizontal
        .sort_by(|a, b| a.y_at(mid_x).unwrap_or(0.0).total_cmp(&b.y_at(mid_x).unwrap_or(0.0)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_normal_form() {
        let horizontal = Segment::new((0.0, 40.0), (199.0, 40.0)).line();
        assert!((horizontal.theta - PI / 2.0).abs() < 1e-9);
        assert!((horizontal.rho - 40.0).abs() < 1e-9);

        let vertical = Segment::new((120.0, 0.0), (120.0, 149.0)).line();
        assert!(vertical.theta.abs() < 1e-9);
        assert!((vertical.rho - 120.0).abs() < 1e-9);
        assert_eq!(vertical.tilt_degrees(), 90.0);
    }

    #[test]
    fn test_merges_both_edges_of_a_painted_line() {
        // Edges 3 px apart, the upper one broken in two.
        let segments = [
            Segment::new((10.0, 58.5), (120.0, 58.5)),
            Segment::new((130.0, 58.5), (300.0, 58.5)),
            Segment::new((10.0, 61.5), (300.0, 61.5)),
            Segment::new((150.0, 10.0), (150.0, 200.0)),
        ];
        let lines = merge_segments(&segments, &LineDetectorParams::default());
        let classified = classify_lines(&lines, 20.0, 25.0, 320.0);

        assert_eq!(classified.horizontal.len(), 1);
        let baseline = classified.horizontal[0];
        assert!((baseline.y_at(160.0).unwrap() - 60.0).abs() < 0.5);
        assert!((baseline.support - 570.0).abs() < 1e-6);
        assert_eq!(classified.lateral.len(), 1);
        assert!((classified.lateral[0].x_at(100.0).unwrap() - 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_keeps_parallel_lines_apart() {
        let segments = [
            Segment::new((0.0, 60.0), (300.0, 60.0)),
            Segment::new((0.0, 110.0), (300.0, 110.0)),
        ];
        let lines = merge_segments(&segments, &LineDetectorParams::default());
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_merges_across_the_angle_wrap() {
        // Normals just either side of 0 and pi describe nearly the same line.
        let segments = [
            Segment::new((100.0, 0.0), (102.0, 200.0)),
            Segment::new((102.0, 0.0), (100.0, 200.0)),
        ];
        let lines = merge_segments(&segments, &LineDetectorParams::default());
        assert_eq!(lines.len(), 1);
        assert!((lines[0].x_at(100.0).unwrap() - 101.0).abs() < 0.5);
    }

    #[test]
    fn test_intersection() {
        let h = HoughLine {
            rho: 50.0,
            theta: PI / 2.0,
            support: 1.0,
        };
        let v = HoughLine {
            rho: 30.0,
            theta: 0.0,
            support: 1.0,
        };
        let (x, y) = h.intersect(&v).unwrap();
        assert!((x - 30.0).abs() < 1e-9);
        assert!((y - 50.0).abs() < 1e-9);
        assert!(h.intersect(&h).is_none());
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_detects_painted_lines() {
        use image::Rgb;

        let mut img = RgbImage::from_pixel(200, 150, Rgb([40, 90, 40]));
        for x in 0..200 {
            for y in 39..=41 {
                img.put_pixel(x, y, Rgb([240, 240, 240]));
            }
        }
        for y in 0..150 {
            for x in 119..=121 {
                img.put_pixel(x, y, Rgb([240, 240, 240]));
            }
        }

        let lines = detect_lines(&img, &LineDetectorParams::default()).unwrap();
        let classified = classify_lines(&lines, 20.0, 25.0, 200.0);
        assert!(classified
            .horizontal
            .iter()
            .any(|l| (l.y_at(60.0).unwrap() - 40.0).abs() < 2.0));
        assert!(classified
            .lateral
            .iter()
            .any(|l| (l.x_at(100.0).unwrap() - 120.0).abs() < 2.0));
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_blank_frame_has_no_lines() {
        let img = RgbImage::from_pixel(50, 50, image::Rgb([40, 90, 40]));
        assert!(detect_lines(&img, &LineDetectorParams::default()).unwrap().is_empty());
    }
}
