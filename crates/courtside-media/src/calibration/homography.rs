//! Planar projective transforms fitted with the normalized direct linear
//! transform.

use nalgebra::{DMatrix, Matrix3, Vector3};

/// A 3x3 projective transform acting on `(x, y, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn identity() -> Homography {
        Homography(Matrix3::identity())
    }

    /// Build from a row-major array.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Homography {
        Homography(Matrix3::from_fn(|r, c| rows[r][c]))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Fit the transform mapping each `src[i]` onto `dst[i]`.
    ///
    /// Both point sets are conditioned to zero mean and sqrt(2) mean distance,
    /// then `h` is the right singular vector of the stacked DLT system with
    /// the smallest singular value, so more than four correspondences are
    /// averaged. Returns `None` for fewer than four pairs or a degenerate
    /// configuration.
    pub fn fit(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Homography> {
        if src.len() < 4 || src.len() != dst.len() {
            return None;
        }

        let (src_n, src_t) = normalize(src)?;
        let (dst_n, dst_t) = normalize(dst)?;
        if !spans_plane(&src_n) || !spans_plane(&dst_n) {
            return None;
        }

        // Four pairs give eight rows; zero rows keep the null vector in a
        // thin SVD.
        let rows = (2 * src_n.len()).max(9);
        let mut a = DMatrix::<f64>::zeros(rows, 9);
        for (i, (&(x, y), &(u, v))) in src_n.iter().zip(&dst_n).enumerate() {
            let r = 2 * i;
            a.row_mut(r)
                .copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]);
            a.row_mut(r + 1)
                .copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
        }

        let svd = a.svd(false, true);
        let v_t = svd.v_t?;
        let h = v_t.row(svd.singular_values.imin());
        let normalized = Matrix3::from_fn(|r, c| h[3 * r + c]);

        // Undo the conditioning: H = T_dst^-1 * Hn * T_src
        let result = dst_t.try_inverse()? * normalized * src_t;
        Homography(result).normalized()
    }

    /// Map a point through the transform. `None` when it lands at infinity.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let p = self.0 * Vector3::new(x, y, 1.0);
        if p.z.abs() < 1e-12 {
            return None;
        }
        let (px, py) = (p.x / p.z, p.y / p.z);
        (px.is_finite() && py.is_finite()).then_some((px, py))
    }

    pub fn inverse(&self) -> Option<Homography> {
        if self.0.determinant().abs() < 1e-12 {
            return None;
        }
        self.0.try_inverse().map(Homography)
    }

    /// Scale so that `h33 == 1`.
    fn normalized(&self) -> Option<Homography> {
        let s = self.0[(2, 2)];
        if s.abs() < 1e-12 {
            return None;
        }
        let out = self.0 / s;
        (out.iter().all(|v| v.is_finite()) && out.determinant().abs() > 1e-12)
            .then_some(Homography(out))
    }
}

/// Translate to the centroid and scale to a mean distance of sqrt(2).
fn normalize(points: &[(f64, f64)]) -> Option<(Vec<(f64, f64)>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.0 - cx).hypot(p.1 - cy))
        .sum::<f64>()
        / n;
    if mean_dist < 1e-9 {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    #[rustfmt::skip]
    let transform = Matrix3::new(
        s, 0.0, -s * cx,
        0.0, s, -s * cy,
        0.0, 0.0, 1.0,
    );
    let normalized = points
        .iter()
        .map(|p| (s * (p.0 - cx), s * (p.1 - cy)))
        .collect();
    Some((normalized, transform))
}

/// Whether some three of the (normalized) points are clearly not collinear.
fn spans_plane(points: &[(f64, f64)]) -> bool {
    let n = points.len();
    (0..n).any(|i| {
        (i + 1..n).any(|j| {
            (j + 1..n).any(|k| {
                let (a, b, c) = (points[i], points[j], points[k]);
                let cross = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
                cross.abs() > 1e-3
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: (f64, f64), b: (f64, f64), tol: f64) {
        assert!(
            (a.0 - b.0).abs() < tol && (a.1 - b.1).abs() < tol,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_fit_recovers_known_transform() {
        let truth = Homography::from_rows([
            [0.8, 0.1, 20.0],
            [-0.05, 1.1, 5.0],
            [0.0004, 0.0002, 1.0],
        ]);
        let src = [(0.0, 0.0), (100.0, 0.0), (100.0, 80.0), (0.0, 80.0), (50.0, 40.0)];
        let dst: Vec<_> = src.iter().map(|&(x, y)| truth.project(x, y).unwrap()).collect();

        let fitted = Homography::fit(&src, &dst).unwrap();
        for &(x, y) in &src {
            assert_close(fitted.project(x, y).unwrap(), truth.project(x, y).unwrap(), 1e-6);
        }
        assert_close(fitted.project(30.0, 70.0).unwrap(), truth.project(30.0, 70.0).unwrap(), 1e-6);
        assert!((fitted.matrix()[(2, 2)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_from_exactly_four_points() {
        // Court corners in meters onto a perspective quad in pixels
        let src = [(0.0, 0.0), (8.23, 0.0), (8.23, 23.77), (0.0, 23.77)];
        let dst = [(220.0, 60.0), (420.0, 60.0), (560.0, 330.0), (80.0, 330.0)];

        let fitted = Homography::fit(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(dst) {
            assert_close(fitted.project(s.0, s.1).unwrap(), d, 1e-6);
        }
    }

    #[test]
    fn test_fit_averages_noisy_correspondences() {
        let truth = Homography::from_rows([[1.2, 0.0, 15.0], [0.0, 0.9, -3.0], [0.0, 0.0, 1.0]]);
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for (i, (x, y)) in [(0.0, 0.0), (50.0, 0.0), (50.0, 50.0), (0.0, 50.0), (25.0, 10.0), (10.0, 40.0)]
            .into_iter()
            .enumerate()
        {
            let (u, v) = truth.project(x, y).unwrap();
            let jitter = if i % 2 == 0 { 0.2 } else { -0.2 };
            src.push((x, y));
            dst.push((u + jitter, v - jitter));
        }

        let fitted = Homography::fit(&src, &dst).unwrap();
        assert_close(fitted.project(30.0, 30.0).unwrap(), truth.project(30.0, 30.0).unwrap(), 0.5);
    }

    #[test]
    fn test_fit_rejects_degenerate_input() {
        let collinear = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        let dst = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        assert!(Homography::fit(&collinear, &dst).is_none());
        assert!(Homography::fit(&collinear[..3], &dst[..3]).is_none());
    }

    #[test]
    fn test_inverse_round_trips() {
        let h = Homography::from_rows([[2.0, 0.3, 10.0], [0.1, 1.5, -4.0], [0.001, 0.0, 1.0]]);
        let inv = h.inverse().unwrap();
        let (x, y) = h.project(12.0, 34.0).unwrap();
        assert_close(inv.project(x, y).unwrap(), (12.0, 34.0), 1e-9);
    }

    #[test]
    fn test_singular_transform_has_no_inverse() {
        let flat = Homography::from_rows([[1.0, 2.0, 0.0], [2.0, 4.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(flat.inverse().is_none());
    }

    #[test]
    fn test_identity_projects_unchanged() {
        assert_eq!(Homography::identity().project(3.0, 4.0), Some((3.0, 4.0)));
    }
}
