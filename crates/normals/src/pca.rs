use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use pointclouds_core::Point3;

/// Iteration cap for the symmetric eigen-solver. A 3x3 covariance converges
/// in a handful of sweeps; hitting the cap means the input was not finite.
const MAX_EIGEN_ITERATIONS: usize = 100;

/// Principal component analysis of a small 3D point set.
///
/// The eigenbasis columns are ordered by descending variance, so column 0 is
/// the dominant direction and column 2 is the direction of least variance,
/// i.e. the normal of the best-fit plane through the points.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalComponents {
    mean: Vector3<f32>,
    eigenvalues: Vector3<f32>,
    eigenvectors: Matrix3<f32>,
}

impl PrincipalComponents {
    /// Fit the principal axes of `points`.
    ///
    /// The covariance is accumulated in f64 and normalized by the point
    /// count. Empty or non-finite input yields NaN for every component.
    pub fn fit(points: &[Point3]) -> Self {
        if points.is_empty() || !points.iter().flatten().all(|v| v.is_finite()) {
            return Self::undefined();
        }

        let n = points.len() as f64;
        let mean = points
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + widen(p))
            / n;

        let mut covariance = Matrix3::<f64>::zeros();
        for p in points {
            let d = widen(p) - mean;
            covariance += d * d.transpose();
        }
        covariance /= n;

        let Some(eigen) = SymmetricEigen::try_new(covariance, f64::EPSILON, MAX_EIGEN_ITERATIONS)
        else {
            return Self::undefined();
        };

        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let eigenvalues = Vector3::new(
            eigen.eigenvalues[order[0]],
            eigen.eigenvalues[order[1]],
            eigen.eigenvalues[order[2]],
        );
        let eigenvectors = Matrix3::from_columns(&[
            eigen.eigenvectors.column(order[0]).into_owned(),
            eigen.eigenvectors.column(order[1]).into_owned(),
            eigen.eigenvectors.column(order[2]).into_owned(),
        ]);

        Self {
            mean: mean.cast::<f32>(),
            eigenvalues: eigenvalues.cast::<f32>(),
            eigenvectors: eigenvectors.cast::<f32>(),
        }
    }

    fn undefined() -> Self {
        Self {
            mean: Vector3::repeat(f32::NAN),
            eigenvalues: Vector3::repeat(f32::NAN),
            eigenvectors: Matrix3::repeat(f32::NAN),
        }
    }

    pub fn mean(&self) -> &Vector3<f32> {
        &self.mean
    }

    /// Variances along each principal axis, largest first.
    pub fn eigenvalues(&self) -> &Vector3<f32> {
        &self.eigenvalues
    }

    /// Unit principal axes as columns, ordered like [`eigenvalues`](Self::eigenvalues).
    pub fn eigenvectors(&self) -> &Matrix3<f32> {
        &self.eigenvectors
    }

    /// The least-variance axis (column 2). Its sign is arbitrary.
    pub fn normal(&self) -> Point3 {
        let c = self.eigenvectors.column(2);
        [c[0], c[1], c[2]]
    }
}

#[inline]
fn widen(p: &Point3) -> Vector3<f64> {
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}
