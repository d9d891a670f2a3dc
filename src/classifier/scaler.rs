//! Feature standardization.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Shifts every feature to zero mean and scales it to unit variance.
///
/// Statistics are computed over the training data (population variance). Features that are
/// constant in the training data keep a scale of 1, so they are only shifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Computes per-column statistics of `x` (one sample per row).
    pub fn fit(x: &Array2<f64>) -> anyhow::Result<Self> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| anyhow::anyhow!("cannot standardize an empty dataset"))?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > f64::EPSILON { std } else { 1.0 });
        Ok(Self { mean, scale })
    }

    /// Returns the number of features this scaler was fitted on.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        (&row - &self.mean) / &self.scale
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};

    use super::*;

    #[test]
    fn zero_mean_unit_variance() {
        let x = array![[1.0, 5.0, 0.0], [3.0, 5.0, 2.0], [5.0, 5.0, 4.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x);

        for col in [0, 2] {
            let column = scaled.column(col);
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(column.std(0.0), 1.0, epsilon = 1e-12);
        }
        // Constant column: centered, not scaled.
        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
        assert_eq!(scaler.dim(), 3);
    }

    #[test]
    fn row_matches_batch() {
        let x = array![[1.0, -2.0], [2.0, 0.5], [4.0, 3.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let batch = scaler.transform(&x);
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            assert_eq!(scaler.transform_row(row), batch.row(i));
        }
    }

    #[test]
    fn empty_input() {
        assert!(StandardScaler::fit(&Array2::zeros((0, 4))).is_err());
    }
}
