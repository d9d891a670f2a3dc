//! Multinomial logistic regression.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::svm::argmax;

/// Hyperparameters of [`LogisticRegression`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    /// Inverse L2 regularization strength.
    pub c: f64,
    pub max_iter: usize,
    /// Training stops once the largest gradient component falls below this.
    pub tol: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
        }
    }
}

/// Softmax regression over all classes, trained with full-batch gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    params: LogisticParams,
    /// `n_classes x n_features`
    coef: Array2<f64>,
    intercept: Array1<f64>,
    /// Number of gradient steps taken during training.
    n_iter: usize,
}

impl LogisticRegression {
    /// Minimizes `C · Σ cross_entropy + ½||W||²` over samples `x` with class indices `y`.
    ///
    /// The intercept is not regularized.
    pub fn fit(x: &Array2<f64>, y: &[usize], n_classes: usize, params: LogisticParams) -> Self {
        let (n, d) = x.dim();
        let mut targets = Array2::<f64>::zeros((n, n_classes));
        for (i, &class) in y.iter().enumerate() {
            targets[[i, class]] = 1.0;
        }

        // The loss is smooth with a constant bounded by the mean squared sample norm (plus 1 for
        // the intercept) and the regularization term, which gives a safe step size.
        let mean_sq_norm = x.map_axis(Axis(1), |row| row.dot(&row)).mean().unwrap_or(0.0);
        let l2 = 1.0 / (params.c * n as f64);
        let step = 1.0 / (0.5 * (mean_sq_norm + 1.0) + l2);

        let mut coef = Array2::<f64>::zeros((n_classes, d));
        let mut intercept = Array1::<f64>::zeros(n_classes);
        let mut n_iter = 0;
        while n_iter < params.max_iter {
            n_iter += 1;

            let proba = softmax(x.dot(&coef.t()) + &intercept);
            let error = proba - &targets;
            let grad_coef = error.t().dot(x) / n as f64 + &coef * l2;
            let grad_intercept = error.sum_axis(Axis(0)) / n as f64;

            coef.scaled_add(-step, &grad_coef);
            intercept.scaled_add(-step, &grad_intercept);

            let max_grad = grad_coef
                .iter()
                .chain(grad_intercept.iter())
                .fold(0.0f64, |max, g| max.max(g.abs()));
            if max_grad < params.tol {
                break;
            }
        }

        if n_iter == params.max_iter {
            log::warn!("logistic regression did not converge in {n_iter} iterations");
        } else {
            log::debug!("logistic regression converged after {n_iter} iterations");
        }

        Self {
            params,
            coef,
            intercept,
            n_iter,
        }
    }

    pub fn params(&self) -> LogisticParams {
        self.params
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn predict_proba(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let logits = self.coef.dot(&x) + &self.intercept;
        softmax(logits.insert_axis(Axis(0))).remove_axis(Axis(0))
    }

    pub fn predict(&self, x: ArrayView1<'_, f64>) -> usize {
        argmax(&(self.coef.dot(&x) + &self.intercept))
    }
}

/// Row-wise softmax, shifted by each row's maximum for stability.
fn softmax(mut logits: Array2<f64>) -> Array2<f64> {
    for mut row in logits.axis_iter_mut(Axis(0)) {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    logits
}
