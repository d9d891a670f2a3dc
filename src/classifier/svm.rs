//! Support vector machine with an (approximate) RBF kernel.
//!
//! The RBF kernel `k(x, y) = exp(-γ||x - y||²)` is approximated with random Fourier features:
//! every sample is projected to `z(x) = sqrt(2/D) · cos(Wᵀx + b)` with `W ~ N(0, 2γ)` and
//! `b ~ U(0, 2π)`, so that `z(x)·z(y) ≈ k(x, y)`. A linear SVM per class (one-vs-rest) is then
//! trained on `z(x)` with the Pegasos sub-gradient method.
//!
//! Like the exact kernel SVM, `γ` defaults to "scale": `1 / (n_features · Var(X))`.

use std::f64::consts::PI;

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Hyperparameters of [`RbfSvm`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    /// Inverse regularization strength.
    pub c: f64,
    /// Number of random Fourier features.
    pub n_components: usize,
    /// Number of passes over the training data.
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            n_components: 512,
            epochs: 40,
            seed: 42,
        }
    }
}

/// A trained one-vs-rest SVM on random Fourier features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbfSvm {
    params: SvmParams,
    gamma: f64,
    /// `n_features x n_components` projection.
    projection: Array2<f64>,
    offsets: Array1<f64>,
    /// One weight vector per class, with the bias as the last element.
    weights: Array2<f64>,
}

impl RbfSvm {
    /// Trains on standardized samples `x` with class indices `y` (`0..n_classes`).
    pub fn fit(x: &Array2<f64>, y: &[usize], n_classes: usize, params: SvmParams) -> Self {
        let (n, d) = x.dim();
        let gamma = scale_gamma(x);
        let mut rng = fastrand::Rng::with_seed(params.seed);

        let std_dev = (2.0 * gamma).sqrt();
        let projection =
            Array2::from_shape_simple_fn((d, params.n_components), || std_dev * normal(&mut rng));
        let offsets = Array1::from_shape_simple_fn(params.n_components, || 2.0 * PI * rng.f64());

        let mut svm = Self {
            params,
            gamma,
            projection,
            offsets,
            weights: Array2::zeros((n_classes, params.n_components + 1)),
        };

        let z = svm.features(x);
        let lambda = 1.0 / (params.c * n as f64);
        for class in 0..n_classes {
            let targets = y
                .iter()
                .map(|&label| if label == class { 1.0 } else { -1.0 })
                .collect::<Vec<_>>();
            let w = pegasos(&z, &targets, lambda, params.epochs, &mut rng);
            svm.weights.row_mut(class).assign(&w);
        }

        log::debug!(
            "trained {n_classes} RBF SVMs on {n} samples (gamma={gamma:.5}, {} components)",
            params.n_components
        );
        svm
    }

    pub fn params(&self) -> SvmParams {
        self.params
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Maps samples into the random feature space, appending a constant 1 for the bias.
    fn features(&self, x: &Array2<f64>) -> Array2<f64> {
        let components = self.offsets.len();
        let norm = (2.0 / components as f64).sqrt();

        let mut z = Array2::ones((x.nrows(), components + 1));
        let projected = x.dot(&self.projection) + &self.offsets;
        z.slice_mut(s![.., ..components])
            .assign(&projected.mapv(|v| norm * v.cos()));
        z
    }

    /// Returns the decision value of every class for one standardized sample.
    pub fn decision_function(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let x = x.insert_axis(Axis(0)).to_owned();
        let z = self.features(&x);
        self.weights.dot(&z.row(0))
    }

    pub fn predict(&self, x: ArrayView1<'_, f64>) -> usize {
        argmax(&self.decision_function(x))
    }
}

/// `gamma="scale"`: `1 / (n_features · Var(X))`, or 1 if `X` is constant.
fn scale_gamma(x: &Array2<f64>) -> f64 {
    let var = x.var(0.0);
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

/// Trains a linear SVM (hinge loss, L2 regularization `lambda`) with the Pegasos algorithm.
fn pegasos(
    z: &Array2<f64>,
    targets: &[f64],
    lambda: f64,
    epochs: usize,
    rng: &mut fastrand::Rng,
) -> Array1<f64> {
    let n = z.nrows();
    let mut w = Array1::zeros(z.ncols());
    let radius = 1.0 / lambda.sqrt();

    let mut t = 0usize;
    for _ in 0..epochs {
        for _ in 0..n {
            t += 1;
            let i = rng.usize(..n);
            let eta = 1.0 / (lambda * t as f64);
            let zi = z.row(i);
            let margin = targets[i] * w.dot(&zi);

            w *= 1.0 - eta * lambda;
            if margin < 1.0 {
                w.scaled_add(eta * targets[i], &zi);
            }

            let norm = w.dot(&w).sqrt();
            if norm > radius {
                w *= radius / norm;
            }
        }
    }
    w
}

/// Samples the standard normal distribution (Box-Muller transform).
fn normal(rng: &mut fastrand::Rng) -> f64 {
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Returns the index of the largest value, preferring earlier indices on ties.
pub(crate) fn argmax(values: &Array1<f64>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}
