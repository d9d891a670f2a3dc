//! Gesture classifiers.
//!
//! Every classifier kind standardizes its input with a [`scaler::StandardScaler`] fitted on the
//! training data before handing it to the actual estimator. The scaler, the estimator and the
//! list of class labels are stored together in a [`Model`], which is what gets persisted as JSON
//! and loaded for inference.

pub mod forest;
pub mod logistic;
pub mod scaler;
pub mod svm;

use std::{fmt, fs, path::Path, str::FromStr};

use anyhow::{bail, ensure, Context};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    features::{FeatureVector, FEATURE_LEN},
};

use self::{
    forest::{ForestParams, RandomForest},
    logistic::{LogisticParams, LogisticRegression},
    scaler::StandardScaler,
    svm::{RbfSvm, SvmParams},
};

/// A gesture class label, as found in the dataset.
pub type Label = String;

/// Maps a feature vector to a gesture label.
///
/// Implementations are loaded once and then shared between threads without further mutation.
pub trait Classifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> anyhow::Result<Label>;
}

/// The supported classifier kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifierKind {
    #[serde(rename = "svm")]
    Svm,
    #[serde(rename = "rf")]
    RandomForest,
    #[serde(rename = "lr")]
    Logistic,
}

impl ClassifierKind {
    pub const ALL: [Self; 3] = [Self::Svm, Self::RandomForest, Self::Logistic];

    /// Returns the short name used on the command line and in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Svm => "svm",
            Self::RandomForest => "rf",
            Self::Logistic => "lr",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown classifier kind '{s}' (expected svm, rf or lr)"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Estimator {
    Svm(RbfSvm),
    RandomForest(RandomForest),
    Logistic(LogisticRegression),
}

impl Estimator {
    fn predict(&self, x: ArrayView1<'_, f64>) -> usize {
        match self {
            Self::Svm(svm) => svm.predict(x),
            Self::RandomForest(forest) => forest.predict(x),
            Self::Logistic(lr) => lr.predict(x),
        }
    }

    fn params(&self) -> serde_json::Value {
        match self {
            Self::Svm(svm) => {
                let p = svm.params();
                serde_json::json!({
                    "kernel": "rbf",
                    "gamma": "scale",
                    "gamma_value": svm.gamma(),
                    "C": p.c,
                    "n_components": p.n_components,
                    "epochs": p.epochs,
                    "random_state": p.seed,
                })
            }
            Self::RandomForest(forest) => {
                let p = forest.params();
                serde_json::json!({
                    "n_estimators": p.n_trees,
                    "criterion": "gini",
                    "bootstrap": true,
                    "max_features": p.max_features.map_or("sqrt".into(), serde_json::Value::from),
                    "random_state": p.seed,
                })
            }
            Self::Logistic(lr) => {
                let p = lr.params();
                serde_json::json!({
                    "penalty": "l2",
                    "C": p.c,
                    "max_iter": p.max_iter,
                    "tol": p.tol,
                    "n_iter": lr.n_iter(),
                })
            }
        }
    }
}

/// A trained, persistable classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    kind: ClassifierKind,
    classes: Vec<Label>,
    scaler: StandardScaler,
    estimator: Estimator,
}

impl Model {
    /// Fits a classifier of the given kind on `dataset`.
    ///
    /// `seed` drives all randomness of the estimator, so fitting is reproducible.
    pub fn fit(kind: ClassifierKind, dataset: &Dataset, seed: u64) -> anyhow::Result<Self> {
        let classes = dataset.classes();
        ensure!(
            classes.len() >= 2,
            "need samples of at least 2 classes, got {}",
            classes.len()
        );

        let y = dataset
            .labels()
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect::<Vec<_>>();
        let x = dataset.to_matrix();
        let scaler = StandardScaler::fit(&x)?;
        let x = scaler.transform(&x);
        let n_classes = classes.len();

        log::info!(
            "fitting {kind} on {} samples, {} classes",
            dataset.len(),
            n_classes
        );
        let estimator = match kind {
            ClassifierKind::Svm => Estimator::Svm(RbfSvm::fit(
                &x,
                &y,
                n_classes,
                SvmParams {
                    seed,
                    ..SvmParams::default()
                },
            )),
            ClassifierKind::RandomForest => Estimator::RandomForest(RandomForest::fit(
                &x,
                &y,
                n_classes,
                ForestParams {
                    seed,
                    ..ForestParams::default()
                },
            )),
            ClassifierKind::Logistic => Estimator::Logistic(LogisticRegression::fit(
                &x,
                &y,
                n_classes,
                LogisticParams::default(),
            )),
        };

        Ok(Self {
            kind,
            classes,
            scaler,
            estimator,
        })
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    /// Returns the class labels this model can predict, in sorted order.
    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    /// Returns the estimator's hyperparameters, for experiment tracking.
    pub fn params(&self) -> serde_json::Value {
        self.estimator.params()
    }

    /// Predicts a label for every feature vector.
    pub fn predict_batch(&self, features: &[FeatureVector]) -> anyhow::Result<Vec<Label>> {
        features.iter().map(|f| self.predict(f)).collect()
    }

    /// Writes the model as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec(self)?;
        fs::write(path, json).with_context(|| format!("failed to write model '{}'", path.display()))
    }

    /// Loads a model written by [`Model::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("failed to read model '{}'", path.display()))?;
        let model: Self = serde_json::from_slice(&data)
            .with_context(|| format!("invalid model file '{}'", path.display()))?;

        ensure!(
            model.scaler.dim() == FEATURE_LEN,
            "model '{}' expects {} features, not {FEATURE_LEN}",
            path.display(),
            model.scaler.dim(),
        );
        ensure!(
            !model.classes.is_empty(),
            "model '{}' has no classes",
            path.display()
        );
        log::info!(
            "loaded {} model with classes {:?}",
            model.kind,
            model.classes
        );
        Ok(model)
    }
}

impl Classifier for Model {
    fn predict(&self, features: &FeatureVector) -> anyhow::Result<Label> {
        let values = features.as_slice();
        if self.scaler.dim() != values.len() {
            bail!(
                "model expects {} features, got {}",
                self.scaler.dim(),
                values.len()
            );
        }
        ensure!(
            values.iter().all(|v| v.is_finite()),
            "feature vector contains non-finite values"
        );

        let x = values.iter().map(|&v| f64::from(v)).collect::<Array1<_>>();
        let x = self.scaler.transform_row(x.view());
        let class = self.estimator.predict(x.view());
        self.classes
            .get(class)
            .cloned()
            .with_context(|| format!("estimator predicted unknown class {class}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three classes that differ in a handful of features.
    fn dataset(per_class: usize) -> Dataset {
        let mut rng = fastrand::Rng::with_seed(5);
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for (class, label) in ["fist", "one", "two"].into_iter().enumerate() {
            for _ in 0..per_class {
                let mut values = [0.0; FEATURE_LEN];
                for (i, v) in values.iter_mut().enumerate().skip(3) {
                    *v = rng.f32() * 0.1 + if i % 3 == class { 1.0 } else { 0.0 };
                }
                features.push(FeatureVector::from_array(values));
                labels.push(label.to_string());
            }
        }
        Dataset::new(features, labels).unwrap()
    }

    #[test]
    fn kind_names() {
        for kind in ClassifierKind::ALL {
            assert_eq!(kind.as_str().parse::<ClassifierKind>(), Ok(kind));
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert!("knn".parse::<ClassifierKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ClassifierKind::RandomForest).unwrap(),
            "\"rf\""
        );
    }

    #[test]
    fn every_kind_learns_separable_data() {
        let data = dataset(20);
        for kind in ClassifierKind::ALL {
            let model = Model::fit(kind, &data, 42).unwrap();
            assert_eq!(model.classes(), &data.classes()[..]);

            let predicted = model.predict_batch(data.features()).unwrap();
            let correct = predicted
                .iter()
                .zip(data.labels())
                .filter(|(p, t)| p == t)
                .count();
            assert!(correct >= 57, "{kind}: {correct}/60 correct");
        }
    }

    #[test]
    fn json_round_trip_preserves_predictions() {
        let data = dataset(10);
        let model = Model::fit(ClassifierKind::Logistic, &data, 42).unwrap();

        let path =
            std::env::temp_dir().join(format!("handsign-model-{}.json", std::process::id()));
        model.save(&path).unwrap();
        let loaded = Model::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.kind(), ClassifierKind::Logistic);
        assert_eq!(
            loaded.predict_batch(data.features()).unwrap(),
            model.predict_batch(data.features()).unwrap()
        );
        assert_eq!(loaded.params()["max_iter"], 1000);
    }

    #[test]
    fn rejects_bad_input() {
        let data = dataset(5);
        let model = Model::fit(ClassifierKind::Logistic, &data, 42).unwrap();

        let mut values = [0.0; FEATURE_LEN];
        values[7] = f32::NAN;
        assert!(model.predict(&FeatureVector::from_array(values)).is_err());

        let single = Dataset::new(
            vec![FeatureVector::from_array([0.0; FEATURE_LEN]); 3],
            vec!["fist".to_string(); 3],
        )
        .unwrap();
        assert!(Model::fit(ClassifierKind::Svm, &single, 42).is_err());
    }
}
