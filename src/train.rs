//! The training runner.
//!
//! For every requested [`ClassifierKind`], [`run`] loads and splits the dataset, fits a model on
//! the training split, evaluates it on the validation and test splits, and writes the model and
//! confusion matrices to the output directory. Parameters, metrics and artifacts are also handed
//! to an [`ExperimentTracker`].

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Serialize;

use crate::{
    classifier::{Classifier as _, ClassifierKind, Model},
    dataset::{self, Dataset, SPLIT_SEED},
    metrics::{self, ConfusionMatrix},
};

pub const DEFAULT_EXPERIMENT: &str = "maze-gesture-baseline";

#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Landmark CSV file.
    pub data: PathBuf,
    /// Classifier kinds to train, in order.
    pub kinds: Vec<ClassifierKind>,
    /// Directory receiving models and confusion matrices.
    pub out_dir: PathBuf,
    /// Experiment name used by the tracker.
    pub experiment: String,
    /// Seed for splitting and for the estimators.
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            data: "data/hand_landmarks_data.csv".into(),
            kinds: ClassifierKind::ALL.to_vec(),
            out_dir: "models".into(),
            experiment: DEFAULT_EXPERIMENT.to_string(),
            seed: SPLIT_SEED,
        }
    }
}

/// Evaluation results of one training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunMetrics {
    pub val_accuracy: f64,
    pub val_f1: f64,
    pub test_accuracy: f64,
    pub test_f1: f64,
}

impl fmt::Display for RunMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "val_acc={:.3} | val_f1={:.3} | test_acc={:.3} | test_f1={:.3}",
            self.val_accuracy, self.val_f1, self.test_accuracy, self.test_f1
        )
    }
}

/// Records the parameters, metrics and artifacts of training runs.
pub trait ExperimentTracker {
    fn log_params(&mut self, run: &str, params: &serde_json::Value) -> anyhow::Result<()>;
    fn log_metrics(&mut self, run: &str, metrics: &RunMetrics) -> anyhow::Result<()>;
    /// Records a file produced by the run. The file may be overwritten afterwards, so trackers
    /// have to copy it.
    fn log_artifact(&mut self, run: &str, path: &Path) -> anyhow::Result<()>;
}

/// An [`ExperimentTracker`] that stores everything below `<root>/<experiment>/<run>/`.
pub struct LocalTracker {
    dir: PathBuf,
}

impl LocalTracker {
    pub fn new<P: AsRef<Path>>(root: P, experiment: &str) -> Self {
        Self {
            dir: root.as_ref().join(experiment),
        }
    }

    /// Returns the directory of `run`, creating it if needed.
    pub fn run_dir(&self, run: &str) -> anyhow::Result<PathBuf> {
        let dir = self.dir.join(run);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create run directory '{}'", dir.display()))?;
        Ok(dir)
    }

    fn write_json<T: Serialize>(&self, run: &str, name: &str, value: &T) -> anyhow::Result<()> {
        let path = self.run_dir(run)?.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("failed to write '{}'", path.display()))
    }
}

impl ExperimentTracker for LocalTracker {
    fn log_params(&mut self, run: &str, params: &serde_json::Value) -> anyhow::Result<()> {
        self.write_json(run, "params.json", params)
    }

    fn log_metrics(&mut self, run: &str, metrics: &RunMetrics) -> anyhow::Result<()> {
        self.write_json(run, "metrics.json", metrics)
    }

    fn log_artifact(&mut self, run: &str, path: &Path) -> anyhow::Result<()> {
        let name = path
            .file_name()
            .with_context(|| format!("artifact '{}' has no file name", path.display()))?;
        let dest = self.run_dir(run)?.join(name);
        fs::copy(path, &dest).with_context(|| {
            format!(
                "failed to copy artifact '{}' to '{}'",
                path.display(),
                dest.display()
            )
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Load,
    Fit,
    Evaluate,
    Track,
    Artifacts,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Fit => "fit",
            Self::Evaluate => "evaluate",
            Self::Track => "track",
            Self::Artifacts => "artifacts",
            Self::Persist => "persist",
        })
    }
}

/// Trains, evaluates and persists one classifier kind.
///
/// Errors carry a `training <kind> failed during <stage>` context.
pub fn run(
    kind: ClassifierKind,
    opts: &TrainOptions,
    tracker: &mut dyn ExperimentTracker,
) -> anyhow::Result<RunMetrics> {
    let failed = |stage: Stage| format!("training {kind} failed during {stage}");
    let run_name = kind.as_str();

    let splits =
        dataset::load_and_split(&opts.data, opts.seed).with_context(|| failed(Stage::Load))?;

    let model = Model::fit(kind, &splits.train, opts.seed).with_context(|| failed(Stage::Fit))?;

    let (val_accuracy, val_f1, cm_val) =
        evaluate(&model, &splits.val).with_context(|| failed(Stage::Evaluate))?;
    let (test_accuracy, test_f1, cm_test) =
        evaluate(&model, &splits.test).with_context(|| failed(Stage::Evaluate))?;
    let metrics = RunMetrics {
        val_accuracy,
        val_f1,
        test_accuracy,
        test_f1,
    };
    tracker
        .log_params(run_name, &model.params())
        .and_then(|_| tracker.log_metrics(run_name, &metrics))
        .with_context(|| failed(Stage::Track))?;

    for (tag, cm) in [("val", &cm_val), ("test", &cm_test)] {
        write_confusion_matrix(cm, tag, &opts.out_dir, run_name, tracker)
            .with_context(|| failed(Stage::Artifacts))?;
    }

    let path = opts.out_dir.join(format!("{kind}.json"));
    model
        .save(&path)
        .and_then(|_| tracker.log_artifact(run_name, &path))
        .with_context(|| failed(Stage::Persist))?;
    log::info!("saved {kind} model to '{}'", path.display());

    println!("{:4} | {metrics}", kind.as_str().to_uppercase());
    Ok(metrics)
}

/// Runs [`run`] for every kind in `opts`, stopping at the first failure.
///
/// The tracker stores its runs below `<out_dir>/runs/<experiment>/`.
pub fn train_all(opts: &TrainOptions) -> anyhow::Result<Vec<(ClassifierKind, RunMetrics)>> {
    let mut tracker = LocalTracker::new(opts.out_dir.join("runs"), &opts.experiment);
    opts.kinds
        .iter()
        .map(|&kind| run(kind, opts, &mut tracker).map(|metrics| (kind, metrics)))
        .collect()
}

/// Writes `cm_<tag>.png` and `cm_<tag>.json` to `out_dir` and logs both as artifacts.
fn write_confusion_matrix(
    cm: &ConfusionMatrix,
    tag: &str,
    out_dir: &Path,
    run: &str,
    tracker: &mut dyn ExperimentTracker,
) -> anyhow::Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create '{}'", out_dir.display()))?;

    let png = out_dir.join(format!("cm_{tag}.png"));
    cm.render(&format!("Confusion Matrix - {tag}")).save(&png)?;
    tracker.log_artifact(run, &png)?;

    let json = out_dir.join(format!("cm_{tag}.json"));
    cm.save_json(&json)?;
    tracker.log_artifact(run, &json)
}

/// Returns accuracy, weighted F1 and the confusion matrix of `model` on `data`.
fn evaluate(model: &Model, data: &Dataset) -> anyhow::Result<(f64, f64, ConfusionMatrix)> {
    let predicted = data
        .features()
        .iter()
        .map(|f| model.predict(f))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let truth = data.labels();
    Ok((
        metrics::accuracy(truth, &predicted),
        metrics::weighted_f1(truth, &predicted),
        ConfusionMatrix::new(truth, &predicted),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_names_kind_and_stage() {
        let opts = TrainOptions {
            data: "does/not/exist.csv".into(),
            ..TrainOptions::default()
        };
        let mut tracker = LocalTracker::new(std::env::temp_dir(), "unused");
        let err = run(ClassifierKind::Logistic, &opts, &mut tracker).unwrap_err();
        assert_eq!(err.to_string(), "training lr failed during load");
    }

    #[test]
    fn metrics_summary() {
        let m = RunMetrics {
            val_accuracy: 0.9,
            val_f1: 0.8912,
            test_accuracy: 1.0,
            test_f1: 1.0,
        };
        assert_eq!(
            m.to_string(),
            "val_acc=0.900 | val_f1=0.891 | test_acc=1.000 | test_f1=1.000"
        );
    }

    #[test]
    fn local_tracker_copies_artifacts() {
        let root = std::env::temp_dir().join(format!("handsign-tracker-{}", std::process::id()));
        let mut tracker = LocalTracker::new(&root, "exp");

        let file = root.join("artifact.txt");
        fs::create_dir_all(&root).unwrap();
        fs::write(&file, "v1").unwrap();
        tracker.log_artifact("svm", &file).unwrap();
        fs::write(&file, "v2").unwrap();
        tracker
            .log_params("svm", &serde_json::json!({ "C": 1.0 }))
            .unwrap();

        let run_dir = root.join("exp").join("svm");
        assert_eq!(fs::read_to_string(run_dir.join("artifact.txt")).unwrap(), "v1");
        let params: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(run_dir.join("params.json")).unwrap())
                .unwrap();
        assert_eq!(params["C"], 1.0);

        fs::remove_dir_all(&root).ok();
    }
}
