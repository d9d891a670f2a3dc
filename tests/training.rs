use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use handsign::{
    classifier::{Classifier, ClassifierKind, Model},
    dataset,
    features::{self, FEATURE_LEN},
    hand::HandLandmarks,
    train::{self, ExperimentTracker, RunMetrics, TrainOptions},
};

/// Accepts parameters but refuses to store metrics.
#[derive(Default)]
struct ReadOnlyTracker {
    params: Vec<String>,
}

impl ExperimentTracker for ReadOnlyTracker {
    fn log_params(&mut self, run: &str, _: &serde_json::Value) -> anyhow::Result<()> {
        self.params.push(run.to_string());
        Ok(())
    }

    fn log_metrics(&mut self, _: &str, _: &RunMetrics) -> anyhow::Result<()> {
        anyhow::bail!("tracking store is read-only")
    }

    fn log_artifact(&mut self, _: &str, _: &Path) -> anyhow::Result<()> {
        anyhow::bail!("tracking store is read-only")
    }
}

const CLASSES: [(&str, f32); 3] = [("fist", -0.012), ("one", 0.0), ("two", 0.012)];

/// Landmarks fanning out from the wrist, tilted per class.
fn landmarks(slant: f32, rng: &mut fastrand::Rng) -> Vec<f32> {
    (0..21)
        .flat_map(|i| {
            let i = i as f32;
            let jitter = (rng.f32() - 0.5) * 0.003;
            [
                0.5 + slant * i + jitter,
                0.8 - 0.02 * i + jitter,
                -0.001 * i,
            ]
        })
        .collect()
}

fn write_dataset(dir: &Path, per_class: usize) -> PathBuf {
    let mut rng = fastrand::Rng::with_seed(9);
    let mut csv = String::new();
    for i in 0..FEATURE_LEN {
        write!(csv, "f{i},").unwrap();
    }
    csv.push_str("label\n");

    for n in 0..per_class {
        for (label, slant) in CLASSES {
            let values = landmarks(slant, &mut rng);
            let mut cells = values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
            if n == 0 && label == "one" {
                cells[5] = "NaN".to_string();
            }
            csv.push_str(&cells.join(","));
            csv.push(',');
            csv.push_str(label);
            csv.push('\n');
        }
    }

    let path = dir.join("landmarks.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("handsign-{name}-{}", std::process::id()));
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn batch_preprocessing_matches_single_sample() {
    let dir = temp_dir("preprocess");
    let path = write_dataset(&dir, 5);

    let rows = dataset::read_csv(&path).unwrap();
    assert_eq!(rows.len(), 15);
    let data = dataset::preprocess(&rows);
    assert_eq!(data.len(), 14);

    let complete = rows
        .iter()
        .filter_map(|row| row.values.iter().copied().collect::<Option<Vec<f32>>>());
    for (values, fv) in complete.zip(data.features()) {
        let hand = HandLandmarks::from_flat(&values).unwrap();
        assert_eq!(&features::normalize(&hand), fv);
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn trains_and_writes_artifacts() {
    let dir = temp_dir("train");
    let data = write_dataset(&dir, 30);
    let out_dir = dir.join("models");
    let opts = TrainOptions {
        data,
        kinds: vec![ClassifierKind::Logistic, ClassifierKind::RandomForest],
        out_dir: out_dir.clone(),
        experiment: "test-run".to_string(),
        seed: 42,
    };

    let results = train::train_all(&opts).unwrap();
    assert_eq!(results.len(), 2);
    for (kind, metrics) in &results {
        assert!(metrics.test_accuracy >= 0.8, "{kind}: {metrics}");
        assert!((0.0..=1.0).contains(&metrics.val_f1), "{kind}: {metrics}");
    }

    for file in ["lr.json", "rf.json", "cm_val.png", "cm_test.png", "cm_val.json"] {
        assert!(out_dir.join(file).is_file(), "missing {file}");
    }
    for kind in ["lr", "rf"] {
        let run = out_dir.join("runs").join("test-run").join(kind);
        let model = format!("{kind}.json");
        for file in ["params.json", "metrics.json", "cm_test.png", model.as_str()] {
            assert!(run.join(file).is_file(), "missing {kind}/{file}");
        }
    }

    let metrics: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(out_dir.join("runs/test-run/lr/metrics.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(metrics["test_accuracy"], results[0].1.test_accuracy);

    let params: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(out_dir.join("runs/test-run/rf/params.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(params["n_estimators"], 300);

    let model = Model::load(out_dir.join("rf.json")).unwrap();
    assert_eq!(model.kind(), ClassifierKind::RandomForest);
    let values = landmarks(0.012, &mut fastrand::Rng::with_seed(1));
    let hand = HandLandmarks::from_flat(&values).unwrap();
    assert_eq!(model.predict(&features::normalize(&hand)).unwrap(), "two");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn too_small_classes_fail_during_load() {
    let dir = temp_dir("tiny");
    let data = write_dataset(&dir, 1);
    let opts = TrainOptions {
        data,
        kinds: vec![ClassifierKind::Svm],
        out_dir: dir.join("models"),
        ..TrainOptions::default()
    };

    let err = train::train_all(&opts).unwrap_err();
    assert_eq!(err.to_string(), "training svm failed during load");
    assert!(!dir.join("models").join("svm.json").exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn tracker_failure_names_track_stage() {
    let dir = temp_dir("tracker");
    let opts = TrainOptions {
        data: write_dataset(&dir, 20),
        kinds: vec![ClassifierKind::Logistic],
        out_dir: dir.join("models"),
        ..TrainOptions::default()
    };

    let mut tracker = ReadOnlyTracker::default();
    let err = train::run(ClassifierKind::Logistic, &opts, &mut tracker).unwrap_err();
    assert_eq!(err.to_string(), "training lr failed during track");
    assert_eq!(
        format!("{err:#}"),
        "training lr failed during track: tracking store is read-only"
    );
    assert_eq!(tracker.params, ["lr"]);
    assert!(!dir.join("models").join("lr.json").exists());

    fs::remove_dir_all(&dir).ok();
}
