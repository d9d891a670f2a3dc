//! Landmark datasets: CSV loading, cleaning, normalization and splitting.
//!
//! A dataset file has a header row followed by one row per hand: 63 raw landmark coordinates
//! (`x0, y0, z0, ..., x20, y20, z20`) and a gesture label in the last column.

use std::{collections::BTreeMap, fs::File, io::Read, path::Path};

use anyhow::{bail, ensure, Context};
use ndarray::Array2;

use crate::{
    classifier::Label,
    features::{self, FeatureVector, FEATURE_LEN},
    hand::{Position, NUM_LANDMARKS},
};

/// Number of columns in a dataset file: all coordinates plus the label.
pub const NUM_COLUMNS: usize = FEATURE_LEN + 1;

/// Seed used for the train/validation/test split unless another one is requested.
pub const SPLIT_SEED: u64 = 42;

/// Fraction of the dataset held out from training (and then split evenly into validation and
/// test data).
const HOLDOUT_FRACTION: f64 = 0.2;
const TEST_FRACTION_OF_HOLDOUT: f64 = 0.5;

/// One raw row of a dataset file.
///
/// Missing cells (empty or `NaN`) are kept as [`None`] so that [`preprocess`] can drop the row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Option<f32>>,
    pub label: Option<Label>,
}

impl Row {
    /// Returns the landmark positions and label if no value is missing.
    fn complete(&self) -> Option<([Position; NUM_LANDMARKS], &Label)> {
        let label = self.label.as_ref()?;
        if self.values.len() != FEATURE_LEN {
            return None;
        }

        let mut positions = [[0.0; 3]; NUM_LANDMARKS];
        for (pos, chunk) in positions.iter_mut().zip(self.values.chunks_exact(3)) {
            *pos = [chunk[0]?, chunk[1]?, chunk[2]?];
        }
        Some((positions, label))
    }
}

/// Reads all rows of a dataset file.
///
/// Fails if the file can't be read, if any row does not have exactly [`NUM_COLUMNS`] columns, or
/// if a feature cell is neither missing nor a number.
pub fn read_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Row>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("failed to open dataset '{}'", path.display()))?;
    parse_csv(file).with_context(|| format!("invalid dataset '{}'", path.display()))
}

/// Parses dataset rows from any reader. See [`read_csv`].
pub fn parse_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header_len = reader.headers()?.len();
    ensure!(
        header_len == NUM_COLUMNS,
        "header has {header_len} columns, expected {NUM_COLUMNS}"
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |pos| pos.line());
        ensure!(
            record.len() == NUM_COLUMNS,
            "line {line}: found {} columns, expected {NUM_COLUMNS}",
            record.len(),
        );

        let values = record
            .iter()
            .take(FEATURE_LEN)
            .enumerate()
            .map(|(column, cell)| match parse_value(cell) {
                Ok(value) => Ok(value),
                Err(()) => bail!("line {line}, column {}: invalid value {cell:?}", column + 1),
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let label = record
            .get(FEATURE_LEN)
            .map(str::trim)
            .filter(|label| !is_missing(label))
            .map(str::to_string);

        rows.push(Row { values, label });
    }

    Ok(rows)
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || cell.eq_ignore_ascii_case("nan")
}

fn parse_value(cell: &str) -> Result<Option<f32>, ()> {
    let cell = cell.trim();
    if is_missing(cell) {
        return Ok(None);
    }
    match cell.parse::<f32>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(()),
    }
}

/// Normalized feature vectors with their labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    features: Vec<FeatureVector>,
    labels: Vec<Label>,
}

impl Dataset {
    pub fn new(features: Vec<FeatureVector>, labels: Vec<Label>) -> anyhow::Result<Self> {
        ensure!(
            features.len() == labels.len(),
            "{} feature vectors but {} labels",
            features.len(),
            labels.len(),
        );
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Returns the distinct labels in sorted order.
    pub fn classes(&self) -> Vec<Label> {
        let mut classes = self.labels.clone();
        classes.sort();
        classes.dedup();
        classes
    }

    /// Returns the features as an `n x 63` matrix, one row per sample.
    pub fn to_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), FEATURE_LEN), |(row, col)| {
            f64::from(self.features[row][col])
        })
    }

    /// Returns the samples at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
        }
    }
}

/// Drops incomplete rows and normalizes the remaining ones, preserving their order.
pub fn preprocess(rows: &[Row]) -> Dataset {
    let mut dataset = Dataset::default();
    for (positions, label) in rows.iter().filter_map(Row::complete) {
        dataset
            .features
            .push(features::normalize_positions(&positions));
        dataset.labels.push(label.clone());
    }

    let dropped = rows.len() - dataset.len();
    if dropped > 0 {
        log::info!(
            "dropped {dropped} of {} rows with missing values",
            rows.len()
        );
    }
    dataset
}

/// The three disjoint parts of a dataset.
#[derive(Debug, Clone)]
pub struct Splits {
    pub train: Dataset,
    pub val: Dataset,
    pub test: Dataset,
}

/// Splits a dataset 80/10/10 into training, validation and test data.
///
/// Both splits are stratified, so every part has approximately the same class proportions as
/// `dataset`. The result only depends on `dataset` and `seed`.
pub fn split(dataset: &Dataset, seed: u64) -> anyhow::Result<Splits> {
    let (train, holdout) = stratified_split(
        dataset.labels(),
        HOLDOUT_FRACTION,
        &mut fastrand::Rng::with_seed(seed),
    )
    .context("failed to split off training data")?;
    let holdout = dataset.subset(&holdout);

    let (val, test) = stratified_split(
        holdout.labels(),
        TEST_FRACTION_OF_HOLDOUT,
        &mut fastrand::Rng::with_seed(seed),
    )
    .context("failed to split validation and test data")?;

    let splits = Splits {
        train: dataset.subset(&train),
        val: holdout.subset(&val),
        test: holdout.subset(&test),
    };
    log::debug!(
        "split {} samples into {} train, {} validation, {} test",
        dataset.len(),
        splits.train.len(),
        splits.val.len(),
        splits.test.len(),
    );
    Ok(splits)
}

/// Reads, preprocesses and splits a dataset file.
pub fn load_and_split<P: AsRef<Path>>(path: P, seed: u64) -> anyhow::Result<Splits> {
    let rows = read_csv(path)?;
    let dataset = preprocess(&rows);
    log::info!(
        "loaded {} samples in {} classes",
        dataset.len(),
        dataset.classes().len()
    );
    split(&dataset, seed)
}

/// Splits sample indices into a (train, test) pair, stratified by label.
///
/// The test part holds `ceil(test_fraction * n)` samples. Each class gets the floor of its
/// proportional share, and the samples left over go to the classes with the largest remainders
/// (earlier classes first on ties).
pub fn stratified_split(
    labels: &[Label],
    test_fraction: f64,
    rng: &mut fastrand::Rng,
) -> anyhow::Result<(Vec<usize>, Vec<usize>)> {
    let mut by_class: BTreeMap<&Label, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    let n = labels.len();
    let n_test = (test_fraction * n as f64).ceil() as usize;
    let n_train = n - n_test.min(n);

    if let Some((label, members)) = by_class.iter().find(|(_, members)| members.len() < 2) {
        bail!(
            "class {label:?} has {} member(s), at least 2 are needed for a stratified split",
            members.len()
        );
    }
    ensure!(
        n_test >= by_class.len() && n_train >= by_class.len(),
        "cannot split {n} samples into {n_train}/{n_test} with {} classes in each part",
        by_class.len(),
    );

    let allocation = allocate(
        &by_class.values().map(Vec::len).collect::<Vec<_>>(),
        n_test,
    );

    let (mut train, mut test) = (Vec::with_capacity(n_train), Vec::with_capacity(n_test));
    for (mut members, n_class_test) in by_class.into_values().zip(allocation) {
        rng.shuffle(&mut members);
        let (class_test, class_train) = members.split_at(n_class_test);
        test.extend_from_slice(class_test);
        train.extend_from_slice(class_train);
    }

    rng.shuffle(&mut train);
    rng.shuffle(&mut test);
    Ok((train, test))
}

/// Distributes `total` among classes proportionally to their `counts` (largest remainder method).
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let shares = counts
        .iter()
        .map(|&c| c as f64 * total as f64 / n as f64)
        .collect::<Vec<_>>();
    let mut allocation = shares.iter().map(|s| s.floor() as usize).collect::<Vec<_>>();

    let mut order = (0..counts.len()).collect::<Vec<_>>();
    // Stable sort, so ties keep class order.
    order.sort_by(|&a, &b| {
        let ra = shares[a] - shares[a].floor();
        let rb = shares[b] - shares[b].floor();
        rb.total_cmp(&ra)
    });

    let mut remaining = total - allocation.iter().sum::<usize>();
    for &class in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        if allocation[class] < counts[class] {
            allocation[class] += 1;
            remaining -= 1;
        }
    }
    allocation
}
