//! Classification metrics.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::{
    classifier::Label,
    image::{draw, Color, Image},
};

/// Returns the fraction of predictions that match the true labels.
///
/// Returns 0 for empty inputs.
///
/// # Panics
///
/// Panics if `truth` and `predicted` have different lengths.
pub fn accuracy(truth: &[Label], predicted: &[Label]) -> f64 {
    assert_eq!(truth.len(), predicted.len(), "label count mismatch");
    if truth.is_empty() {
        return 0.0;
    }

    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

/// Computes the F1 score of every label and averages them, weighted by each label's support (its
/// number of true instances).
///
/// The labels considered are those occurring in either input. A label that is only ever predicted
/// has no support and does not affect the result; an undefined F1 score counts as 0.
///
/// # Panics
///
/// Panics if `truth` and `predicted` have different lengths.
pub fn weighted_f1(truth: &[Label], predicted: &[Label]) -> f64 {
    let cm = ConfusionMatrix::new(truth, predicted);
    let total: usize = cm.counts.iter().flatten().sum();
    if total == 0 {
        return 0.0;
    }

    let n = cm.labels.len();
    let mut sum = 0.0;
    for class in 0..n {
        let tp = cm.counts[class][class];
        let support: usize = cm.counts[class].iter().sum();
        let predicted: usize = (0..n).map(|row| cm.counts[row][class]).sum();
        let (fp, fn_) = (predicted - tp, support - tp);

        let denom = 2 * tp + fp + fn_;
        let f1 = if denom == 0 {
            0.0
        } else {
            (2 * tp) as f64 / denom as f64
        };
        sum += f1 * support as f64;
    }
    sum / total as f64
}

/// Counts of (true label, predicted label) pairs.
///
/// Rows are true labels, columns are predicted labels, both in sorted label order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    labels: Vec<Label>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Builds the matrix over all labels that occur in either `truth` or `predicted`.
    ///
    /// # Panics
    ///
    /// Panics if `truth` and `predicted` have different lengths.
    pub fn new(truth: &[Label], predicted: &[Label]) -> Self {
        assert_eq!(truth.len(), predicted.len(), "label count mismatch");

        let mut labels = truth.iter().chain(predicted).cloned().collect::<Vec<_>>();
        labels.sort();
        labels.dedup();

        let index = |label: &Label| labels.binary_search(label).unwrap_or_default();
        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        for (t, p) in truth.iter().zip(predicted) {
            counts[index(t)][index(p)] += 1;
        }

        Self { labels, counts }
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Returns how often `truth` was predicted as `predicted`.
    pub fn count(&self, truth: &str, predicted: &str) -> usize {
        let row = self.labels.iter().position(|l| l == truth);
        let col = self.labels.iter().position(|l| l == predicted);
        match (row, col) {
            (Some(row), Some(col)) => self.counts[row][col],
            _ => 0,
        }
    }

    /// Renders the matrix as a heatmap with the count written in each cell.
    pub fn render(&self, title: &str) -> Image {
        const CELL: u32 = 40;
        const LEFT: u32 = 70;
        const TOP: u32 = 40;
        const MARGIN: u32 = 10;

        let n = self.labels.len() as u32;
        let mut image = Image::new(LEFT + n * CELL + MARGIN, TOP + n * CELL + MARGIN);
        image.clear(Color::WHITE);

        let center_x = (image.width() / 2) as i32;
        draw::text(&mut image, center_x, 4, title).align_top();

        let max = self.counts.iter().flatten().copied().max().unwrap_or(0).max(1);
        for (row, counts) in self.counts.iter().enumerate() {
            let y = (TOP + row as u32 * CELL) as i32;
            let label = short(&self.labels[row]);
            draw::text(&mut image, LEFT as i32 - 4, y + CELL as i32 / 2, label).align_right();

            for (col, &count) in counts.iter().enumerate() {
                let x = (LEFT + col as u32 * CELL) as i32;
                let heat = count as f32 / max as f32;
                let shade = (255.0 * (1.0 - heat)) as u8;
                draw::fill_rect(&mut image, x, y, CELL, CELL)
                    .color(Color::from_rgb8(shade, shade, 255));

                let text_color = if heat > 0.5 { Color::WHITE } else { Color::BLACK };
                let label = count.to_string();
                draw::text(&mut image, x + CELL as i32 / 2, y + CELL as i32 / 2, &label)
                    .color(text_color);
            }
        }

        for (col, label) in self.labels.iter().enumerate() {
            let x = (LEFT + col as u32 * CELL + CELL / 2) as i32;
            draw::text(&mut image, x, TOP as i32 - 8, short(label));
        }

        image
    }

    /// Writes the counts as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Shortens labels that would not fit into one heatmap cell.
fn short(label: &str) -> &str {
    match label.char_indices().nth(6) {
        Some((end, _)) => &label[..end],
        None => label,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn labels(s: &[&str]) -> Vec<Label> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accuracy_counts_matches() {
        let truth = labels(&["a", "a", "b", "b", "c"]);
        let pred = labels(&["a", "b", "b", "b", "a"]);
        assert_abs_diff_eq!(accuracy(&truth, &pred), 0.6);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn weighted_f1_by_hand() {
        // a: tp=1 fp=1 fn=1 -> 0.5, b: tp=2 fp=1 fn=0 -> 0.8, c: 0
        // weighted by support 2, 2, 1
        let truth = labels(&["a", "a", "b", "b", "c"]);
        let pred = labels(&["a", "b", "b", "b", "a"]);
        assert_abs_diff_eq!(weighted_f1(&truth, &pred), 0.52, epsilon = 1e-12);

        assert_abs_diff_eq!(weighted_f1(&truth, &truth), 1.0);
    }

    #[test]
    #[should_panic(expected = "label count mismatch")]
    fn accuracy_rejects_length_mismatch() {
        accuracy(&labels(&["a", "b"]), &labels(&["a"]));
    }

    #[test]
    #[should_panic(expected = "label count mismatch")]
    fn confusion_matrix_rejects_length_mismatch() {
        ConfusionMatrix::new(&labels(&["a"]), &[]);
    }

    #[test]
    fn predicted_only_labels_have_no_weight() {
        let truth = labels(&["a", "a"]);
        let pred = labels(&["a", "z"]);
        assert_abs_diff_eq!(weighted_f1(&truth, &pred), 2.0 / 3.0, epsilon = 1e-12);

        let cm = ConfusionMatrix::new(&truth, &pred);
        assert_eq!(cm.labels(), &labels(&["a", "z"])[..]);
        assert_eq!(cm.count("a", "z"), 1);
        assert_eq!(cm.count("z", "a"), 0);
    }

    #[test]
    fn confusion_matrix_layout() {
        let truth = labels(&["fist", "one", "one", "two"]);
        let pred = labels(&["fist", "one", "two", "two"]);
        let cm = ConfusionMatrix::new(&truth, &pred);

        assert_eq!(cm.count("one", "two"), 1);
        assert_eq!(cm.count("one", "one"), 1);
        assert_eq!(cm.count("two", "one"), 0);
        assert_eq!(cm.count("unknown", "one"), 0);

        let json = serde_json::to_value(&cm).unwrap();
        assert_eq!(json["counts"][1], serde_json::json!([0, 1, 1]));

        let image = cm.render("Confusion matrix - val");
        assert_eq!(image.width(), 70 + 3 * 40 + 10);
        assert_eq!(image.height(), 40 + 3 * 40 + 10);
        // The diagonal cell of "fist" holds the maximum count and is fully saturated.
        assert_eq!(image.get(72, 42), Color::from_rgb8(0, 0, 255));
    }

    #[test]
    fn short_labels() {
        assert_eq!(short("fist"), "fist");
        assert_eq!(short("thumbs_up"), "thumbs");
    }
}
