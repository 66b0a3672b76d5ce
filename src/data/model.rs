use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// ScalarEvent – one logged measurement
// ---------------------------------------------------------------------------

/// A single scalar measurement as recorded by the training process.
///
/// Field order matches the tidy export header `tag,step,wall_time,value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub step: u64,
    /// Unix seconds.
    pub wall_time: f64,
    /// Empty cells (pandas' NaN encoding) read back as NaN.
    #[serde(deserialize_with = "nan_if_empty")]
    pub value: f64,
}

impl ScalarEvent {
    pub fn new(tag: impl Into<String>, step: u64, wall_time: f64, value: f64) -> Self {
        Self {
            tag: tag.into(),
            step,
            wall_time,
            value,
        }
    }
}

fn nan_if_empty<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cell {
        Number(f64),
        Text(String),
        Missing(()),
    }

    match Cell::deserialize(deserializer)? {
        Cell::Number(v) => Ok(v),
        Cell::Missing(()) => Ok(f64::NAN),
        Cell::Text(s) if s.trim().is_empty() => Ok(f64::NAN),
        Cell::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// TidyTable – rows sorted by (tag, step)
// ---------------------------------------------------------------------------

/// A non-empty, immutable sequence of events sorted by tag then step.
///
/// The sort is stable, so repeated logging of the same step keeps its
/// original order.
#[derive(Debug, Clone, PartialEq)]
pub struct TidyTable {
    rows: Vec<ScalarEvent>,
}

impl TidyTable {
    /// Sort `rows` into tidy order. Fails on an empty row set.
    pub fn from_rows(mut rows: Vec<ScalarEvent>) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::MalformedInput("table has no rows".to_string()));
        }
        rows.sort_by(|a, b| a.tag.cmp(&b.tag).then(a.step.cmp(&b.step)));
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ScalarEvent] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct tags present, in lexicographic order.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.tag.as_str()).collect()
    }

    /// The contiguous block of rows for `tag`, in step order. Empty if absent.
    pub fn rows_for_tag(&self, tag: &str) -> &[ScalarEvent] {
        let start = self.rows.partition_point(|r| r.tag.as_str() < tag);
        let end = self.rows.partition_point(|r| r.tag.as_str() <= tag);
        &self.rows[start..end]
    }
}

// ---------------------------------------------------------------------------
// MetricSpec – how to summarize one tag
// ---------------------------------------------------------------------------

/// Which extreme counts as "best" for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Min,
    Max,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Min => write!(f, "min"),
            Direction::Max => write!(f, "max"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub tag: String,
    pub display_name: String,
    pub direction: Direction,
}

impl MetricSpec {
    pub fn new(tag: &str, display_name: &str, direction: Direction) -> Self {
        Self {
            tag: tag.to_string(),
            display_name: display_name.to_string(),
            direction,
        }
    }
}

// ---------------------------------------------------------------------------
// SummaryEntry – best value of one metric
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestValue {
    pub value: f64,
    pub step: u64,
}

/// Outcome of summarizing one [`MetricSpec`]. `best` is `None` when the tag
/// was never logged for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryEntry {
    pub display_name: String,
    pub best: Option<BestValue>,
}

impl SummaryEntry {
    pub fn best_value(&self) -> Option<f64> {
        self.best.map(|b| b.value)
    }

    pub fn best_step(&self) -> Option<u64> {
        self.best.map(|b| b.step)
    }
}

impl fmt::Display for SummaryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.best {
            Some(BestValue { value, step }) => {
                write!(f, "- {}: {value:.4} at epoch {step}", self.display_name)
            }
            None => write!(f, "  {}: N/A (tag missing)", self.display_name),
        }
    }
}

// ---------------------------------------------------------------------------
// RunLabel – name of a run in comparisons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunLabel(String);

impl RunLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Label a run by the file stem of its exported table.
    pub fn from_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self(stem)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_sorts_by_tag_then_step_stably() {
        let table = TidyTable::from_rows(vec![
            ScalarEvent::new("train_loss", 2, 0.0, 1.0),
            ScalarEvent::new("test_acc", 1, 0.0, 0.1),
            ScalarEvent::new("train_loss", 1, 0.0, 2.0),
            ScalarEvent::new("train_loss", 1, 0.0, 3.0),
        ])
        .unwrap();

        let keys: Vec<(&str, u64, f64)> = table
            .rows()
            .iter()
            .map(|r| (r.tag.as_str(), r.step, r.value))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("test_acc", 1, 0.1),
                ("train_loss", 1, 2.0),
                ("train_loss", 1, 3.0),
                ("train_loss", 2, 1.0),
            ]
        );
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(matches!(
            TidyTable::from_rows(Vec::new()),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn rows_for_tag_returns_contiguous_block() {
        let table = TidyTable::from_rows(vec![
            ScalarEvent::new("b", 1, 0.0, 1.0),
            ScalarEvent::new("a", 1, 0.0, 1.0),
            ScalarEvent::new("b", 2, 0.0, 2.0),
            ScalarEvent::new("c", 1, 0.0, 1.0),
        ])
        .unwrap();

        let b: Vec<u64> = table.rows_for_tag("b").iter().map(|r| r.step).collect();
        assert_eq!(b, vec![1, 2]);
        assert!(table.rows_for_tag("zzz").is_empty());
        assert!(table.rows_for_tag("").is_empty());
        assert_eq!(table.tags().into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn summary_entry_renders_report_lines() {
        let present = SummaryEntry {
            display_name: "Test Accuracy".into(),
            best: Some(BestValue { value: 0.91234, step: 7 }),
        };
        let absent = SummaryEntry {
            display_name: "Test Top-5 Accuracy".into(),
            best: None,
        };
        assert_eq!(present.to_string(), "- Test Accuracy: 0.9123 at epoch 7");
        assert_eq!(absent.to_string(), "  Test Top-5 Accuracy: N/A (tag missing)");
    }

    #[test]
    fn run_label_uses_file_stem() {
        let label = RunLabel::from_path(Path::new("exports/kd_resnet32.csv"));
        assert_eq!(label.as_str(), "kd_resnet32");
    }
}
