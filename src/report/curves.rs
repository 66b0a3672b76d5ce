use std::path::{Path, PathBuf};

use log::debug;

use crate::data::loader::load_table;
use crate::data::model::{RunLabel, TidyTable};
use crate::error::{Error, Result};

/// A tidy table together with the name of the run it came from.
#[derive(Debug, Clone)]
pub struct LabeledTable {
    pub label: RunLabel,
    pub table: TidyTable,
}

impl LabeledTable {
    /// Load an exported table, labeling it with the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            label: RunLabel::from_path(path),
            table: load_table(path)?,
        })
    }
}

/// One run's values of a single tag, in step order.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub label: RunLabel,
    pub points: Vec<(u64, f64)>,
}

/// One curve per run for `tag`, in run order.
///
/// Runs are not resampled or joined: each curve keeps its own steps. Every
/// run must contain the tag, otherwise the comparison would silently drop a
/// run and [`Error::MalformedInput`] is returned.
pub fn align_curves(runs: &[LabeledTable], tag: &str) -> Result<Vec<Curve>> {
    runs.iter()
        .map(|run| {
            let rows = run.table.rows_for_tag(tag);
            if rows.is_empty() {
                return Err(Error::MalformedInput(format!(
                    "tag '{tag}' not found in run '{}'",
                    run.label
                )));
            }
            debug!("run '{}': {} points for '{tag}'", run.label, rows.len());
            Ok(Curve {
                label: run.label.clone(),
                points: rows.iter().map(|r| (r.step, r.value)).collect(),
            })
        })
        .collect()
}

/// Load every table in order, failing on the first missing path before
/// parsing any of them.
pub fn load_runs(paths: &[PathBuf]) -> Result<Vec<LabeledTable>> {
    if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
        return Err(Error::not_found("table file", missing));
    }
    paths.iter().map(|p| LabeledTable::load(p)).collect()
}
