use std::fmt::Write as _;

use log::debug;

use crate::data::model::{BestValue, Direction, MetricSpec, ScalarEvent, SummaryEntry, TidyTable};

/// Best value of every metric in `specs`, in spec order.
///
/// A metric whose tag is absent from the table (or only has NaN values)
/// yields an entry without a best value rather than an error.
pub fn summarize(table: &TidyTable, specs: &[MetricSpec]) -> Vec<SummaryEntry> {
    specs
        .iter()
        .map(|spec| {
            let rows = table.rows_for_tag(&spec.tag);
            debug!("{} ({}): {} rows", spec.tag, spec.direction, rows.len());
            SummaryEntry {
                display_name: spec.display_name.clone(),
                best: best_of(rows, spec.direction),
            }
        })
        .collect()
}

/// Extreme value under `direction`. Ties go to the earliest row, which in a
/// tidy table is the lowest step.
fn best_of(rows: &[ScalarEvent], direction: Direction) -> Option<BestValue> {
    let mut best: Option<&ScalarEvent> = None;
    for row in rows.iter().filter(|r| !r.value.is_nan()) {
        let better = match best {
            None => true,
            Some(current) => match direction {
                Direction::Max => row.value > current.value,
                Direction::Min => row.value < current.value,
            },
        };
        if better {
            best = Some(row);
        }
    }
    best.map(|row| BestValue {
        value: row.value,
        step: row.step,
    })
}

/// Plain-text report: a heading naming `source`, then one line per entry.
pub fn format_report(source: &str, entries: &[SummaryEntry]) -> String {
    let mut out = format!("Results for {source}:\n");
    for entry in entries {
        let _ = writeln!(out, "{entry}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, u64, f64)]) -> TidyTable {
        TidyTable::from_rows(
            rows.iter()
                .map(|&(tag, step, value)| ScalarEvent::new(tag, step, 0.0, value))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn max_tie_goes_to_lowest_step() {
        let t = table(&[("test_acc", 1, 0.5), ("test_acc", 2, 0.9), ("test_acc", 3, 0.9)]);
        let entries = summarize(&t, &[MetricSpec::new("test_acc", "Test Accuracy", Direction::Max)]);
        assert_eq!(entries[0].best_value(), Some(0.9));
        assert_eq!(entries[0].best_step(), Some(2));
    }

    #[test]
    fn min_picks_least_value() {
        let t = table(&[("loss", 1, 2.0), ("loss", 2, 0.5), ("loss", 3, 0.7), ("loss", 4, 0.5)]);
        let entries = summarize(&t, &[MetricSpec::new("loss", "Loss", Direction::Min)]);
        assert_eq!(entries[0].best, Some(BestValue { value: 0.5, step: 2 }));
    }

    #[test]
    fn absent_tag_yields_empty_entry_in_spec_order() {
        let t = table(&[("train_loss", 1, 1.0), ("test_acc", 1, 0.3)]);
        let specs = [
            MetricSpec::new("train_loss", "Training Loss", Direction::Min),
            MetricSpec::new("test_acc_top5", "Test Top-5 Accuracy", Direction::Max),
            MetricSpec::new("test_acc", "Test Accuracy", Direction::Max),
        ];
        let entries = summarize(&t, &specs);
        let names: Vec<&str> = entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["Training Loss", "Test Top-5 Accuracy", "Test Accuracy"]);
        assert!(entries[1].best.is_none());
        assert_eq!(entries[2].best_value(), Some(0.3));
    }

    #[test]
    fn nan_values_never_win() {
        let t = table(&[("loss", 1, f64::NAN), ("loss", 2, 3.0), ("only_nan", 1, f64::NAN)]);
        let entries = summarize(
            &t,
            &[
                MetricSpec::new("loss", "Loss", Direction::Min),
                MetricSpec::new("only_nan", "Broken", Direction::Max),
            ],
        );
        assert_eq!(entries[0].best, Some(BestValue { value: 3.0, step: 2 }));
        assert!(entries[1].best.is_none());
    }

    #[test]
    fn report_lists_every_entry() {
        let t = table(&[("train_loss", 4, 0.12346)]);
        let entries = summarize(
            &t,
            &[
                MetricSpec::new("train_loss", "Training Loss", Direction::Min),
                MetricSpec::new("test_acc", "Test Accuracy", Direction::Max),
            ],
        );
        assert_eq!(
            format_report("run.csv", &entries),
            "Results for run.csv:\n- Training Loss: 0.1235 at epoch 4\n  Test Accuracy: N/A (tag missing)\n"
        );
    }
}
