use std::collections::BTreeSet;

use log::debug;

use super::event_log::EventLog;
use super::model::{ScalarEvent, TidyTable};
use crate::error::{Error, Result};

/// Build the tidy table of `requested` tags from an event log.
///
/// Tags missing from the log are skipped; only when none of them exist does
/// this fail, with [`Error::NoMatchingTags`] listing what the log does have.
/// A tag requested twice contributes its events once, unlike a plain
/// per-request append, which would repeat them.
pub fn build_tidy_table(log: &EventLog, requested: &[String]) -> Result<TidyTable> {
    if requested.is_empty() {
        return Err(Error::InvalidArgument(
            "at least one tag must be requested".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut rows: Vec<ScalarEvent> = Vec::new();
    for tag in requested {
        if !seen.insert(tag.as_str()) {
            continue;
        }
        match log.scalars(tag) {
            Some(events) => rows.extend_from_slice(events),
            None => debug!("tag '{tag}' not present in {}", log.dir().display()),
        }
    }

    if rows.is_empty() {
        return Err(Error::NoMatchingTags {
            source_path: log.dir().to_path_buf(),
            requested: requested.to_vec(),
            available: log.available_tags().into_iter().map(str::to_string).collect(),
        });
    }

    TidyTable::from_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::event_log::EventWriter;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn sample_log() -> (tempfile::TempDir, EventLog) {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w =
                EventWriter::create_named(&dir.path().join("events.out.tfevents.1.host")).unwrap();
            w.add_scalar("train_loss", 2, 2.0, 0.75).unwrap();
            w.add_scalar("test_acc", 1, 1.5, 0.5).unwrap();
            w.add_scalar("train_loss", 1, 1.0, 1.0).unwrap();
            w.add_scalar("train_loss", 1, 1.1, 0.875).unwrap();
            w.add_scalar("lr", 1, 1.0, 0.125).unwrap();
        }
        let log = EventLog::open(dir.path()).unwrap();
        (dir, log)
    }

    #[test]
    fn keeps_only_requested_tags_in_tidy_order() {
        let (_dir, log) = sample_log();
        let table = build_tidy_table(&log, &tags(&["train_loss", "test_acc"])).unwrap();

        let rows: Vec<(&str, u64, f64)> = table
            .rows()
            .iter()
            .map(|r| (r.tag.as_str(), r.step, r.value))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("test_acc", 1, 0.5),
                ("train_loss", 1, 1.0),
                ("train_loss", 1, 0.875),
                ("train_loss", 2, 0.75),
            ]
        );
    }

    #[test]
    fn unknown_tags_are_skipped_silently() {
        let (_dir, log) = sample_log();
        let table = build_tidy_table(&log, &tags(&["train_loss", "bogus_tag"])).unwrap();
        assert!(table.rows().iter().all(|r| r.tag == "train_loss"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn duplicate_requests_do_not_duplicate_rows() {
        let (_dir, log) = sample_log();
        let table = build_tidy_table(&log, &tags(&["lr", "lr"])).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn no_match_reports_requested_and_available() {
        let (_dir, log) = sample_log();
        let err = build_tidy_table(&log, &tags(&["bogus_tag"])).unwrap_err();
        match err {
            Error::NoMatchingTags {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, tags(&["bogus_tag"]));
                assert_eq!(available, tags(&["lr", "test_acc", "train_loss"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_request_is_rejected() {
        let (_dir, log) = sample_log();
        assert!(matches!(
            build_tidy_table(&log, &[]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
