//! Reading and writing scalar event logs.
//!
//! A run directory holds one or more files named
//! `events.out.tfevents.<timestamp>.<host>`. Each file is a sequence of
//! framed records:
//!
//! ```text
//! u64 length (LE) | u32 masked crc32c(length) | payload | u32 masked crc32c(payload)
//! ```
//!
//! and every payload is a protobuf `Event`.

use std::collections::{BTreeMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use prost::Message;

use super::model::ScalarEvent;
use super::proto::{self, event, summary};
use crate::error::{Error, Result};

/// File-name prefix shared by every event-log file.
pub const EVENT_FILE_PREFIX: &str = "events.out.tfevents.";

const FILE_VERSION: &str = "brain.Event:2";
const CRC_MASK_DELTA: u32 = 0xa282_ead8;
const LENGTH_LEN: usize = 8;
const CRC_LEN: usize = 4;
/// Upper bound on a single record payload; anything larger is corruption.
const MAX_RECORD_LEN: u64 = 256 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Record framing
// ---------------------------------------------------------------------------

fn masked_crc(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(CRC_MASK_DELTA)
}

/// Frame `payload` as a single record.
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() as u64).to_le_bytes();
    let mut out = Vec::with_capacity(LENGTH_LEN + 2 * CRC_LEN + payload.len());
    out.extend_from_slice(&len);
    out.extend_from_slice(&masked_crc(&len).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&masked_crc(payload).to_le_bytes());
    out
}

/// Why reading a file stopped before its natural end.
#[derive(Debug, PartialEq, Eq)]
enum RecordError {
    Truncated,
    CrcMismatch,
    Oversized(u64),
}

/// Sequential reader over the framed records of one file.
struct RecordReader<R> {
    inner: R,
}

impl<R: Read> RecordReader<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }

    /// `Ok(None)` on a clean end of file.
    fn next_record(&mut self) -> io::Result<std::result::Result<Option<Vec<u8>>, RecordError>> {
        let mut header = [0u8; LENGTH_LEN + CRC_LEN];
        match read_full(&mut self.inner, &mut header)? {
            0 => return Ok(Ok(None)),
            n if n < header.len() => return Ok(Err(RecordError::Truncated)),
            _ => {}
        }

        let (len_bytes, len_crc) = header.split_at(LENGTH_LEN);
        if masked_crc(len_bytes) != u32::from_le_bytes([len_crc[0], len_crc[1], len_crc[2], len_crc[3]]) {
            return Ok(Err(RecordError::CrcMismatch));
        }
        let mut len = [0u8; LENGTH_LEN];
        len.copy_from_slice(len_bytes);
        let len = u64::from_le_bytes(len);
        let len = match usize::try_from(len) {
            Ok(n) if len <= MAX_RECORD_LEN => n,
            _ => return Ok(Err(RecordError::Oversized(len))),
        };

        let mut body = vec![0u8; len + CRC_LEN];
        if read_full(&mut self.inner, &mut body)? < body.len() {
            return Ok(Err(RecordError::Truncated));
        }
        let crc_bytes = body.split_off(len);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if masked_crc(&body) != expected {
            return Ok(Err(RecordError::CrcMismatch));
        }
        Ok(Ok(Some(body)))
    }
}

/// Fill `buf` as far as the reader allows; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut offset = 0;
    while offset < buf.len() {
        match reader.read(&mut buf[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(offset)
}

// ---------------------------------------------------------------------------
// EventLog – all scalars of one run
// ---------------------------------------------------------------------------

/// Every scalar event of a run directory, grouped by tag.
///
/// Events of a tag keep the order in which they were logged: files in name
/// order, records in file order.
#[derive(Debug, Clone)]
pub struct EventLog {
    dir: PathBuf,
    files: Vec<PathBuf>,
    scalars: BTreeMap<String, Vec<ScalarEvent>>,
}

impl EventLog {
    /// Open a run directory and load every scalar event from its event files.
    ///
    /// Fails with [`Error::NotFound`] before reading anything if the directory
    /// is missing or contains no event file.
    pub fn open(dir: &Path) -> Result<Self> {
        let files = find_event_files(dir)?;
        let mut scalars: BTreeMap<String, Vec<ScalarEvent>> = BTreeMap::new();
        for file in &files {
            load_file(file, &mut scalars)?;
        }
        info!(
            "loaded {} scalar events across {} tags from {}",
            scalars.values().map(Vec::len).sum::<usize>(),
            scalars.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            scalars,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Scalar tags present in the log, sorted.
    pub fn available_tags(&self) -> Vec<&str> {
        self.scalars.keys().map(String::as_str).collect()
    }

    /// Events of `tag` in logging order.
    pub fn scalars(&self, tag: &str) -> Option<&[ScalarEvent]> {
        self.scalars.get(tag).map(Vec::as_slice)
    }
}

/// List the event files of a run directory in name order.
pub fn find_event_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::not_found("run directory", dir));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(EVENT_FILE_PREFIX) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    if files.is_empty() {
        return Err(Error::not_found("event file (events.out.tfevents.*)", dir));
    }
    files.sort();
    Ok(files)
}

fn load_file(path: &Path, scalars: &mut BTreeMap<String, Vec<ScalarEvent>>) -> Result<()> {
    let mut reader = RecordReader::new(BufReader::new(File::open(path)?));
    // Tensor summaries only carry plugin metadata on a tag's first value.
    let mut tensor_scalar_tags: HashSet<String> = HashSet::new();
    let mut records = 0usize;

    loop {
        let payload = match reader.next_record()? {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(RecordError::Truncated) => {
                warn!(
                    "truncated record in {} after {records} records, ignoring the rest",
                    path.display()
                );
                break;
            }
            Err(RecordError::CrcMismatch) => {
                warn!(
                    "CRC mismatch in {} after {records} records, ignoring the rest",
                    path.display()
                );
                break;
            }
            Err(RecordError::Oversized(len)) => {
                warn!(
                    "record of {len} bytes in {} after {records} records exceeds the limit, ignoring the rest",
                    path.display()
                );
                break;
            }
        };
        records += 1;

        let event = match proto::Event::decode(payload.as_slice()) {
            Ok(event) => event,
            Err(e) => {
                warn!("skipping undecodable record {records} in {}: {e}", path.display());
                continue;
            }
        };
        let Some(event::What::Summary(summary)) = event.what else {
            continue;
        };
        let Ok(step) = u64::try_from(event.step) else {
            warn!("dropping event with negative step {} in {}", event.step, path.display());
            continue;
        };

        for value in summary.value {
            let Some(v) = scalar_of(&value, &mut tensor_scalar_tags) else {
                continue;
            };
            scalars
                .entry(value.tag.clone())
                .or_default()
                .push(ScalarEvent::new(value.tag, step, event.wall_time, v));
        }
    }
    debug!("read {records} records from {}", path.display());
    Ok(())
}

fn scalar_of(value: &summary::Value, tensor_scalar_tags: &mut HashSet<String>) -> Option<f64> {
    match value.value.as_ref()? {
        summary::value::Value::SimpleValue(v) => Some(f64::from(*v)),
        summary::value::Value::Tensor(tensor) => {
            if value.metadata.as_ref().is_some_and(|m| m.is_scalar()) {
                tensor_scalar_tags.insert(value.tag.clone());
            }
            if tensor_scalar_tags.contains(&value.tag) {
                tensor.scalar_value()
            } else {
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventWriter
// ---------------------------------------------------------------------------

/// Appends scalar events to a fresh event file in a run directory.
pub struct EventWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl EventWriter {
    /// Create `events.out.tfevents.<unix-seconds>.<host>.<pid>.<n>` under
    /// `dir`, where `n` counts writers created by this process.
    pub fn create(dir: &Path) -> Result<Self> {
        static WRITERS: AtomicU64 = AtomicU64::new(0);

        std::fs::create_dir_all(dir)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let pid = std::process::id();
        let n = WRITERS.fetch_add(1, Ordering::Relaxed);
        Self::create_named(&dir.join(format!("{EVENT_FILE_PREFIX}{now}.{host}.{pid}.{n}")))
    }

    /// Create a new event file at an explicit path and write the version
    /// header. Fails if the file already exists.
    pub fn create_named(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let mut writer = Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        };
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        writer.write_event(&proto::Event {
            wall_time,
            step: 0,
            what: Some(event::What::FileVersion(FILE_VERSION.to_string())),
        })?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_scalar(&mut self, tag: &str, step: u64, wall_time: f64, value: f32) -> Result<()> {
        let step = i64::try_from(step)
            .map_err(|_| Error::InvalidArgument(format!("step {step} does not fit the log format")))?;
        self.write_event(&proto::Event {
            wall_time,
            step,
            what: Some(event::What::Summary(proto::Summary {
                value: vec![summary::Value {
                    tag: tag.to_string(),
                    metadata: None,
                    value: Some(summary::value::Value::SimpleValue(value)),
                }],
            })),
        })
    }

    /// Write an arbitrary event record.
    pub fn write_event(&mut self, event: &proto::Event) -> Result<()> {
        self.out.write_all(&encode_record(&event.encode_to_vec()))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!("failed to flush {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::proto::{PluginData, SummaryMetadata, TensorProto, DT_FLOAT, SCALARS_PLUGIN};

    fn tensor_event(step: i64, tag: &str, value: f32, with_metadata: bool) -> proto::Event {
        let metadata = with_metadata.then(|| SummaryMetadata {
            plugin_data: Some(PluginData {
                plugin_name: SCALARS_PLUGIN.to_string(),
                content: Vec::new(),
            }),
            ..Default::default()
        });
        proto::Event {
            wall_time: 100.0 + step as f64,
            step,
            what: Some(event::What::Summary(proto::Summary {
                value: vec![summary::Value {
                    tag: tag.to_string(),
                    metadata,
                    value: Some(summary::value::Value::Tensor(TensorProto {
                        dtype: DT_FLOAT,
                        tensor_content: value.to_le_bytes().to_vec(),
                        ..Default::default()
                    })),
                }],
            })),
        }
    }

    #[test]
    fn masked_crc_of_empty_payload() {
        // crc32c("") == 0, so the masked value is just the delta.
        assert_eq!(masked_crc(b""), CRC_MASK_DELTA);
    }

    #[test]
    fn record_reader_reads_back_framed_records() {
        let mut bytes = encode_record(b"first");
        bytes.extend(encode_record(b""));
        bytes.extend(encode_record(b"third"));

        let mut reader = RecordReader::new(bytes.as_slice());
        assert_eq!(reader.next_record().unwrap(), Ok(Some(b"first".to_vec())));
        assert_eq!(reader.next_record().unwrap(), Ok(Some(Vec::new())));
        assert_eq!(reader.next_record().unwrap(), Ok(Some(b"third".to_vec())));
        assert_eq!(reader.next_record().unwrap(), Ok(None));
    }

    #[test]
    fn record_reader_flags_truncation_and_corruption() {
        let full = encode_record(b"payload");
        let mut reader = RecordReader::new(&full[..full.len() - 2]);
        assert_eq!(reader.next_record().unwrap(), Err(RecordError::Truncated));

        let mut corrupt = full.clone();
        corrupt[LENGTH_LEN + CRC_LEN] ^= 0xff;
        let mut reader = RecordReader::new(corrupt.as_slice());
        assert_eq!(reader.next_record().unwrap(), Err(RecordError::CrcMismatch));
    }

    #[test]
    fn record_reader_rejects_oversized_length() {
        let len = u64::MAX.to_le_bytes();
        let mut bytes = len.to_vec();
        bytes.extend_from_slice(&masked_crc(&len).to_le_bytes());
        bytes.extend_from_slice(b"short");

        let mut reader = RecordReader::new(bytes.as_slice());
        assert_eq!(reader.next_record().unwrap(), Err(RecordError::Oversized(u64::MAX)));
    }

    #[test]
    fn writers_in_one_directory_never_clobber_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let first = {
            let mut w = EventWriter::create(dir.path()).unwrap();
            w.add_scalar("train_loss", 0, 1.0, 2.0).unwrap();
            w.path().to_path_buf()
        };
        let second = {
            let mut w = EventWriter::create(dir.path()).unwrap();
            w.add_scalar("train_loss", 1, 2.0, 1.0).unwrap();
            w.path().to_path_buf()
        };
        assert_ne!(first, second);
        assert!(EventWriter::create_named(&first).is_err());

        let log = EventLog::open(dir.path()).unwrap();
        assert_eq!(log.files().len(), 2);
        assert_eq!(log.scalars("train_loss").unwrap().len(), 2);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = EventLog::open(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn directory_without_event_files_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("events.out.tfevent"), "not quite").unwrap();
        let err = EventLog::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn reads_scalars_across_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w =
                EventWriter::create_named(&dir.path().join("events.out.tfevents.2.host")).unwrap();
            w.add_scalar("train_loss", 3, 30.0, 0.5).unwrap();
        }
        {
            let mut w =
                EventWriter::create_named(&dir.path().join("events.out.tfevents.1.host")).unwrap();
            w.add_scalar("train_loss", 1, 10.0, 1.5).unwrap();
            w.add_scalar("train_loss", 1, 11.0, 1.25).unwrap();
            w.add_scalar("test_acc", 1, 12.0, 0.75).unwrap();
        }

        let log = EventLog::open(dir.path()).unwrap();
        assert_eq!(log.files().len(), 2);
        assert_eq!(log.available_tags(), vec!["test_acc", "train_loss"]);
        let loss: Vec<(u64, f64)> = log
            .scalars("train_loss")
            .unwrap()
            .iter()
            .map(|e| (e.step, e.value))
            .collect();
        assert_eq!(loss, vec![(1, 1.5), (1, 1.25), (3, 0.5)]);
        assert!(log.scalars("bogus").is_none());
    }

    #[test]
    fn truncated_tail_keeps_earlier_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.out.tfevents.1.host");
        {
            let mut w = EventWriter::create_named(&path).unwrap();
            w.add_scalar("train_loss", 0, 1.0, 2.0).unwrap();
            w.add_scalar("train_loss", 1, 2.0, 1.0).unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, bytes).unwrap();

        let log = EventLog::open(dir.path()).unwrap();
        assert_eq!(log.scalars("train_loss").unwrap().len(), 1);
    }

    #[test]
    fn tensor_scalars_follow_first_metadata() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w =
                EventWriter::create_named(&dir.path().join("events.out.tfevents.1.host")).unwrap();
            w.write_event(&tensor_event(0, "test_acc", 0.5, true)).unwrap();
            w.write_event(&tensor_event(1, "test_acc", 0.75, false)).unwrap();
            // Never announced as a scalar, so it is not one.
            w.write_event(&tensor_event(1, "embedding", 9.0, false)).unwrap();
        }

        let log = EventLog::open(dir.path()).unwrap();
        assert_eq!(log.available_tags(), vec!["test_acc"]);
        let values: Vec<f64> = log
            .scalars("test_acc")
            .unwrap()
            .iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(values, vec![0.5, 0.75]);
    }

    #[test]
    fn negative_steps_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w =
                EventWriter::create_named(&dir.path().join("events.out.tfevents.1.host")).unwrap();
            w.write_event(&tensor_event(-1, "train_loss", 1.0, true)).unwrap();
            w.add_scalar("train_loss", 2, 1.0, 0.5).unwrap();
        }
        let log = EventLog::open(dir.path()).unwrap();
        let steps: Vec<u64> = log.scalars("train_loss").unwrap().iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![2]);
    }
}
