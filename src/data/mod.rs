/// Data layer: core types, event-log reading, tag filtering and table I/O.
///
/// Architecture:
/// ```text
///  run dir (events.out.tfevents.*)
///        │
///        ▼
///   ┌───────────┐
///   │ event_log  │  framed protobuf records → EventLog (tag → events)
///   └───────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  requested tags → TidyTable sorted by (tag, step)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  TidyTable ⇄ .csv / .json / .parquet
///   └──────────┘
/// ```

pub mod event_log;
pub mod filter;
pub mod loader;
pub mod model;
pub mod proto;
