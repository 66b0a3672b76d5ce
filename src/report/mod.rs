/// Report layer: everything derived from tidy tables.
///
/// ```text
///   TidyTable ──► summary  best value per metric → text report
///       │
///       └──────► curves   one labeled curve per run → plot (PNG per metric)
/// ```

pub mod curves;
pub mod plot;
pub mod summary;
