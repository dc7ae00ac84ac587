pub mod history_import;
pub mod metric_keys;

pub use history_import::{ImportError, ImportOutcome, parse_history};
pub use metric_keys::{ParsedMetrics, TrackFlags, parse_metrics, step_title};
