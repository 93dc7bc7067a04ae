pub mod backfill;
pub mod checkpoint;
pub mod daily;

pub use backfill::{run_backfill, BackfillError, BackfillOutcome};
pub use checkpoint::{Checkpoint, CheckpointError};
pub use daily::{run_daily, DailyOutcome};
