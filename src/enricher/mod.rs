//! Time-windowed selection and multi-pass spatial enrichment.

pub mod orchestrator;
pub mod pairwise;
pub mod reconciler;
pub mod report;
pub mod selector;
pub mod session;

pub use orchestrator::enrich_multiple;
pub use pairwise::enrich_points;
pub use reconciler::{reconcile, Reconciliation};
pub use report::{ConfigWarning, EnrichmentReport};
pub use selector::{select_window, select_yesterday};
pub use session::Session;
