use std::process::ExitCode;

use crate::batch::{BackfillError, CheckpointError};
use crate::config::ConfigError;
use crate::enricher::EnrichmentReport;
use crate::toolkit::ToolkitError;

/// Process exit status of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    /// A toolkit operation failed and the run was aborted
    ToolkitFailure = 1,
    /// The run could not start: bad configuration or checkpoint
    InvalidConfiguration = 2,
    /// Completed, but keep fields were missing or ambiguous, or spatial
    /// references differed
    ConfigurationWarnings = 3,
    /// Completed after stepping around objects left by an earlier run
    StaleWorkspace = 4,
}

impl ExitStatus {
    pub fn from_report(report: &EnrichmentReport) -> Self {
        if report.has_config_warnings() {
            Self::ConfigurationWarnings
        } else if report.has_stale_objects() {
            Self::StaleWorkspace
        } else {
            Self::Success
        }
    }

    pub fn from_error(err: &anyhow::Error) -> Self {
        let failed_mid_run = err.chain().any(|cause| {
            cause.is::<ToolkitError>()
                || matches!(
                    cause.downcast_ref::<BackfillError>(),
                    Some(BackfillError::CheckpointSave { .. })
                )
        });

        if failed_mid_run {
            Self::ToolkitFailure
        } else if err
            .chain()
            .any(|cause| cause.is::<ConfigError>() || cause.is::<CheckpointError>())
        {
            Self::InvalidConfiguration
        } else {
            Self::ToolkitFailure
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}
