use std::fmt;

/// A configuration problem that degrades the output without stopping the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Keep-list names found in neither joined dataset
    MissingKeepFields {
        target: String,
        join: String,
        fields: Vec<String>,
    },
    SpatialReferenceMismatch {
        join: String,
        target: String,
    },
    /// A keep-list field present in several datasets; the first one wins
    AmbiguousField { field: String, count: usize },
    /// A workspace object left over from an earlier run blocked a name
    StaleWorkspaceObject { name: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKeepFields {
                target,
                join,
                fields,
            } => write!(
                f,
                "Keep fields not in either dataset ({} / {}): {}",
                target,
                join,
                fields.join(",")
            ),
            Self::SpatialReferenceMismatch { join, target } => write!(
                f,
                "Spatial reference mismatch: join={}, target={}",
                join, target
            ),
            Self::AmbiguousField { field, count } => write!(
                f,
                "Field in multiple features: field={}, count={}",
                field, count
            ),
            Self::StaleWorkspaceObject { name } => {
                write!(f, "Stale workspace object from an earlier run: {}", name)
            }
        }
    }
}

/// Warnings collected over one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    warnings: Vec<ConfigWarning>,
}

impl EnrichmentReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a warning
    pub fn warn(&mut self, warning: ConfigWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    pub fn merge(&mut self, other: EnrichmentReport) {
        self.warnings.extend(other.warnings);
    }

    /// Missing, mismatched or ambiguous configuration was seen
    pub fn has_config_warnings(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| !matches!(w, ConfigWarning::StaleWorkspaceObject { .. }))
    }

    pub fn has_stale_objects(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::StaleWorkspaceObject { .. }))
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
