//! The geoprocessing toolkit the pipeline drives.
//!
//! Spatial indexing, reprojection and join execution all happen behind the
//! [`Toolkit`] trait. The pipeline only names datasets, builds requests and
//! deletes what it creates.

pub mod field_map;
pub mod geojson;
pub mod memory;

use crate::domain::{Field, SpatialReference, TimeWindow};
use crate::domain::window::TIMESTAMP_FORMAT;

pub use field_map::{FieldInput, FieldMap, FieldMappings};
pub use memory::MemoryWorkspace;

/// Bookkeeping field holding the number of join features matched per target row
pub const JOIN_COUNT_FIELD: &str = "Join_Count";
/// Bookkeeping field holding the row id of the target feature
pub const TARGET_FID_FIELD: &str = "TARGET_FID";

/// Failure class of a toolkit operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidQuery,
    Schema,
    Io,
    Format,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolkitError {
    #[error("dataset not found: {0}")]
    NotFound(String),

    #[error("object already exists in workspace: {0}")]
    AlreadyExists(String),

    #[error("invalid query on {table}: {reason}")]
    InvalidQuery { table: String, reason: String },

    #[error("field {field} not found in {dataset}")]
    FieldNotFound { dataset: String, field: String },

    #[error("cannot append {from} to {into}: {reason}")]
    SchemaMismatch {
        from: String,
        into: String,
        reason: String,
    },

    #[error("I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed feature data in {path}: {reason}")]
    Format { path: String, reason: String },
}

impl ToolkitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidQuery { .. } => ErrorKind::InvalidQuery,
            Self::FieldNotFound { .. } | Self::SchemaMismatch { .. } => ErrorKind::Schema,
            Self::Io { .. } => ErrorKind::Io,
            Self::Format { .. } => ErrorKind::Format,
        }
    }
}

/// Metadata returned by [`Toolkit::describe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub name: String,
    pub spatial_reference: SpatialReference,
}

/// Selects the rows of `table` whose `date_field` falls in `window`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    pub table: String,
    pub date_field: String,
    pub window: TimeWindow,
}

impl ViewQuery {
    pub fn new(table: impl Into<String>, date_field: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            table: table.into(),
            date_field: date_field.into(),
            window,
        }
    }

    /// SQL form of the query, for toolkits backed by a database and for logs
    pub fn to_sql(&self) -> String {
        format!(
            "select * from {table} where {field} >= '{start}' AND {field} {op} '{end}'",
            table = self.table,
            field = self.date_field,
            start = self.window.start.format(TIMESTAMP_FORMAT),
            op = self.window.upper_operator(),
            end = self.window.end.format(TIMESTAMP_FORMAT),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOperation {
    /// One output row per target row; join attributes come from the first match
    OneToOne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Target rows without a match are kept with null join attributes
    KeepAll,
    /// Target rows without a match are dropped
    KeepCommon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaCheck {
    /// Source and destination must have the same fields
    Test,
    /// Same-named fields are matched, the rest is dropped or left null
    NoTest,
}

#[derive(Debug, Clone)]
pub struct SpatialJoinRequest {
    pub target: String,
    pub join: String,
    pub output: String,
    pub operation: JoinOperation,
    pub match_policy: MatchPolicy,
    pub field_mappings: FieldMappings,
}

/// Operations the enrichment pipeline needs from a geoprocessing backend.
///
/// Datasets are referenced by name. Every object created through the
/// toolkit lives in a shared workspace until explicitly deleted.
pub trait Toolkit {
    /// Create a view named `name` over `workspace`/`query.table`
    fn create_filtered_view(
        &mut self,
        workspace: &str,
        name: &str,
        query: &ViewQuery,
    ) -> Result<String, ToolkitError>;

    /// Whether an object called `name` exists in the workspace
    fn exists(&self, name: &str) -> bool;

    fn describe(&mut self, dataset: &str) -> Result<Description, ToolkitError>;

    fn list_fields(&mut self, dataset: &str) -> Result<Vec<Field>, ToolkitError>;

    /// Join `request.join` onto `request.target`, writing `request.output`.
    ///
    /// The output always carries [`JOIN_COUNT_FIELD`] and [`TARGET_FID_FIELD`]
    /// ahead of the mapped fields.
    fn spatial_join(&mut self, request: &SpatialJoinRequest) -> Result<String, ToolkitError>;

    fn delete_field(&mut self, dataset: &str, fields: &[&str]) -> Result<(), ToolkitError>;

    fn delete(&mut self, name: &str) -> Result<(), ToolkitError>;

    fn append(
        &mut self,
        source: &str,
        destination: &str,
        schema_check: SchemaCheck,
    ) -> Result<(), ToolkitError>;

    /// Write all features of `source` to `destination`, replacing it
    fn copy_features(&mut self, source: &str, destination: &str) -> Result<(), ToolkitError>;

    fn get_count(&mut self, dataset: &str) -> Result<usize, ToolkitError>;
}
