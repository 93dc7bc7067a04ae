use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to access checkpoint {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt checkpoint {path:?}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CheckpointState {
    last_completed_stop: NaiveDateTime,
}

/// Durable record of the last backfill window appended to the master table
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop timestamp of the last completed window, `None` before the first
    pub fn load(&self) -> Result<Option<NaiveDateTime>, CheckpointError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let state: CheckpointState =
            serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(Some(state.last_completed_stop))
    }

    /// Record `stop` as completed, replacing the file atomically
    pub fn save(&self, stop: NaiveDateTime) -> Result<(), CheckpointError> {
        let io_error = |source: std::io::Error| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };

        let content = serde_json::to_string_pretty(&CheckpointState {
            last_completed_stop: stop,
        })
        .map_err(|source| CheckpointError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content).map_err(io_error)?;
        std::fs::rename(&tmp, &self.path).map_err(io_error)
    }

    pub fn clear(&self) -> Result<(), CheckpointError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(CheckpointError::Io {
                path: self.path.clone(),
                source: e,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::parse_timestamp;

    #[test]
    fn test_missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path().join("backfill.json"));

        assert_eq!(checkpoint.load().unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path().join("backfill.json"));
        let stop = parse_timestamp("2002-03-31 12:00:00").unwrap();

        checkpoint.save(stop).unwrap();
        assert_eq!(checkpoint.load().unwrap(), Some(stop));

        checkpoint.clear().unwrap();
        assert_eq!(checkpoint.load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backfill.json");
        std::fs::write(&path, "not json").unwrap();

        let result = Checkpoint::new(path).load();
        assert!(matches!(result, Err(CheckpointError::Corrupt { .. })));
    }
}
