use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::repository::RepositoryError;
use crate::resolve::ConflictReport;

#[derive(Error, Debug)]
pub enum ImagoError {
    #[error("invalid version specifier: {0}")]
    Parse(#[from] imago_semver::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("resolution cancelled")]
    Cancelled,

    #[error("failed to read {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse JSON in {path:?}: {source}")]
    ParseJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid image document: {reason}")]
    Document { reason: String },

    #[error("invalid image specifier: {reason}")]
    Specifier { reason: String },
}

/// Aggregate resolution failure: every conflict the search surfaced, plus a
/// Graphviz rendering of the candidate graph for offline inspection.
#[derive(Debug)]
pub struct DependencyError {
    pub conflicts: Vec<ConflictReport>,
    pub diagnostic: String,
}

impl fmt::Display for DependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "image could not be resolved");
        }

        for (i, conflict) in self.conflicts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", conflict.message)?;
        }

        Ok(())
    }
}

impl std::error::Error for DependencyError {}
