use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the load and write phases.
#[derive(Debug, Error)]
pub enum SplitError {
    // ── Input ─────────────────────────────────────────────────────────────
    #[error("cannot open input file {}: {source}", .path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("input file {} has no header row", .path.display())]
    EmptyInput { path: PathBuf },

    #[error("column {column:?} not found in header of {}", .path.display())]
    ColumnNotFound { column: String, path: PathBuf },

    #[error(
        "malformed row at {}:{line}: expected {expected} fields, found {found}",
        .path.display()
    )]
    MalformedRow {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    // ── Output ────────────────────────────────────────────────────────────
    #[error("cannot create output directory {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
