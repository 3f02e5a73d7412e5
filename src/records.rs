use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::config::{MalformedPolicy, SplitSettings};
use crate::error::SplitError;

pub type Header = StringRecord;
pub type Row = StringRecord;

/// Rows sharing one group key, in input order
#[derive(Debug, Clone)]
pub struct Group {
    pub key: String,
    pub rows: Vec<Row>,
}

/// Group key to rows, iterated in first-seen key order
#[derive(Debug, Default)]
pub struct GroupTable {
    slots: HashMap<String, usize>,
    groups: Vec<Group>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, row: Row) {
        match self.slots.get(key) {
            Some(&slot) => self.groups[slot].rows.push(row),
            None => {
                self.slots.insert(key.to_string(), self.groups.len());
                self.groups.push(Group {
                    key: key.to_string(),
                    rows: vec![row],
                });
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&Group> {
        self.slots.get(key).map(|&slot| &self.groups[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.key.as_str())
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of rows across all groups
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }
}

/// Result of the load phase
#[derive(Debug)]
pub struct LoadedTable {
    pub header: Header,
    pub column_index: usize,
    pub groups: GroupTable,
    /// Rows dropped under `MalformedPolicy::Skip`
    pub skipped: usize,
}

/// Read the whole input and group its rows by the configured column.
///
/// The file handle lives inside the reader and is released when this
/// function returns, on success or error.
pub fn load(settings: &SplitSettings) -> Result<LoadedTable, SplitError> {
    let path = settings.input.as_path();
    let not_found = |source: io::Error| SplitError::FileNotFound {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(not_found)?;
    if file.metadata().map_err(not_found)?.is_dir() {
        return Err(not_found(io::Error::new(
            io::ErrorKind::InvalidInput,
            "is a directory",
        )));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(settings.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let header = reader.headers().map_err(|e| parse_error(path, e))?.clone();
    if header.is_empty() {
        return Err(SplitError::EmptyInput {
            path: path.to_path_buf(),
        });
    }

    let column_index = header
        .iter()
        .position(|name| name == settings.column)
        .ok_or_else(|| SplitError::ColumnNotFound {
            column: settings.column.clone(),
            path: path.to_path_buf(),
        })?;

    let mut groups = GroupTable::new();
    let mut skipped = 0;

    for result in reader.records() {
        let row = result.map_err(|e| parse_error(path, e))?;

        if row.len() != header.len() {
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            match settings.on_malformed {
                MalformedPolicy::Fail => {
                    return Err(SplitError::MalformedRow {
                        path: path.to_path_buf(),
                        line,
                        expected: header.len(),
                        found: row.len(),
                    });
                }
                MalformedPolicy::Skip => {
                    tracing::warn!(
                        line,
                        expected = header.len(),
                        found = row.len(),
                        "skipping malformed row"
                    );
                    skipped += 1;
                    continue;
                }
            }
        }

        let key = row.get(column_index).unwrap_or_default().to_string();
        groups.push(&key, row);
    }

    tracing::info!(
        path = %path.display(),
        rows = groups.row_count(),
        groups = groups.len(),
        skipped,
        "loaded input"
    );

    Ok(LoadedTable {
        header,
        column_index,
        groups,
        skipped,
    })
}

fn parse_error(path: &Path, source: csv::Error) -> SplitError {
    SplitError::Parse {
        path: path.to_path_buf(),
        source,
    }
}
