//! JSON-lines reading for reference snapshots and record streams.

use crate::StoreError;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Iterator over the documents of a JSON-lines source. Blank lines are
/// skipped; every error carries the 1-based line number.
pub struct JsonLinesReader<R: BufRead> {
    path: PathBuf,
    lines: Lines<R>,
    line: usize,
}

impl JsonLinesReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path, BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesReader<R> {
    /// `path` is only used for error messages.
    pub fn new(path: &Path, reader: R) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesReader<R> {
    type Item = Result<Value, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line += 1;
            let line = match line {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(StoreError::Io {
                        path: self.path.clone(),
                        source,
                    }))
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&line).map_err(|source| StoreError::Parse {
                    path: self.path.clone(),
                    line: self.line,
                    source,
                }),
            );
        }
    }
}

/// Read a whole collection file.
///
/// `.json` files hold either one array of documents or a single document;
/// anything else is read as JSON lines.
pub fn read_documents(path: &Path) -> Result<Vec<Value>, StoreError> {
    let is_plain_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    if is_plain_json {
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        })?;
        return Ok(match value {
            Value::Array(docs) => docs,
            other => vec![other],
        });
    }

    JsonLinesReader::open(path)?.collect()
}
