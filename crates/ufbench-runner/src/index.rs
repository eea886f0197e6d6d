//! The benchmark index: a CSV listing of every matrix in the collection.
//!
//! The file carries no id column. A matrix's id is its 1-based position among
//! rows that have exactly [`INDEX_FIELD_COUNT`] fields, so ids are only stable
//! for a given snapshot of the file.

use crate::error::{HarnessError, Result};
use crate::fetch::Fetcher;
use serde::Serialize;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

pub const INDEX_FILE_NAME: &str = "UFstats.csv";
pub const INDEX_FIELD_COUNT: usize = 12;

const FIELD_GROUP: usize = 0;
const FIELD_NAME: usize = 1;
const FIELD_ROWS: usize = 2;
const FIELD_COLS: usize = 3;
const FIELD_REAL: usize = 5;
const FIELD_SYMMETRIC: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    pub id: u32,
    pub group: String,
    pub name: String,
    pub rows: String,
    pub cols: String,
    /// Raw flag text; only the literal "1" means real.
    pub real: String,
    /// Raw flag text; only the literal "1" means symmetric.
    pub symmetric: String,
}

impl IndexRecord {
    fn from_fields(id: u32, mut fields: Vec<String>) -> Self {
        let mut take = |i: usize| std::mem::take(&mut fields[i]);
        IndexRecord {
            id,
            group: take(FIELD_GROUP),
            name: take(FIELD_NAME),
            rows: take(FIELD_ROWS),
            cols: take(FIELD_COLS),
            real: take(FIELD_REAL),
            symmetric: take(FIELD_SYMMETRIC),
        }
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn is_real(&self) -> bool {
        self.real == "1"
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric == "1"
    }
}

pub fn index_path(matrix_dir: &Path) -> PathBuf {
    matrix_dir.join(INDEX_FILE_NAME)
}

/// Downloads the index into `<matrix_dir>/UFstats.csv`. A failure here aborts
/// the run before any matrix is touched.
pub fn fetch_index(fetcher: &dyn Fetcher, index_url: &str, matrix_dir: &Path) -> Result<PathBuf> {
    let dest = index_path(matrix_dir);
    info!(url = index_url, "Downloading matrix index");
    fetcher.fetch(index_url, &dest)?;
    Ok(dest)
}

/// Splits one CSV line into fields. Double-quoted fields may contain commas;
/// a doubled quote inside a quoted field is a literal quote.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

pub fn is_data_row(fields: &[String]) -> bool {
    fields.len() == INDEX_FIELD_COUNT
}

/// The id the next valid row receives, given how many valid rows came before.
pub fn next_id(valid_rows_seen: u32) -> u32 {
    valid_rows_seen + 1
}

/// Lazily yields records in file order. Consumes the reader once; not restartable.
pub struct IndexRecords<R> {
    lines: std::io::Lines<R>,
    valid_rows_seen: u32,
    source: PathBuf,
}

impl<R: BufRead> IndexRecords<R> {
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            lines: reader.lines(),
            valid_rows_seen: 0,
            source: source.into(),
        }
    }
}

impl<R: BufRead> Iterator for IndexRecords<R> {
    type Item = Result<IndexRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(HarnessError::Index {
                        path: self.source.clone(),
                        source,
                    }))
                }
            };
            let fields = split_fields(line.trim_end_matches('\r'));
            if !is_data_row(&fields) {
                continue;
            }
            let id = next_id(self.valid_rows_seen);
            self.valid_rows_seen = id;
            return Some(Ok(IndexRecord::from_fields(id, fields)));
        }
    }
}

pub fn open_index(path: &Path) -> Result<IndexRecords<BufReader<fs::File>>> {
    let file = fs::File::open(path).map_err(|source| HarnessError::Index {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(IndexRecords::new(BufReader::new(file), path))
}
