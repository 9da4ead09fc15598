//! Input rows and the strict reader that produces them.

use std::{
    fmt::{self, Display},
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use csv::{ErrorKind, StringRecord};
use serde::Deserialize;

use crate::{Error, Result};

/// Columns every input header must carry. `id` and anything else are ignored.
pub const REQUIRED_COLUMNS: [&str; 4] = [
    "prescriber_last_name",
    "prescriber_first_name",
    "drug_name",
    "drug_cost",
];

/// Line number of the first data row in a file that starts with a header.
pub const FIRST_DATA_LINE: u64 = 2;

#[derive(Debug, Deserialize)]
struct RawRecord {
    prescriber_last_name: String,
    prescriber_first_name: String,
    drug_name: String,
    drug_cost: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub last_name: String,
    pub first_name: String,
    pub drug_name: String,
    pub cost: f64,
}

impl Record {
    pub fn new(last_name: &str, first_name: &str, drug_name: &str, cost: f64) -> Self {
        Self {
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
            drug_name: drug_name.to_string(),
            cost,
        }
    }

    /// Splits the record into the drug it belongs to, its cost and who prescribed it.
    pub fn into_parts(self) -> (String, f64, PrescriberKey) {
        let prescriber = PrescriberKey::new(self.last_name, self.first_name);
        (self.drug_name, self.cost, prescriber)
    }
}

/// Identity of a prescriber. Displayed as `last,first`, but the two names are
/// kept apart so a comma inside a name cannot make two prescribers collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrescriberKey {
    last_name: String,
    first_name: String,
}

impl PrescriberKey {
    pub const SEPARATOR: char = ',';

    pub fn new(last_name: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
        }
    }
}

impl Display for PrescriberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.last_name, Self::SEPARATOR, self.first_name)
    }
}

/// Parses a drug cost. Anything that is not a finite, non-negative number is rejected.
pub fn parse_cost(field: &str) -> std::result::Result<f64, String> {
    let cost: f64 = field
        .trim()
        .parse()
        .map_err(|_| format!("drug_cost `{field}` is not a number"))?;
    if !cost.is_finite() || cost < 0.0 {
        return Err(format!("drug_cost `{field}` must be a finite, non-negative number"));
    }
    // folds -0.0 into 0.0
    Ok(cost + 0.0)
}

pub fn check_header(headers: &StringRecord, path: &Path) -> Result<()> {
    if headers.is_empty() {
        return Err(Error::EmptyInput {
            path: path.to_path_buf(),
        });
    }
    match REQUIRED_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|h| h == **column))
    {
        Some(&column) => Err(Error::MalformedHeader {
            path: path.to_path_buf(),
            column,
        }),
        None => Ok(()),
    }
}

/// Streams [`Record`]s out of a CSV with a header row, failing on the first bad row.
///
/// `source` and `first_line` only affect error reporting: a part file is read
/// from its own path, but errors point at the line of the original input.
/// `first_line` is where the first record after the header sits in `source`.
pub struct RecordReader<R> {
    reader: csv::Reader<R>,
    headers: StringRecord,
    row: StringRecord,
    source: PathBuf,
    first_line: u64,
    // csv line of the first record in this file
    base: u64,
}

impl RecordReader<BufReader<File>> {
    pub fn open(file: &Path, source: &Path, first_line: u64) -> Result<Self> {
        let rdr = File::open(file).map_err(|err| Error::io(file, err))?;
        Self::new(BufReader::new(rdr), source, first_line)
    }
}

impl<R: io::Read> RecordReader<R> {
    pub fn new(rdr: R, source: impl Into<PathBuf>, first_line: u64) -> Result<Self> {
        let source = source.into();
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(rdr);
        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(err) => return Err(Self::csv_error(&source, first_line, first_line, err)),
        };
        check_header(&headers, &source)?;
        // Lags one line behind on CRLF input, where the header's `\n` is
        // only consumed with the next record.
        let base = reader.position().line();
        Ok(Self {
            reader,
            headers,
            row: StringRecord::new(),
            source,
            first_line,
            base,
        })
    }

    fn original_line(first_line: u64, base: u64, line_in_file: u64) -> u64 {
        first_line + line_in_file.saturating_sub(base)
    }

    fn malformed(&self, reason: String) -> Error {
        let line = self.row.position().map_or(self.first_line, |pos| {
            Self::original_line(self.first_line, self.base, pos.line())
        });
        Error::MalformedRecord {
            path: self.source.clone(),
            line,
            reason,
        }
    }

    fn csv_error(source: &Path, first_line: u64, base: u64, err: csv::Error) -> Error {
        let line = err
            .position()
            .map_or(first_line, |pos| Self::original_line(first_line, base, pos.line()));
        match err.kind() {
            ErrorKind::UnequalLengths {
                expected_len, len, ..
            } => Error::MalformedRecord {
                path: source.to_path_buf(),
                line,
                reason: format!("expected {expected_len} fields, found {len}"),
            },
            ErrorKind::Utf8 { .. } => Error::MalformedRecord {
                path: source.to_path_buf(),
                line,
                reason: "record is not valid UTF-8".to_string(),
            },
            _ => Error::Csv {
                path: source.to_path_buf(),
                source: err,
            },
        }
    }

    fn decode(&self) -> Result<Record> {
        let raw: RawRecord = self
            .row
            .deserialize(Some(&self.headers))
            .map_err(|err| self.malformed(err.to_string()))?;
        if raw.drug_name.is_empty() {
            return Err(self.malformed("drug_name is empty".to_string()));
        }
        let cost = parse_cost(&raw.drug_cost).map_err(|reason| self.malformed(reason))?;
        Ok(Record {
            last_name: raw.prescriber_last_name,
            first_name: raw.prescriber_first_name,
            drug_name: raw.drug_name,
            cost,
        })
    }
}

impl<R: io::Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.row) {
            Ok(true) => Some(self.decode()),
            Ok(false) => None,
            Err(err) => Some(Err(Self::csv_error(
                &self.source,
                self.first_line,
                self.base,
                err,
            ))),
        }
    }
}
