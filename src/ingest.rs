//! Row ingestion
//!
//! The engine takes a header list plus rows of values. Splitting and
//! unquoting delimited text is the producer's job; [`read_csv`] is the
//! producer the command line uses.

use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{CellValue, Row};

/// Build tagged rows from a header list and value lists.
///
/// Headers are trimmed. A short record leaves the remaining headers out of its
/// row; values past the last header are ignored.
pub fn rows_from_records<H, R, V>(source: &str, headers: &[H], records: R) -> Vec<Row>
where
    H: AsRef<str>,
    R: IntoIterator<Item = Vec<V>>,
    V: Into<String>,
{
    records
        .into_iter()
        .map(|values| {
            let mut row = Row::new(Some(source.to_string()));
            for (header, value) in headers.iter().zip(values) {
                row.set(header.as_ref().trim(), CellValue::Text(value.into()));
            }
            row
        })
        .collect()
}

/// Read delimited text with a header line into rows tagged with `source`.
/// Blank lines are skipped; records may be shorter than the header. Input
/// without a non-blank header line is a parse error.
pub fn read_csv_from<T: Read>(source: &str, input: T) -> LedgerResult<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(LedgerError::Parse(format!(
            "source '{}' has no header line",
            source
        )));
    }

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        records.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }

    let rows = rows_from_records(source, &headers, records);
    debug!(source, headers = headers.len(), rows = rows.len(), "read delimited rows");
    Ok(rows)
}

/// Read a CSV file into rows tagged with `source`
pub fn read_csv(source: &str, path: &Path) -> LedgerResult<Vec<Row>> {
    let file = std::fs::File::open(path)?;
    read_csv_from(source, file)
}
