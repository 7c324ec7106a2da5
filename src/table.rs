use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use csv::{ByteRecord, ByteRecordsIntoIter, ReaderBuilder};

use crate::coerce::{parse_percentage, parse_vote_count};
use crate::domain::RawEntry;
use crate::error::EraError;

pub const CONTEST_NAME: &str = "contest name";
pub const CHOICE_NAME: &str = "choice name";
pub const TOTAL_VOTES: &str = "total votes";
pub const PERCENT_OF_VOTES: &str = "percent of votes";

/// Case-insensitive header to column lookup shared by every tabular source.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    headers: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|header| header.as_ref().to_lowercase())
            .collect();
        let positions = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| (header.clone(), idx))
            .collect();
        Self { headers, positions }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn position(&self, header: &str) -> Option<usize> {
        self.positions.get(&header.to_lowercase()).copied()
    }

    /// Missing columns and cells past the end of a short row read as "".
    pub fn cell<'r>(&self, row: &[&'r str], header: &str) -> &'r str {
        self.position(header)
            .and_then(|idx| row.get(idx).copied())
            .unwrap_or("")
    }

    pub fn entry(&self, row: &[&str], county_id: &str) -> RawEntry {
        let raw: BTreeMap<String, String> = self
            .headers
            .iter()
            .zip(row.iter())
            .map(|(header, value)| (header.clone(), (*value).to_string()))
            .collect();

        RawEntry {
            county_id: county_id.to_string(),
            title: self.cell(row, CONTEST_NAME).to_string(),
            choice_name: self.cell(row, CHOICE_NAME).to_string(),
            votes: parse_vote_count(self.cell(row, TOTAL_VOTES)),
            percentage: parse_percentage(self.cell(row, PERCENT_OF_VOTES)),
            raw,
        }
    }
}

/// Cells that are not valid UTF-8 are decoded lossily instead of failing
/// the row.
fn decode_cells(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|cell| String::from_utf8_lossy(cell).into_owned())
        .collect()
}

/// Streams one CSV source as [`RawEntry`] values. Consumes the source once.
pub struct TableReader<R: Read> {
    records: ByteRecordsIntoIter<R>,
    headers: HeaderIndex,
    county_id: String,
    row: usize,
}

impl<R: Read> TableReader<R> {
    pub fn new(source: R, county_id: &str) -> Result<Self, EraError> {
        let mut records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(source)
            .into_byte_records();

        let first = records
            .next()
            .ok_or_else(|| EraError::HeaderRead("table is empty".to_string()))?
            .map_err(|err| EraError::HeaderRead(err.to_string()))?;
        let headers = HeaderIndex::new(decode_cells(&first));

        Ok(Self {
            records,
            headers,
            county_id: county_id.to_string(),
            row: 0,
        })
    }

    pub fn headers(&self) -> &HeaderIndex {
        &self.headers
    }
}

impl<R: Read> Iterator for TableReader<R> {
    type Item = Result<RawEntry, EraError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.row += 1;
        Some(
            record
                .map_err(|err| EraError::RowRead(format!("row {}: {err}", self.row)))
                .map(|record| {
                    let cells = decode_cells(&record);
                    let cells: Vec<&str> = cells.iter().map(String::as_str).collect();
                    self.headers.entry(&cells, &self.county_id)
                }),
        )
    }
}

pub fn read_all<R: Read>(source: R, county_id: &str) -> Result<TableReader<R>, EraError> {
    TableReader::new(source, county_id)
}
