use std::fs::File;
use std::path::Path;

use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::EraError;
use crate::parser::{ParseContext, ParseSummary, persist_rows};
use crate::store::ResultsStore;
use crate::table::TableReader;

pub const TABULAR_SUFFIX: &str = ".csv";

pub fn is_tabular(name: &str) -> bool {
    name.to_lowercase().ends_with(TABULAR_SUFFIX)
}

/// Ingests every CSV entry of the archive in archive order.
///
/// Cancellation is checked between entries, so an entry is either stored in
/// full or not at all. Rows already stored stay stored when a later entry
/// fails or the parse is cancelled.
pub fn extract_archive<S: ResultsStore + ?Sized>(
    archive_path: &Path,
    county_id: &str,
    store: &S,
    ctx: &ParseContext<'_>,
) -> Result<ParseSummary, EraError> {
    let file = File::open(archive_path).map_err(|err| {
        EraError::Archive(format!("open zip {}: {err}", archive_path.display()))
    })?;
    let mut archive = ZipArchive::new(file).map_err(|err| EraError::Archive(err.to_string()))?;
    info!(entries = archive.len(), "opened archive");

    let mut summary = ParseSummary::default();
    for i in 0..archive.len() {
        ctx.check()?;
        let entry = archive
            .by_index(i)
            .map_err(|err| EraError::Archive(err.to_string()))?;
        let name = entry.name().to_string();
        if entry.is_dir() || !is_tabular(&name) {
            debug!(entry = %name, "skipping non-tabular entry");
            summary.skipped_entries += 1;
            continue;
        }

        info!(entry = %name, county = county_id, "processing tabular entry");
        store.ensure_collection(county_id)?;
        let rows_before = summary.rows_read;
        TableReader::new(entry, county_id)
            .and_then(|reader| persist_rows(reader, store, &mut summary))
            .map_err(|err| in_entry(&name, err))?;
        summary.tabular_entries += 1;

        let rows = summary.rows_read - rows_before;
        info!(entry = %name, rows, "finished tabular entry");
        ctx.event(format!("entry.done name={name} rows={rows}"));
    }
    Ok(summary)
}

fn in_entry(name: &str, err: EraError) -> EraError {
    match err {
        EraError::HeaderRead(message) => EraError::HeaderRead(format!("{name}: {message}")),
        EraError::RowRead(message) => EraError::RowRead(format!("{name}: {message}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabular_suffix_is_case_insensitive() {
        assert!(is_tabular("results/summary.csv"));
        assert!(is_tabular("SUMMARY.CSV"));
        assert!(!is_tabular("summary.csv.txt"));
        assert!(!is_tabular("readme.txt"));
    }
}
