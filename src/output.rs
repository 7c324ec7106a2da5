use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    BulkParseSummary, CleanupResult, DirectBulkSummary, GroupedResults, ImportResult,
    ParseResult, ResultsView,
};
use crate::domain::CountyLink;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_parse(result: &ParseResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_bulk(result: &BulkParseSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_direct_bulk(result: &DirectBulkSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_results(result: &ResultsView) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_groups(result: &GroupedResults) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cleanup(result: &CleanupResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_links(links: &[CountyLink]) -> io::Result<()> {
        Self::print_json(&links)
    }

    pub fn print_import(result: &ImportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

/// Forwards progress events to the log.
pub struct LogSink;

impl crate::app::ProgressSink for LogSink {
    fn event(&self, event: crate::app::ProgressEvent) {
        let elapsed_ms = event.elapsed.map(|elapsed| elapsed.as_millis()).unwrap_or(0);
        tracing::debug!(elapsed_ms, "{}", event.message);
    }
}
