use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::archive::extract_archive;
use crate::domain::{ClassifiedResult, RawEntry, county_id};
use crate::error::{EraError, ParseStage};
use crate::fetch::SourceFetcher;
use crate::store::ResultsStore;
use crate::table::HeaderIndex;

/// Shared cancellation flag. Clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation, deadline and progress reporting for one parse invocation.
pub struct ParseContext<'a> {
    cancel: CancelToken,
    deadline: Option<Instant>,
    sink: &'a dyn ProgressSink,
    started: Instant,
}

impl<'a> ParseContext<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            cancel: CancelToken::new(),
            deadline: None,
            sink,
            started: Instant::now(),
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    pub fn check(&self) -> Result<(), EraError> {
        if self.is_cancelled() {
            return Err(EraError::Cancelled);
        }
        Ok(())
    }

    pub fn event(&self, message: String) {
        self.sink.event(ProgressEvent {
            message,
            elapsed: Some(self.started.elapsed()),
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseSummary {
    pub tabular_entries: usize,
    pub skipped_entries: usize,
    pub rows_read: usize,
    pub rows_stored: usize,
    pub rows_failed: usize,
}

/// One ingestion strategy, registered under its method name.
pub trait Parser: Send {
    fn method(&self) -> &str;

    /// Binds the county whose collection receives the parsed rows.
    fn set_county_name(&mut self, name: &str);

    fn parse(&mut self, ctx: &ParseContext<'_>, url: &str) -> Result<ParseSummary, EraError>;

    /// Releases scratch space. A later parse allocates it again.
    fn cleanup(&mut self) -> Result<(), EraError>;
}

/// Classifies and stores every row. Rows the store rejects are logged and
/// skipped; a row that cannot be read aborts the source.
pub(crate) fn persist_rows<S, I>(
    rows: I,
    store: &S,
    summary: &mut ParseSummary,
) -> Result<(), EraError>
where
    S: ResultsStore + ?Sized,
    I: IntoIterator<Item = Result<RawEntry, EraError>>,
{
    for row in rows {
        let entry = row?;
        summary.rows_read += 1;
        let result = ClassifiedResult::from_entry(&entry);
        debug!(
            contest = %result.contest_name,
            choice = %result.choice_name,
            kind = %result.result_type,
            votes = result.votes,
            "classified row"
        );
        match store.upsert(&entry.county_id, &result) {
            Ok(()) => summary.rows_stored += 1,
            Err(err) => {
                summary.rows_failed += 1;
                warn!(row = summary.rows_read, error = %err, "failed to store row, skipping");
            }
        }
        if summary.rows_read % 1000 == 0 {
            info!(rows = summary.rows_read, "processed rows");
        }
    }
    Ok(())
}

struct ScratchSpace {
    dir: Option<TempDir>,
}

impl ScratchSpace {
    fn new() -> Result<Self, EraError> {
        Ok(Self {
            dir: Some(Self::create_dir()?),
        })
    }

    fn create_dir() -> Result<TempDir, EraError> {
        tempfile::Builder::new()
            .prefix("election_data_")
            .tempdir()
            .map_err(|err| EraError::Filesystem(err.to_string()))
    }

    /// Removed from disk when the returned handle drops.
    fn file(&mut self, suffix: &str) -> Result<NamedTempFile, EraError> {
        if self.dir.is_none() {
            self.dir = Some(Self::create_dir()?);
        }
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| EraError::Filesystem("scratch directory unavailable".to_string()))?;
        tempfile::Builder::new()
            .prefix("download")
            .suffix(suffix)
            .tempfile_in(dir.path())
            .map_err(|err| EraError::Filesystem(err.to_string()))
    }

    fn release(&mut self) -> Result<(), EraError> {
        match self.dir.take() {
            Some(dir) => dir
                .close()
                .map_err(|err| EraError::Filesystem(err.to_string())),
            None => Ok(()),
        }
    }
}

fn bound_county(county: &Option<String>) -> Result<String, EraError> {
    county
        .clone()
        .ok_or_else(|| EraError::Validation("county name not set".to_string()))
}

fn download<F: SourceFetcher + ?Sized>(
    fetcher: &F,
    scratch: &mut ScratchSpace,
    ctx: &ParseContext<'_>,
    url: &str,
    suffix: &str,
) -> Result<NamedTempFile, EraError> {
    ctx.check()?;
    ctx.event("phase=Download".to_string());
    let file = scratch.file(suffix)?;
    fetcher.fetch(url, file.path())?;
    ctx.check()?;
    Ok(file)
}

/// Downloads a ZIP archive and ingests every CSV file inside it.
pub struct ZipParser<F: SourceFetcher, S: ResultsStore> {
    fetcher: F,
    store: Arc<S>,
    scratch: ScratchSpace,
    county: Option<String>,
}

impl<F: SourceFetcher, S: ResultsStore> ZipParser<F, S> {
    pub fn new(fetcher: F, store: Arc<S>) -> Result<Self, EraError> {
        Ok(Self {
            fetcher,
            store,
            scratch: ScratchSpace::new()?,
            county: None,
        })
    }
}

impl<F: SourceFetcher, S: ResultsStore> Parser for ZipParser<F, S> {
    fn method(&self) -> &str {
        "zip"
    }

    fn set_county_name(&mut self, name: &str) {
        self.county = Some(county_id(name));
    }

    fn parse(&mut self, ctx: &ParseContext<'_>, url: &str) -> Result<ParseSummary, EraError> {
        let county = bound_county(&self.county)?;
        info!(county = %county, url, "starting zip parse");

        let archive = download(&self.fetcher, &mut self.scratch, ctx, url, ".zip")
            .map_err(|err| EraError::at_stage(ParseStage::Download, err))?;

        ctx.event("phase=Process".to_string());
        let summary = extract_archive(archive.path(), &county, self.store.as_ref(), ctx)
            .map_err(|err| EraError::at_stage(ParseStage::Process, err))?;
        info!(
            county = %county,
            entries = summary.tabular_entries,
            stored = summary.rows_stored,
            failed = summary.rows_failed,
            "zip parse complete"
        );
        Ok(summary)
    }

    fn cleanup(&mut self) -> Result<(), EraError> {
        self.scratch.release()
    }
}

/// Downloads an HTML page and ingests every `<table>` whose first row
/// carries the result headers.
pub struct HtmlParser<F: SourceFetcher, S: ResultsStore> {
    fetcher: F,
    store: Arc<S>,
    scratch: ScratchSpace,
    county: Option<String>,
}

impl<F: SourceFetcher, S: ResultsStore> HtmlParser<F, S> {
    pub fn new(fetcher: F, store: Arc<S>) -> Result<Self, EraError> {
        Ok(Self {
            fetcher,
            store,
            scratch: ScratchSpace::new()?,
            county: None,
        })
    }
}

impl<F: SourceFetcher, S: ResultsStore> Parser for HtmlParser<F, S> {
    fn method(&self) -> &str {
        "html"
    }

    fn set_county_name(&mut self, name: &str) {
        self.county = Some(county_id(name));
    }

    fn parse(&mut self, ctx: &ParseContext<'_>, url: &str) -> Result<ParseSummary, EraError> {
        let county = bound_county(&self.county)?;
        info!(county = %county, url, "starting html parse");

        let page = download(&self.fetcher, &mut self.scratch, ctx, url, ".html")
            .map_err(|err| EraError::at_stage(ParseStage::Download, err))?;

        ctx.event("phase=Process".to_string());
        let summary = fs::read(page.path())
            .map_err(|err| EraError::Filesystem(err.to_string()))
            .and_then(|bytes| {
                let html = String::from_utf8_lossy(&bytes);
                ingest_tables(&html, &county, self.store.as_ref(), ctx)
            })
            .map_err(|err| EraError::at_stage(ParseStage::Process, err))?;
        info!(
            county = %county,
            tables = summary.tabular_entries,
            stored = summary.rows_stored,
            "html parse complete"
        );
        Ok(summary)
    }

    fn cleanup(&mut self) -> Result<(), EraError> {
        self.scratch.release()
    }
}

fn selector(css: &str) -> Result<Selector, EraError> {
    Selector::parse(css).map_err(|err| EraError::HeaderRead(format!("selector {css}: {err}")))
}

fn cell_texts(row: ElementRef<'_>, cells: &Selector) -> Vec<String> {
    row.select(cells)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}

fn ingest_tables<S: ResultsStore + ?Sized>(
    html: &str,
    county: &str,
    store: &S,
    ctx: &ParseContext<'_>,
) -> Result<ParseSummary, EraError> {
    let document = Html::parse_document(html);
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let cells = selector("th, td")?;

    let mut summary = ParseSummary::default();
    for (position, table) in document.select(&tables).enumerate() {
        ctx.check()?;
        let mut table_rows = table.select(&rows);
        let headers = match table_rows.next() {
            Some(row) => cell_texts(row, &cells),
            None => Vec::new(),
        };
        if headers.is_empty() {
            debug!(table = position, "skipping table without header row");
            summary.skipped_entries += 1;
            continue;
        }

        store.ensure_collection(county)?;
        let index = HeaderIndex::new(&headers);
        let entries: Vec<Result<RawEntry, EraError>> = table_rows
            .map(|row| {
                let texts = cell_texts(row, &cells);
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                Ok(index.entry(&refs, county))
            })
            .collect();
        let before = summary.rows_read;
        persist_rows(entries, store, &mut summary)?;
        summary.tabular_entries += 1;
        ctx.event(format!(
            "entry.done name=table[{position}] rows={}",
            summary.rows_read - before
        ));
    }
    Ok(summary)
}
