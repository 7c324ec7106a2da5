use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregate::{MeasureGroup, Race, group_candidates, group_measures};
use crate::domain::{COUNTY_LINKS_COLLECTION, CountyLink, ParseMethod, ResultType, county_id};
use crate::error::EraError;
use crate::parser::{ParseContext, ParseSummary};
use crate::registry::ParserRegistry;
use crate::store::{CountyLinkStore, ResultsStore, StoredResult};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    pub county_name: String,
    pub link: String,
    pub parse_method: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResultView {
    Measures,
    Candidates,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseResult {
    pub county_name: String,
    pub method: String,
    pub summary: ParseSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkParseSummary {
    pub method: String,
    pub total_counties: usize,
    pub successful: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountyOutcome {
    pub county_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectBulkSummary {
    pub results: Vec<CountyOutcome>,
    pub total: usize,
    pub successful: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub saved: Vec<CountyLink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsView {
    pub total: usize,
    pub results: Vec<StoredResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GroupedResults {
    Measures(Vec<MeasureGroup>),
    Candidates(Vec<Race>),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupResult {
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
}

/// Wires the parser registry to a store holding both county links and results.
pub struct App<S: ResultsStore + CountyLinkStore> {
    store: Arc<S>,
    registry: ParserRegistry,
}

impl<S: ResultsStore + CountyLinkStore> App<S> {
    pub fn new(store: Arc<S>, registry: ParserRegistry) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &S {
        self.store.as_ref()
    }

    pub fn save_link(&self, link: &CountyLink) -> Result<CountyLink, EraError> {
        link.validate()?;
        self.store.save_link(link)
    }

    pub fn update_link(&self, id: &str, link: &CountyLink) -> Result<CountyLink, EraError> {
        link.validate()?;
        self.store.update_link(id, link)
    }

    pub fn delete_link(&self, id: &str) -> Result<(), EraError> {
        self.store.delete_link(id)
    }

    pub fn list_links(&self) -> Result<Vec<CountyLink>, EraError> {
        self.store.list_links()
    }

    /// Validates every link before saving any; one invalid link rejects the
    /// batch. Failures while saving are collected per link.
    pub fn import_links(&self, links: &[CountyLink]) -> Result<ImportResult, EraError> {
        for (idx, link) in links.iter().enumerate() {
            link.validate().map_err(|err| {
                EraError::Validation(format!("invalid link at index {idx}: {err}"))
            })?;
        }

        let mut saved = Vec::new();
        let mut errors = Vec::new();
        for (idx, link) in links.iter().enumerate() {
            match self.store.save_link(link) {
                Ok(link) => saved.push(link),
                Err(err) => errors.push(format!("failed to save link at index {idx}: {err}")),
            }
        }
        Ok(ImportResult { saved, errors })
    }

    /// Parses the stored link with the given id.
    pub fn parse_link(
        &mut self,
        id: &str,
        ctx: &ParseContext<'_>,
    ) -> Result<ParseResult, EraError> {
        let link = self.store.get_link(id)?;
        self.parse_direct(&link.county_name, &link.link, &link.parse_method, ctx)
    }

    pub fn parse_direct(
        &mut self,
        county_name: &str,
        url: &str,
        method: &str,
        ctx: &ParseContext<'_>,
    ) -> Result<ParseResult, EraError> {
        if county_name.is_empty() || url.is_empty() || method.is_empty() {
            return Err(EraError::Validation("missing required fields".to_string()));
        }
        let parser = self.registry.resolve(method)?;
        parser.set_county_name(county_name);
        let summary = parser.parse(ctx, url)?;
        Ok(ParseResult {
            county_name: county_name.to_string(),
            method: method.to_string(),
            summary,
        })
    }

    /// Parses every stored link configured with `method`, one county at a
    /// time. A county's failure is recorded and the rest still run; a
    /// cancellation stops the run.
    pub fn bulk_parse(
        &mut self,
        method: ParseMethod,
        ctx: &ParseContext<'_>,
    ) -> Result<BulkParseSummary, EraError> {
        let links = self.store.list_links()?;
        info!(method = %method, links = links.len(), "starting bulk parse");

        let mut summary = BulkParseSummary {
            method: method.to_string(),
            ..BulkParseSummary::default()
        };
        for link in links {
            if link.parse_method != method.as_str() {
                continue;
            }
            summary.total_counties += 1;

            match self.parse_direct(&link.county_name, &link.link, method.as_str(), ctx) {
                Ok(_) => {
                    summary.successful += 1;
                    info!(county = %link.county_name, "county processed");
                }
                Err(err) => {
                    let message = format!("County {}: {err}", link.county_name);
                    warn!("{message}");
                    summary.failed.push(message);
                    if matches!(err, EraError::Cancelled) {
                        break;
                    }
                }
            }
        }

        info!(
            total = summary.total_counties,
            successful = summary.successful,
            failed = summary.failed.len(),
            "bulk parse completed"
        );
        Ok(summary)
    }

    pub fn direct_bulk_parse(
        &mut self,
        requests: &[ParseRequest],
        ctx: &ParseContext<'_>,
    ) -> DirectBulkSummary {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let outcome = self.parse_direct(
                &request.county_name,
                &request.link,
                &request.parse_method,
                ctx,
            );
            results.push(CountyOutcome {
                county_name: request.county_name.clone(),
                success: outcome.is_ok(),
                error: outcome.err().map(|err| format!("failed to parse data: {err}")),
            });
        }
        let successful = results.iter().filter(|result| result.success).count();
        DirectBulkSummary {
            total: requests.len(),
            successful,
            results,
        }
    }

    /// Parses a source and returns the county's grouped results of one kind.
    pub fn parse_and_group(
        &mut self,
        request: &ParseRequest,
        view: ResultView,
        ctx: &ParseContext<'_>,
    ) -> Result<GroupedResults, EraError> {
        self.parse_direct(
            &request.county_name,
            &request.link,
            &request.parse_method,
            ctx,
        )?;
        self.grouped(&request.county_name, view)
    }

    pub fn results(
        &self,
        county_name: &str,
        filter: Option<ResultType>,
    ) -> Result<ResultsView, EraError> {
        let results = self.store.query(&county_id(county_name), filter)?;
        Ok(ResultsView {
            total: results.len(),
            results,
        })
    }

    pub fn measures(&self, county_name: &str) -> Result<Vec<MeasureGroup>, EraError> {
        let records = self
            .store
            .query(&county_id(county_name), Some(ResultType::Measure))?;
        Ok(group_measures(records.iter().map(|record| &record.result)))
    }

    pub fn candidates(&self, county_name: &str) -> Result<Vec<Race>, EraError> {
        let records = self
            .store
            .query(&county_id(county_name), Some(ResultType::Candidate))?;
        Ok(group_candidates(records.iter().map(|record| &record.result)))
    }

    pub fn grouped(&self, county_name: &str, view: ResultView) -> Result<GroupedResults, EraError> {
        match view {
            ResultView::Measures => self.measures(county_name).map(GroupedResults::Measures),
            ResultView::Candidates => self.candidates(county_name).map(GroupedResults::Candidates),
        }
    }

    /// Deletes every results collection. The county links table and
    /// underscore-prefixed system collections are kept.
    pub fn cleanup_collections(&self) -> Result<CleanupResult, EraError> {
        let mut result = CleanupResult::default();
        for name in self.store.list_collections()? {
            if name == COUNTY_LINKS_COLLECTION || name.starts_with('_') {
                result.skipped.push(name);
                continue;
            }
            info!(collection = %name, "deleting collection");
            self.store.delete_collection(&name)?;
            result.deleted.push(name);
        }
        info!(
            deleted = result.deleted.len(),
            skipped = result.skipped.len(),
            "cleanup completed"
        );
        Ok(result)
    }

    /// Releases parser scratch space.
    pub fn shutdown(&mut self) {
        self.registry.cleanup();
    }
}
