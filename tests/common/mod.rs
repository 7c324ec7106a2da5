#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use era_results::app::{ProgressEvent, ProgressSink};
use era_results::error::EraError;
use era_results::fetch::SourceFetcher;
use era_results::parser::CancelToken;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const HEADER: &str = "Contest Name,Choice Name,Total Votes,Percent of Votes";

pub fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let files: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(name, content)| (*name, content.as_bytes()))
        .collect();
    build_zip_bytes(&files)
}

pub fn build_zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Serves canned bodies by URL and records every request.
#[derive(Clone, Default)]
pub struct MockFetcher {
    sources: Arc<HashMap<String, Vec<u8>>>,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(sources: Vec<(&str, Vec<u8>)>) -> Self {
        Self {
            sources: Arc::new(
                sources
                    .into_iter()
                    .map(|(url, body)| (url.to_string(), body))
                    .collect(),
            ),
            requests: Arc::default(),
        }
    }
}

impl SourceFetcher for MockFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, EraError> {
        self.requests.lock().unwrap().push(url.to_string());
        let body = self.sources.get(url).ok_or_else(|| EraError::FetchStatus {
            status: 404,
            message: "Not Found".to_string(),
        })?;
        std::fs::write(destination, body).map_err(|err| EraError::Filesystem(err.to_string()))?;
        Ok(body.len() as u64)
    }
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Cancels its token once the first archive entry has been stored.
pub struct CancelAfterFirstEntry {
    pub token: CancelToken,
}

impl ProgressSink for CancelAfterFirstEntry {
    fn event(&self, event: ProgressEvent) {
        if event.message.starts_with("entry.done") {
            self.token.cancel();
        }
    }
}
