use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use crate::error::EraError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Some county sites reject anything that does not look like a browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub trait SourceFetcher: Send + Sync {
    /// Downloads `url` into `destination`, returning the number of bytes written.
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, EraError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, EraError> {
        Self::with_options(DEFAULT_TIMEOUT, BROWSER_USER_AGENT)
    }

    pub fn with_options(timeout: Duration, user_agent: &str) -> Result<Self, EraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|err| EraError::Fetch(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| EraError::Fetch(err.to_string()))?;
        Ok(Self { client })
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, EraError> {
        debug!(url, "sending request");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| EraError::Fetch(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .status()
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string();
            return Err(EraError::FetchStatus { status, message });
        }

        let mut file =
            File::create(destination).map_err(|err| EraError::Filesystem(err.to_string()))?;
        let written = std::io::copy(&mut response, &mut file)
            .map_err(|err| EraError::Fetch(err.to_string()))?;
        info!(url, bytes = written, "download complete");
        Ok(written)
    }
}
