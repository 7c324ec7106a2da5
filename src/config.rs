use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::CountyLink;
use crate::error::EraError;
use crate::fetch::{BROWSER_USER_AGENT, DEFAULT_TIMEOUT};
use crate::store::JsonFileStore;

pub const CONFIG_FILE: &str = "era.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub links: Vec<CountyLink>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: Utf8PathBuf,
    pub timeout: Duration,
    pub user_agent: String,
    pub links: Vec<CountyLink>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `era.json` from the current directory when present.
    /// Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, EraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| EraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| EraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, EraError> {
        let data_dir = match config.data_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => JsonFileStore::default_root()?,
        };
        let timeout = config
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let user_agent = config
            .user_agent
            .filter(|agent| !agent.trim().is_empty())
            .unwrap_or_else(|| BROWSER_USER_AGENT.to_string());

        Ok(ResolvedConfig {
            data_dir,
            timeout,
            user_agent,
            links: config.links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = Config {
            data_dir: Some("/tmp/era".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.data_dir, Utf8PathBuf::from("/tmp/era"));
        assert_eq!(resolved.timeout, DEFAULT_TIMEOUT);
        assert_eq!(resolved.user_agent, BROWSER_USER_AGENT);
        assert!(resolved.links.is_empty());
    }
}
