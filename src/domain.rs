use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::classify::classify;
use crate::error::EraError;

/// Name of the collection holding county links. Never touched by cleanup.
pub const COUNTY_LINKS_COLLECTION: &str = "county_links";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    Zip,
    Html,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::Zip => "zip",
            ParseMethod::Html => "html",
        }
    }
}

impl fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseMethod {
    type Err = EraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "zip" => Ok(ParseMethod::Zip),
            "html" => Ok(ParseMethod::Html),
            other => Err(EraError::Validation(format!("invalid parse method: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub county_name: String,
    pub link: String,
    pub parse_method: String,
}

impl CountyLink {
    pub fn new(county_name: &str, link: &str, method: ParseMethod) -> Self {
        Self {
            id: None,
            county_name: county_name.to_string(),
            link: link.to_string(),
            parse_method: method.to_string(),
        }
    }

    pub fn validate(&self) -> Result<ParseMethod, EraError> {
        if self.county_name.is_empty() {
            return Err(EraError::Validation("county name is required".to_string()));
        }
        if self.link.is_empty() {
            return Err(EraError::Validation("link is required".to_string()));
        }
        self.parse_method.parse()
    }

    pub fn county_id(&self) -> String {
        county_id(&self.county_name)
    }
}

/// Lower-cases a county name and replaces spaces with underscores. Path
/// separators become underscores too, so the id is always a single path
/// component.
pub fn county_id(county_name: &str) -> String {
    county_name.to_lowercase().replace([' ', '/', '\\'], "_")
}

pub fn results_collection_name(county_id: &str) -> String {
    format!("county_{county_id}_results")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Candidate,
    Measure,
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultType::Candidate => write!(f, "candidate"),
            ResultType::Measure => write!(f, "measure"),
        }
    }
}

/// One parsed row before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub county_id: String,
    pub title: String,
    pub choice_name: String,
    pub votes: i64,
    pub percentage: f64,
    /// Every column of the row keyed by its lower-cased header.
    pub raw: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedResult {
    pub county_link: String,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    pub contest_name: String,
    pub choice_name: String,
    pub votes: i64,
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bond: Option<bool>,
}

impl ClassifiedResult {
    pub fn from_entry(entry: &RawEntry) -> Self {
        let classification = classify(&entry.title, &entry.choice_name);
        Self {
            county_link: entry.county_id.clone(),
            result_type: classification.result_type,
            contest_name: entry.title.clone(),
            choice_name: entry.choice_name.clone(),
            votes: entry.votes,
            percentage: entry.percentage,
            is_bond: classification.is_bond,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_method_roundtrip() {
        let method: ParseMethod = "html".parse().unwrap();
        assert_eq!(method, ParseMethod::Html);
        assert_eq!(method.to_string(), "html");
    }

    #[test]
    fn parse_method_rejects_unknown() {
        let err = "pdf".parse::<ParseMethod>().unwrap_err();
        assert_matches!(err, EraError::Validation(_));
    }

    #[test]
    fn county_link_validation() {
        let link = CountyLink::new("Marin", "https://example.org/results.zip", ParseMethod::Zip);
        assert_eq!(link.validate().unwrap(), ParseMethod::Zip);

        let mut missing_name = link.clone();
        missing_name.county_name.clear();
        assert_matches!(missing_name.validate(), Err(EraError::Validation(_)));

        let mut missing_link = link.clone();
        missing_link.link.clear();
        assert_matches!(missing_link.validate(), Err(EraError::Validation(_)));

        let mut bad_method = link.clone();
        bad_method.parse_method = "ftp".to_string();
        assert_matches!(bad_method.validate(), Err(EraError::Validation(_)));

        let mut padded_method = link;
        padded_method.parse_method = "zip ".to_string();
        assert_matches!(padded_method.validate(), Err(EraError::Validation(_)));
    }

    #[test]
    fn county_id_normalization() {
        assert_eq!(county_id("San Luis Obispo"), "san_luis_obispo");
        assert_eq!(
            results_collection_name(&county_id("Marin")),
            "county_marin_results"
        );
    }

    #[test]
    fn county_id_is_a_single_path_component() {
        assert_eq!(county_id("../x"), ".._x");
        assert_eq!(county_id("A/B"), "a_b");
        assert_eq!(county_id("C:\\D"), "c:_d");
    }
}
