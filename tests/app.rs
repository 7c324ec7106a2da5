mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use era_results::app::{App, GroupedResults, ParseRequest, ResultView};
use era_results::domain::{CountyLink, ParseMethod, ResultType};
use era_results::error::EraError;
use era_results::parser::{CancelToken, ParseContext};
use era_results::registry::ParserRegistry;
use era_results::store::{MemoryStore, ResultsStore};

use common::{HEADER, MockFetcher, NoopSink, build_zip};

const MARIN_URL: &str = "https://marin.example/results.zip";
const NAPA_URL: &str = "https://napa.example/results.zip";
const BROKEN_URL: &str = "https://broken.example/results.zip";

fn app() -> App<MemoryStore> {
    let marin = format!(
        "{HEADER}\nMayor,Alice,1000,55%\nMeasure A,Yes,800,60%\nMayor,Bob,820,45%\nMeasure A,No,500,40%\n"
    );
    let napa = format!("{HEADER}\nSheriff,Dana,10,100%\n");
    let fetcher = MockFetcher::new(vec![
        (MARIN_URL, build_zip(&[("marin.csv", &marin)])),
        (NAPA_URL, build_zip(&[("napa.csv", &napa)])),
    ]);
    let store = Arc::new(MemoryStore::new());
    let registry = ParserRegistry::with_defaults(fetcher, store.clone()).unwrap();
    App::new(store, registry)
}

#[test]
fn parse_link_uses_stored_source() {
    let mut app = app();
    let saved = app
        .save_link(&CountyLink::new("Marin", MARIN_URL, ParseMethod::Zip))
        .unwrap();

    let sink = NoopSink;
    let result = app
        .parse_link(saved.id.as_deref().unwrap(), &ParseContext::new(&sink))
        .unwrap();
    assert_eq!(result.summary.rows_stored, 4);
    assert_eq!(app.results("Marin", None).unwrap().total, 4);
    assert_eq!(
        app.results("Marin", Some(ResultType::Measure)).unwrap().total,
        2
    );
}

#[test]
fn parse_link_unknown_id_is_not_found() {
    let mut app = app();
    let sink = NoopSink;
    let err = app
        .parse_link("link-404", &ParseContext::new(&sink))
        .unwrap_err();
    assert_matches!(err, EraError::NotFound(_));
}

#[test]
fn unknown_method_is_not_found() {
    let mut app = app();
    let sink = NoopSink;
    let err = app
        .parse_direct("Marin", MARIN_URL, "pdf", &ParseContext::new(&sink))
        .unwrap_err();
    assert_matches!(err, EraError::NotFound(_));
}

#[test]
fn bulk_parse_isolates_failures_and_skips_other_methods() {
    let mut app = app();
    app.save_link(&CountyLink::new("Marin", MARIN_URL, ParseMethod::Zip))
        .unwrap();
    app.save_link(&CountyLink::new("Broken", BROKEN_URL, ParseMethod::Zip))
        .unwrap();
    app.save_link(&CountyLink::new("Napa", NAPA_URL, ParseMethod::Zip))
        .unwrap();
    app.save_link(&CountyLink::new("Sonoma", "https://sonoma.example", ParseMethod::Html))
        .unwrap();

    let sink = NoopSink;
    let summary = app
        .bulk_parse(ParseMethod::Zip, &ParseContext::new(&sink))
        .unwrap();

    assert_eq!(summary.total_counties, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].starts_with("County Broken:"));
    assert!(summary.failed[0].contains("download"));
    assert_eq!(app.results("Napa", None).unwrap().total, 1);
}

#[test]
fn bulk_parse_with_every_county_failing_still_summarizes() {
    let mut app = app();
    app.save_link(&CountyLink::new("Broken", BROKEN_URL, ParseMethod::Zip))
        .unwrap();
    let sink = NoopSink;
    let summary = app
        .bulk_parse(ParseMethod::Zip, &ParseContext::new(&sink))
        .unwrap();
    assert_eq!(summary.total_counties, 1);
    assert_eq!(summary.successful, 0);
    assert_eq!(summary.failed.len(), 1);
}

#[test]
fn bulk_parse_stops_on_cancellation() {
    let mut app = app();
    app.save_link(&CountyLink::new("Marin", MARIN_URL, ParseMethod::Zip))
        .unwrap();
    app.save_link(&CountyLink::new("Napa", NAPA_URL, ParseMethod::Zip))
        .unwrap();

    let token = CancelToken::new();
    token.cancel();
    let sink = NoopSink;
    let summary = app
        .bulk_parse(ParseMethod::Zip, &ParseContext::new(&sink).with_cancel(token))
        .unwrap();
    assert_eq!(summary.total_counties, 1);
    assert_eq!(summary.failed, vec!["County Marin: operation cancelled".to_string()]);
}

#[test]
fn direct_bulk_parse_reports_each_county() {
    let mut app = app();
    let requests = vec![
        ParseRequest {
            county_name: "Marin".to_string(),
            link: MARIN_URL.to_string(),
            parse_method: "zip".to_string(),
        },
        ParseRequest {
            county_name: "Nowhere".to_string(),
            link: MARIN_URL.to_string(),
            parse_method: "ftp".to_string(),
        },
    ];
    let sink = NoopSink;
    let summary = app.direct_bulk_parse(&requests, &ParseContext::new(&sink));
    assert_eq!(summary.total, 2);
    assert_eq!(summary.successful, 1);
    assert!(summary.results[0].success);
    assert!(summary.results[1].error.as_deref().unwrap().contains("no parser found"));
}

#[test]
fn parse_and_group_returns_races() {
    let mut app = app();
    let request = ParseRequest {
        county_name: "Marin".to_string(),
        link: MARIN_URL.to_string(),
        parse_method: "zip".to_string(),
    };
    let sink = NoopSink;
    let grouped = app
        .parse_and_group(&request, ResultView::Candidates, &ParseContext::new(&sink))
        .unwrap();
    let GroupedResults::Candidates(races) = grouped else {
        panic!("expected candidates");
    };
    assert_eq!(races.len(), 1);
    assert_eq!(races[0].title, "Mayor");
    let names: Vec<_> = races[0].candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
    assert_eq!(races[0].candidates[0].percentage, "55.0%");

    let measures = app.measures("Marin").unwrap();
    assert_eq!(measures.len(), 1);
    assert_eq!(measures[0].measures[0].yes_votes, "800");
    assert_eq!(measures[0].measures[1].no_votes, "500");
}

#[test]
fn import_rejects_batch_with_invalid_link() {
    let app = app();
    let mut bad = CountyLink::new("Napa", NAPA_URL, ParseMethod::Zip);
    bad.parse_method = "pdf".to_string();
    let links = vec![CountyLink::new("Marin", MARIN_URL, ParseMethod::Zip), bad];

    let err = app.import_links(&links).unwrap_err();
    assert_matches!(err, EraError::Validation(ref message) if message.contains("index 1"));
    assert!(app.list_links().unwrap().is_empty());

    let imported = app.import_links(&links[..1]).unwrap();
    assert_eq!(imported.saved.len(), 1);
    assert!(imported.errors.is_empty());
}

#[test]
fn cleanup_keeps_county_links() {
    let mut app = app();
    app.save_link(&CountyLink::new("Marin", MARIN_URL, ParseMethod::Zip))
        .unwrap();
    let sink = NoopSink;
    app.bulk_parse(ParseMethod::Zip, &ParseContext::new(&sink))
        .unwrap();

    let result = app.cleanup_collections().unwrap();
    assert_eq!(result.deleted, vec!["county_marin_results".to_string()]);
    assert_eq!(result.skipped, vec!["county_links".to_string()]);
    assert_eq!(app.list_links().unwrap().len(), 1);
    assert_matches!(app.results("Marin", None), Err(EraError::NotFound(_)));
    assert_eq!(
        app.store().list_collections().unwrap(),
        vec!["county_links".to_string()]
    );
}

#[test]
fn padded_method_is_rejected_before_saving() {
    let app = app();
    let mut link = CountyLink::new("Marin", MARIN_URL, ParseMethod::Zip);
    link.parse_method = "zip ".to_string();

    assert_matches!(app.save_link(&link), Err(EraError::Validation(_)));
    assert_matches!(app.import_links(&[link]), Err(EraError::Validation(_)));
    assert!(app.list_links().unwrap().is_empty());
}
