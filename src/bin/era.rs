use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use era_results::app::{App, ParseRequest, ResultView};
use era_results::config::{ConfigLoader, ResolvedConfig};
use era_results::domain::{CountyLink, ParseMethod, ResultType};
use era_results::error::EraError;
use era_results::fetch::HttpFetcher;
use era_results::output::{JsonOutput, LogSink};
use era_results::parser::ParseContext;
use era_results::registry::ParserRegistry;
use era_results::store::JsonFileStore;

#[derive(Parser)]
#[command(name = "era")]
#[command(about = "Ingest county election results and show them grouped by contest")]
#[command(version, author)]
struct Cli {
    /// Path to a JSON config file (defaults to ./era.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Directory holding county links and results collections
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Abort a parse after this many seconds
    #[arg(long, global = true)]
    deadline: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Parse the source of a stored county link")]
    Parse { id: String },
    #[command(about = "Parse a source without storing a county link")]
    ParseUrl(ParseUrlArgs),
    #[command(about = "Parse every stored county link using one method")]
    BulkParse { method: ParseMethod },
    #[command(about = "Parse a JSON list of {county_name, link, parse_method} requests")]
    ParseBatch { file: String },
    #[command(about = "List stored results for a county")]
    Results(ResultsArgs),
    #[command(about = "Show a county's ballot measures grouped by contest")]
    Measures { county: String },
    #[command(about = "Show a county's candidate races grouped by contest")]
    Candidates { county: String },
    #[command(about = "Delete every results collection, keeping county links")]
    Cleanup,
    #[command(about = "Manage county links")]
    Links(LinksArgs),
}

#[derive(Args)]
struct ParseUrlArgs {
    #[arg(long)]
    county: String,

    #[arg(long)]
    url: String,

    #[arg(long, default_value = "zip")]
    method: ParseMethod,

    /// Print grouped results of this kind after parsing
    #[arg(long)]
    show: Option<ResultView>,
}

#[derive(Args)]
struct ResultsArgs {
    county: String,

    #[arg(long = "type")]
    result_type: Option<ResultType>,
}

#[derive(Args)]
struct LinksArgs {
    #[command(subcommand)]
    command: LinksCommand,
}

#[derive(Subcommand)]
enum LinksCommand {
    #[command(about = "Add a county link")]
    Add(LinkArgs),
    #[command(about = "Replace a county link")]
    Update {
        id: String,
        #[command(flatten)]
        link: LinkArgs,
    },
    #[command(about = "List county links")]
    List,
    #[command(about = "Remove a county link")]
    Remove { id: String },
    #[command(about = "Import links from a JSON file, or from the config file when omitted")]
    Import { file: Option<String> },
}

#[derive(Args)]
struct LinkArgs {
    #[arg(long)]
    county: String,

    #[arg(long)]
    url: String,

    #[arg(long, default_value = "zip")]
    method: ParseMethod,
}

impl LinkArgs {
    fn to_link(&self) -> CountyLink {
        CountyLink::new(&self.county, &self.url, self.method)
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(era) = report.downcast_ref::<EraError>() {
            return ExitCode::from(map_exit_code(era));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EraError) -> u8 {
    match error.root() {
        EraError::NotFound(_) => 2,
        EraError::Fetch(_) | EraError::FetchStatus { .. } => 3,
        EraError::Cancelled => 130,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Utf8PathBuf::from(dir);
    }
    if let Some(secs) = cli.timeout.filter(|secs| *secs > 0) {
        config.timeout = Duration::from_secs(secs);
    }

    let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
    store.ensure_root()?;
    let fetcher = HttpFetcher::with_options(config.timeout, &config.user_agent)?;
    let registry = ParserRegistry::with_defaults(fetcher, store.clone())?;
    let mut app = App::new(store, registry);

    let sink = LogSink;
    let mut ctx = ParseContext::new(&sink);
    if let Some(secs) = cli.deadline {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    let outcome = run_command(cli.command, &mut app, &config, &ctx);
    app.shutdown();
    outcome
}

fn run_command(
    command: Commands,
    app: &mut App<JsonFileStore>,
    config: &ResolvedConfig,
    ctx: &ParseContext<'_>,
) -> miette::Result<()> {
    match command {
        Commands::Parse { id } => {
            let result = app.parse_link(&id, ctx)?;
            JsonOutput::print_parse(&result).into_diagnostic()
        }
        Commands::ParseUrl(args) => {
            let request = ParseRequest {
                county_name: args.county,
                link: args.url,
                parse_method: args.method.to_string(),
            };
            match args.show {
                Some(view) => {
                    let groups = app.parse_and_group(&request, view, ctx)?;
                    JsonOutput::print_groups(&groups).into_diagnostic()
                }
                None => {
                    let result = app.parse_direct(
                        &request.county_name,
                        &request.link,
                        &request.parse_method,
                        ctx,
                    )?;
                    JsonOutput::print_parse(&result).into_diagnostic()
                }
            }
        }
        Commands::BulkParse { method } => {
            let summary = app.bulk_parse(method, ctx)?;
            JsonOutput::print_bulk(&summary).into_diagnostic()
        }
        Commands::ParseBatch { file } => {
            let requests: Vec<ParseRequest> = read_json(&file)?;
            let summary = app.direct_bulk_parse(&requests, ctx);
            JsonOutput::print_direct_bulk(&summary).into_diagnostic()
        }
        Commands::Results(args) => {
            let view = app.results(&args.county, args.result_type)?;
            JsonOutput::print_results(&view).into_diagnostic()
        }
        Commands::Measures { county } => {
            let groups = app.grouped(&county, ResultView::Measures)?;
            JsonOutput::print_groups(&groups).into_diagnostic()
        }
        Commands::Candidates { county } => {
            let groups = app.grouped(&county, ResultView::Candidates)?;
            JsonOutput::print_groups(&groups).into_diagnostic()
        }
        Commands::Cleanup => {
            let result = app.cleanup_collections()?;
            JsonOutput::print_cleanup(&result).into_diagnostic()
        }
        Commands::Links(args) => run_links(args.command, app, config),
    }
}

fn run_links(
    command: LinksCommand,
    app: &mut App<JsonFileStore>,
    config: &ResolvedConfig,
) -> miette::Result<()> {
    match command {
        LinksCommand::Add(args) => {
            let saved = app.save_link(&args.to_link())?;
            JsonOutput::print_links(&[saved]).into_diagnostic()
        }
        LinksCommand::Update { id, link } => {
            let saved = app.update_link(&id, &link.to_link())?;
            JsonOutput::print_links(&[saved]).into_diagnostic()
        }
        LinksCommand::List => {
            let links = app.list_links()?;
            JsonOutput::print_links(&links).into_diagnostic()
        }
        LinksCommand::Remove { id } => {
            app.delete_link(&id)?;
            Ok(())
        }
        LinksCommand::Import { file } => {
            let links: Vec<CountyLink> = match file {
                Some(path) => read_json(&path)?,
                None => config.links.clone(),
            };
            let result = app.import_links(&links)?;
            JsonOutput::print_import(&result).into_diagnostic()
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> miette::Result<T> {
    let content = fs::read_to_string(path).map_err(|_| EraError::ConfigRead(path.into()))?;
    let value =
        serde_json::from_str(&content).map_err(|err| EraError::ConfigParse(err.to_string()))?;
    Ok(value)
}
