use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use tracing_subscriber::EnvFilter;

use paper_fetcher::app::{App, RunOptions};
use paper_fetcher::config::{ConfigLoader, Overrides};
use paper_fetcher::domain::{EdgeKinds, ExpansionPolicy, PaperId, SeedSpecifier};
use paper_fetcher::download::HttpPdfSource;
use paper_fetcher::error::FetchError;
use paper_fetcher::output::{ConsoleOutput, JsonOutput, OutputMode};
use paper_fetcher::scholar::ScholarHttpClient;
use paper_fetcher::select::{ConsoleSelector, FirstCandidate, Selector};
use paper_fetcher::store::OutputStore;

const API_KEY_ENV: &str = "SEMANTIC_SCHOLAR_API_KEY";

#[derive(Parser)]
#[command(name = "paper-fetcher")]
#[command(about = "Download academic papers and their references/citations from Semantic Scholar")]
#[command(version, author)]
#[command(group(ArgGroup::new("seed").required(true).args(["paper_id", "search"])))]
struct Cli {
    /// Semantic Scholar paper id, DOI, or prefixed id (ARXIV:, CorpusId:, ...)
    #[arg(short, long)]
    paper_id: Option<String>,

    /// Search terms; pick the seed from a numbered list
    #[arg(short, long)]
    search: Option<String>,

    /// Reference/citation hops to follow (default: 1 for --paper-id, 0 for --search)
    #[arg(short, long)]
    depth: Option<u32>,

    /// Directory for PDFs and the metadata file
    #[arg(short, long)]
    output: Option<String>,

    /// Name of the metadata file inside the output directory
    #[arg(long)]
    metadata_file: Option<String>,

    /// Semantic Scholar API key (also read from SEMANTIC_SCHOLAR_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Which edges to follow
    #[arg(long, value_enum)]
    edges: Option<EdgeKinds>,

    /// What to do when expanding one paper fails
    #[arg(long, value_enum)]
    on_service_error: Option<ExpansionPolicy>,

    /// Number of search candidates to show
    #[arg(long)]
    limit: Option<usize>,

    /// Stop discovering once this many papers are known
    #[arg(long)]
    max_papers: Option<usize>,

    /// Contact email for Unpaywall; enables its PDF lookup for papers with a DOI
    #[arg(long)]
    unpaywall_email: Option<String>,

    /// Config file (default: ./paper-fetcher.json if present)
    #[arg(long)]
    config: Option<String>,

    /// Pick the top search result and print the run report as JSON
    #[arg(long)]
    non_interactive: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            if let Some(FetchError::SelectionAborted) = report.downcast_ref::<FetchError>() {
                eprintln!("No paper selected, nothing downloaded.");
                return ExitCode::SUCCESS;
            }
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<FetchError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        FetchError::InvalidPaperId(_)
        | FetchError::SeedNotFound(_)
        | FetchError::NoSearchResults(_) => 2,
        FetchError::ScholarHttp(_)
        | FetchError::ScholarStatus { .. }
        | FetchError::ScholarParse(_) => 3,
        FetchError::Filesystem(_) => 4,
        _ => 1,
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let seed = match (cli.paper_id, cli.search) {
        (Some(id), _) => SeedSpecifier::Id(id.parse::<PaperId>()?),
        (None, Some(query)) if !query.trim().is_empty() => {
            SeedSpecifier::Search(query.trim().to_string())
        }
        _ => {
            return Err(FetchError::InvalidOption(
                "either --paper-id or a non-empty --search is required".to_string(),
            )
            .into());
        }
    };

    let file_config = ConfigLoader::load(cli.config.as_deref())?;
    let overrides = Overrides {
        api_key: cli.api_key,
        env_api_key: std::env::var(API_KEY_ENV).ok(),
        output_dir: cli.output,
        metadata_file: cli.metadata_file,
        depth: cli.depth,
        edges: cli.edges,
        on_service_error: cli.on_service_error,
        search_limit: cli.limit,
        max_papers: cli.max_papers,
        unpaywall_email: cli.unpaywall_email,
    };
    let config = ConfigLoader::resolve_config(file_config, overrides, &seed)?;
    tracing::info!(
        output = %config.output_dir,
        depth = config.walker.max_depth,
        keyed = config.scholar.api_key.is_some(),
        "configuration resolved"
    );

    let client = ScholarHttpClient::new(config.scholar.clone())?;
    let pdfs = HttpPdfSource::new(config.download_timeout)?;
    let store = OutputStore::new(config.output_dir.clone(), config.metadata_file.clone());
    let app = App::new(store, client, pdfs, RunOptions::from(&config));

    match output_mode {
        OutputMode::NonInteractive => {
            let report = app.run(seed, &mut FirstCandidate, &JsonOutput)?;
            JsonOutput::print_report(&report).map_err(|err| FetchError::Console(err.to_string()))?;
        }
        OutputMode::Interactive => {
            eprintln!(
                "📚 Starting paper download with depth {}",
                config.walker.max_depth
            );
            let mut selector = ConsoleSelector::stdio();
            let report = app.run(seed, &mut selector as &mut dyn Selector, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&report);
        }
    }
    Ok(())
}
