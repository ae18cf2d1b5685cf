use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ResolvedConfig, WalkerConfig};
use crate::domain::{DownloadStatus, PaperId, PaperRecord, SeedSpecifier};
use crate::download::{DownloadSummary, Downloader, PdfSource};
use crate::error::FetchError;
use crate::scholar::MetadataClient;
use crate::select::Selector;
use crate::store::{OutputStore, RunMetadata};
use crate::walker::GraphWalker;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed_id: PaperId,
    pub seed_title: String,
    pub output_dir: String,
    pub metadata_path: String,
    pub max_depth: u32,
    pub discovered: usize,
    pub downloads: DownloadSummary,
    pub expansion_failures: usize,
    pub truncated: bool,
    pub papers: Vec<ReportItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportItem {
    pub id: PaperId,
    pub title: String,
    pub depth: u32,
    pub status: DownloadStatus,
    pub local_path: Option<String>,
    pub error: Option<String>,
}

impl From<&PaperRecord> for ReportItem {
    fn from(record: &PaperRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            depth: record.depth,
            status: record.status,
            local_path: record.local_path.clone(),
            error: record.error.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn timed(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            message: message.into(),
            elapsed: Some(elapsed),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub walker: WalkerConfig,
    pub search_limit: usize,
}

impl From<&ResolvedConfig> for RunOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            walker: config.walker,
            search_limit: config.search_limit,
        }
    }
}

/// Runs one harvest: seed, graph walk, downloads, metadata file.
pub struct App<M: MetadataClient, P: PdfSource> {
    store: OutputStore,
    client: M,
    pdfs: P,
    options: RunOptions,
}

impl<M: MetadataClient, P: PdfSource> App<M, P> {
    pub fn new(store: OutputStore, client: M, pdfs: P, options: RunOptions) -> Self {
        Self {
            store,
            client,
            pdfs,
            options,
        }
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn run(
        &self,
        seed: SeedSpecifier,
        selector: &mut dyn Selector,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, FetchError> {
        self.store.ensure_root()?;

        let start = Instant::now();
        let seed = self.resolve_seed(seed, selector, sink)?;
        sink.event(ProgressEvent::timed(
            format!("phase=Resolve; seed {} ({})", seed.title, seed.id),
            start.elapsed(),
        ));
        info!(seed = %seed.id, title = %seed.title, "seed resolved");

        let seed_id = seed.id.clone();
        let seed_title = seed.title.clone();
        let walker = GraphWalker::new(&self.client, self.options.walker);
        let walk = walker.walk(seed, sink)?;
        sink.event(ProgressEvent::timed(
            format!("phase=Expand; {} papers discovered", walk.papers.len()),
            start.elapsed(),
        ));

        let mut papers = walk.papers;
        if papers.len() > 1 {
            match self.client.enrich(&mut papers[1..]) {
                Ok(gained) => info!(gained, "filled in PDF links"),
                Err(err) => warn!(error = %err, "could not fill in PDF links"),
            }
        }
        match self.client.find_open_access(&mut papers) {
            Ok(0) => {}
            Ok(gained) => info!(gained, "found PDF links through Unpaywall"),
            Err(err) => warn!(error = %err, "Unpaywall lookup stopped"),
        }

        let downloads = Downloader::new(&self.pdfs, &self.store).fetch_all(&mut papers, sink);
        sink.event(ProgressEvent::timed(
            format!(
                "phase=Store; {} downloaded, {} skipped, {} failed",
                downloads.downloaded + downloads.already_present,
                downloads.skipped,
                downloads.failed
            ),
            start.elapsed(),
        ));

        let cleared = OutputStore::reconcile(&mut papers);
        if cleared > 0 {
            warn!(cleared, "dropped paths to missing files");
        }

        let items = papers.iter().map(ReportItem::from).collect();
        let discovered = papers.len();
        let expansion_failures = walk.failures.len();
        let metadata = RunMetadata::new(
            seed_id.clone(),
            self.options.walker.max_depth,
            self.options.walker.edges,
            papers,
            walk.failures,
        );
        let metadata_path = self.store.write_metadata(&metadata)?;
        sink.event(ProgressEvent::new(format!(
            "phase=Store; metadata written to {metadata_path}"
        )));

        Ok(RunReport {
            seed_id,
            seed_title,
            output_dir: self.store.root().to_string(),
            metadata_path: metadata_path.to_string(),
            max_depth: self.options.walker.max_depth,
            discovered,
            downloads,
            expansion_failures,
            truncated: walk.truncated,
            papers: items,
        })
    }

    fn resolve_seed(
        &self,
        seed: SeedSpecifier,
        selector: &mut dyn Selector,
        sink: &dyn ProgressSink,
    ) -> Result<PaperRecord, FetchError> {
        sink.event(ProgressEvent::new(format!("phase=Resolve; {seed}")));
        match seed {
            SeedSpecifier::Id(id) => self.client.resolve_seed(&id),
            SeedSpecifier::Search(query) => {
                let mut candidates = self.client.search(&query, self.options.search_limit)?;
                if candidates.is_empty() {
                    return Err(FetchError::NoSearchResults(query));
                }
                let choice = selector
                    .choose(&candidates)?
                    .ok_or(FetchError::SelectionAborted)?;
                if choice >= candidates.len() {
                    return Err(FetchError::InvalidOption(format!(
                        "selection {} out of range",
                        choice + 1
                    )));
                }
                Ok(candidates.swap_remove(choice))
            }
        }
    }
}
