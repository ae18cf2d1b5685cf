#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use camino::Utf8PathBuf;

use paper_fetcher::domain::{EdgeKinds, PaperId, PaperRecord};
use paper_fetcher::error::FetchError;
use paper_fetcher::scholar::{MetadataClient, Neighbors};
use paper_fetcher::store::OutputStore;

pub mod server;

pub const PDF_BODY: &[u8] = b"%PDF-1.5\n% test document\n";

pub fn id(value: &str) -> PaperId {
    value.parse().unwrap()
}

pub fn paper(value: &str) -> PaperRecord {
    PaperRecord::new(id(value), format!("Paper {value}"))
}

/// In-memory citation graph.
#[derive(Default)]
pub struct MockScholar {
    papers: HashMap<PaperId, PaperRecord>,
    references: HashMap<PaperId, Vec<PaperId>>,
    citations: HashMap<PaperId, Vec<PaperId>>,
    failing: HashSet<PaperId>,
    search_results: Vec<PaperRecord>,
    open_access: HashMap<PaperId, String>,
    pub neighbor_calls: Mutex<Vec<PaperId>>,
}

impl MockScholar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paper(mut self, value: &str, pdf: bool) -> Self {
        let mut record = paper(value);
        if pdf {
            record.pdf_url = Some(format!("https://example.org/{value}.pdf"));
        }
        self.papers.insert(record.id.clone(), record);
        self
    }

    /// `from` cites each of `to`.
    pub fn cites(mut self, from: &str, to: &[&str]) -> Self {
        for target in to {
            self.ensure(target);
            self.references
                .entry(id(from))
                .or_default()
                .push(id(target));
            self.citations
                .entry(id(target))
                .or_default()
                .push(id(from));
        }
        self.ensure(from);
        self
    }

    pub fn failing(mut self, value: &str) -> Self {
        self.failing.insert(id(value));
        self
    }

    pub fn with_search_results(mut self, values: &[&str]) -> Self {
        for value in values {
            self.ensure(value);
        }
        self.search_results = values
            .iter()
            .map(|value| self.papers[&id(value)].clone())
            .collect();
        self
    }

    /// PDF link found only through the DOI lookup.
    pub fn with_open_access(mut self, value: &str, url: &str) -> Self {
        self.open_access.insert(id(value), url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<PaperId> {
        self.neighbor_calls.lock().unwrap().clone()
    }

    fn ensure(&mut self, value: &str) {
        self.papers
            .entry(id(value))
            .or_insert_with(|| paper(value));
    }

    fn lookup(&self, ids: Option<&Vec<PaperId>>) -> Vec<PaperRecord> {
        ids.map(|ids| ids.iter().map(|id| self.papers[id].clone()).collect())
            .unwrap_or_default()
    }
}

impl MetadataClient for MockScholar {
    fn resolve_seed(&self, paper: &PaperId) -> Result<PaperRecord, FetchError> {
        self.papers
            .get(paper)
            .cloned()
            .ok_or_else(|| FetchError::SeedNotFound(paper.to_string()))
    }

    fn search(&self, _query: &str, limit: usize) -> Result<Vec<PaperRecord>, FetchError> {
        Ok(self.search_results.iter().take(limit).cloned().collect())
    }

    fn references(&self, paper: &PaperId) -> Result<Vec<PaperRecord>, FetchError> {
        Ok(self.lookup(self.references.get(paper)))
    }

    fn citations(&self, paper: &PaperId) -> Result<Vec<PaperRecord>, FetchError> {
        Ok(self.lookup(self.citations.get(paper)))
    }

    fn find_open_access(&self, records: &mut [PaperRecord]) -> Result<usize, FetchError> {
        let mut gained = 0;
        for record in records.iter_mut().filter(|record| record.pdf_url.is_none()) {
            if let Some(url) = self.open_access.get(&record.id) {
                record.pdf_url = Some(url.clone());
                gained += 1;
            }
        }
        Ok(gained)
    }

    fn neighbors_of_kind(&self, paper: &PaperId, kinds: EdgeKinds) -> Result<Neighbors, FetchError> {
        self.neighbor_calls.lock().unwrap().push(paper.clone());
        if self.failing.contains(paper) {
            return Err(FetchError::ScholarStatus {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(Neighbors {
            references: if kinds.references() {
                self.references(paper)?
            } else {
                Vec::new()
            },
            citations: if kinds.citations() {
                self.citations(paper)?
            } else {
                Vec::new()
            },
        })
    }
}

/// Serves a PDF for every URL except the ones listed as broken.
#[derive(Default)]
pub struct MockPdfs {
    pub broken: HashSet<String>,
    pub body: Option<Vec<u8>>,
    pub calls: Mutex<usize>,
}

impl MockPdfs {
    pub fn broken(urls: &[&str]) -> Self {
        Self {
            broken: urls.iter().map(|url| url.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn serving(body: &[u8]) -> Self {
        Self {
            body: Some(body.to_vec()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl paper_fetcher::download::PdfSource for MockPdfs {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        *self.calls.lock().unwrap() += 1;
        if self.broken.contains(url) {
            // write a partial body first, as a dropped connection would
            std::fs::write(destination, b"%PDF-1.5 trunc").unwrap();
            return Err(FetchError::DownloadHttp("connection reset".to_string()));
        }
        let body = self.body.as_deref().unwrap_or(PDF_BODY);
        std::fs::write(destination, body).unwrap();
        Ok(body.len() as u64)
    }
}

pub fn temp_store(temp: &tempfile::TempDir) -> OutputStore {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("papers")).unwrap();
    OutputStore::new(root, "papers_metadata.json")
}
