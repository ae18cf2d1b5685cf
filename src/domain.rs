use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

const ID_PREFIXES: &[&str] = &[
    "DOI", "ARXIV", "CorpusId", "MAG", "ACL", "PMID", "PMCID", "URL",
];

const DOI_HOSTS: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
];

const ARXIV_HOSTS: &[&str] = &["https://arxiv.org/abs/", "http://arxiv.org/abs/", "arxiv.org/abs/"];

/// Identifier accepted by the Semantic Scholar paper endpoints.
///
/// Bare DOIs and doi.org / arxiv.org links are normalized to the prefixed
/// `DOI:` / `ARXIV:` forms; 40-character hex ids are lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaperId(String);

impl PaperId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_service(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaperId {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(FetchError::InvalidPaperId(value.to_string()));
        }

        if let Some(doi) = strip_any_prefix(trimmed, DOI_HOSTS) {
            return prefixed("DOI", doi, value);
        }
        if let Some(arxiv) = strip_any_prefix(trimmed, ARXIV_HOSTS) {
            return prefixed("ARXIV", arxiv, value);
        }
        if trimmed.starts_with("10.") && trimmed.contains('/') {
            return prefixed("DOI", trimmed, value);
        }

        if let Some((kind, rest)) = trimmed.split_once(':') {
            if let Some(canonical) = ID_PREFIXES
                .iter()
                .find(|prefix| prefix.eq_ignore_ascii_case(kind))
            {
                return prefixed(canonical, rest, value);
            }
        }

        if trimmed.len() == 40 && trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Ok(Self(trimmed.to_ascii_lowercase()));
        }

        Ok(Self(trimmed.to_string()))
    }
}

fn strip_any_prefix<'a>(value: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| {
        let head = value.get(..prefix.len())?;
        head.eq_ignore_ascii_case(prefix)
            .then(|| &value[prefix.len()..])
    })
}

fn prefixed(kind: &str, rest: &str, original: &str) -> Result<PaperId, FetchError> {
    if rest.is_empty() {
        return Err(FetchError::InvalidPaperId(original.to_string()));
    }
    Ok(PaperId(format!("{kind}:{rest}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    Pending,
    Downloaded,
    AlreadyPresent,
    Skipped,
    Failed,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Pending => write!(f, "pending"),
            DownloadStatus::Downloaded => write!(f, "downloaded"),
            DownloadStatus::AlreadyPresent => write!(f, "already present"),
            DownloadStatus::Skipped => write!(f, "skipped"),
            DownloadStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: PaperId,
    pub title: String,
    pub year: Option<i32>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub pdf_url: Option<String>,
    pub local_path: Option<String>,
    pub depth: u32,
    #[serde(default)]
    pub status: DownloadStatus,
    pub error: Option<String>,
}

impl PaperRecord {
    pub fn new(id: PaperId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            year: None,
            authors: Vec::new(),
            abstract_text: None,
            url: None,
            doi: None,
            arxiv_id: None,
            pdf_url: None,
            local_path: None,
            depth: 0,
            status: DownloadStatus::Pending,
            error: None,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

/// How the run picks its depth-0 paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSpecifier {
    Id(PaperId),
    Search(String),
}

impl fmt::Display for SeedSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedSpecifier::Id(id) => write!(f, "id {id}"),
            SeedSpecifier::Search(query) => write!(f, "search \"{query}\""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKinds {
    References,
    Citations,
    #[default]
    Both,
}

impl EdgeKinds {
    pub fn references(self) -> bool {
        matches!(self, EdgeKinds::References | EdgeKinds::Both)
    }

    pub fn citations(self) -> bool {
        matches!(self, EdgeKinds::Citations | EdgeKinds::Both)
    }
}

/// What the walker does when neighbor expansion fails for one paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionPolicy {
    #[default]
    Skip,
    Abort,
}
