use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("invalid paper id: {0}")]
    #[diagnostic(help(
        "use a Semantic Scholar id, a DOI, or a prefixed id such as ARXIV:1706.03762"
    ))]
    InvalidPaperId(String),

    #[error("paper not found: {0}")]
    SeedNotFound(String),

    #[error("no papers found matching \"{0}\"")]
    NoSearchResults(String),

    #[error("selection aborted")]
    SelectionAborted,

    #[error("Semantic Scholar request failed: {0}")]
    ScholarHttp(String),

    #[error("Semantic Scholar returned status {status}: {message}")]
    ScholarStatus { status: u16, message: String },

    #[error("unexpected Semantic Scholar response: {0}")]
    ScholarParse(String),

    #[error("Unpaywall request failed: {0}")]
    UnpaywallHttp(String),

    #[error("PDF request failed: {0}")]
    DownloadHttp(String),

    #[error("PDF host returned status {status} for {url}")]
    DownloadStatus { status: u16, url: String },

    #[error("PDF download from {0} was empty")]
    EmptyDownload(String),

    #[error("response from {0} is not a PDF")]
    NotPdf(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("console I/O failed: {0}")]
    Console(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl FetchError {
    /// Errors raised while talking to the metadata service.
    pub fn is_service(&self) -> bool {
        matches!(
            self,
            FetchError::ScholarHttp(_)
                | FetchError::ScholarStatus { .. }
                | FetchError::ScholarParse(_)
        )
    }
}
