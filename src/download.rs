use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{DownloadStatus, PaperRecord};
use crate::error::FetchError;
use crate::scholar::{is_retryable_error, is_retryable_status};
use crate::store::OutputStore;

const SNIFF_LEN: usize = 1024;

/// Anything able to stream a PDF from a URL into a local file.
pub trait PdfSource: Send + Sync {
    /// Writes the body to `destination` and returns the byte count.
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError>;
}

#[derive(Clone)]
pub struct HttpPdfSource {
    client: Client,
}

impl HttpPdfSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("paper-fetcher/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::InvalidOption(err.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/pdf,application/octet-stream;q=0.9,*/*;q=0.5"),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::DownloadHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, FetchError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 2;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::DownloadHttp(err.to_string()));
                }
            }
        }
    }
}

impl PdfSource for HttpPdfSource {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        let mut response = self.send_with_retries(|| self.client.get(url))?;
        if !response.status().is_success() {
            return Err(FetchError::DownloadStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let mut file =
            File::create(destination).map_err(|err| FetchError::Filesystem(err.to_string()))?;
        let bytes = std::io::copy(&mut response, &mut file)
            .map_err(|err| FetchError::DownloadHttp(err.to_string()))?;
        file.flush()
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Ok(bytes)
    }
}

#[derive(Debug)]
pub enum DownloadOutcome {
    Downloaded { path: Utf8PathBuf, bytes: u64 },
    AlreadyPresent { path: Utf8PathBuf },
    Skipped { reason: String },
    Failed { error: FetchError },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub already_present: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DownloadSummary {
    fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded { .. } => self.downloaded += 1,
            DownloadOutcome::AlreadyPresent { .. } => self.already_present += 1,
            DownloadOutcome::Skipped { .. } => self.skipped += 1,
            DownloadOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

pub struct Downloader<'a, P: PdfSource> {
    source: &'a P,
    store: &'a OutputStore,
}

impl<'a, P: PdfSource> Downloader<'a, P> {
    pub fn new(source: &'a P, store: &'a OutputStore) -> Self {
        Self { source, store }
    }

    /// Fetches one paper's PDF and records the outcome on the paper. Never
    /// leaves a partial file at the target path.
    pub fn fetch(&self, record: &mut PaperRecord) -> DownloadOutcome {
        let outcome = self.try_fetch(record);
        match &outcome {
            DownloadOutcome::Downloaded { path, .. } => {
                record.status = DownloadStatus::Downloaded;
                record.local_path = Some(path.to_string());
                record.error = None;
            }
            DownloadOutcome::AlreadyPresent { path } => {
                record.status = DownloadStatus::AlreadyPresent;
                record.local_path = Some(path.to_string());
                record.error = None;
            }
            DownloadOutcome::Skipped { reason } => {
                record.status = DownloadStatus::Skipped;
                record.local_path = None;
                record.error = Some(reason.clone());
            }
            DownloadOutcome::Failed { error } => {
                record.status = DownloadStatus::Failed;
                record.local_path = None;
                record.error = Some(error.to_string());
            }
        }
        outcome
    }

    pub fn fetch_all(
        &self,
        records: &mut [PaperRecord],
        sink: &dyn ProgressSink,
    ) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        let total = records.len();
        for (position, record) in records.iter_mut().enumerate() {
            sink.event(ProgressEvent::new(format!(
                "phase=Download; [{}/{total}] {}",
                position + 1,
                display_title(record)
            )));
            let outcome = self.fetch(record);
            match &outcome {
                DownloadOutcome::Downloaded { path, bytes } => {
                    info!(paper = %record.id, %path, bytes, "downloaded");
                    sink.event(ProgressEvent::new(format!("download.ok {path}")));
                }
                DownloadOutcome::AlreadyPresent { path } => {
                    debug!(paper = %record.id, %path, "already present");
                    sink.event(ProgressEvent::new(format!("download.cached {path}")));
                }
                DownloadOutcome::Skipped { reason } => {
                    debug!(paper = %record.id, reason = %reason, "skipped");
                    sink.event(ProgressEvent::new(format!("download.skipped {reason}")));
                }
                DownloadOutcome::Failed { error } => {
                    warn!(paper = %record.id, error = %error, "download failed");
                    sink.event(ProgressEvent::new(format!("download.failed {error}")));
                }
            }
            summary.record(&outcome);
        }
        summary
    }

    fn try_fetch(&self, record: &PaperRecord) -> DownloadOutcome {
        let Some(url) = record.pdf_url.as_deref() else {
            return DownloadOutcome::Skipped {
                reason: "no open access PDF available".to_string(),
            };
        };

        let target = self.store.pdf_path(&record.id);
        if OutputStore::is_nonempty_file(&target) {
            return DownloadOutcome::AlreadyPresent { path: target };
        }

        match self.download_atomic(url, &target) {
            Ok(bytes) => DownloadOutcome::Downloaded {
                path: target,
                bytes,
            },
            Err(error) => DownloadOutcome::Failed { error },
        }
    }

    fn download_atomic(&self, url: &str, target: &Utf8PathBuf) -> Result<u64, FetchError> {
        self.store.ensure_root()?;
        let temp = tempfile::Builder::new()
            .prefix(".paper-fetcher")
            .suffix(".part")
            .tempfile_in(self.store.root().as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;

        debug!(url, "fetching PDF");
        let bytes = self.source.fetch(url, temp.path())?;
        let written = fs::metadata(temp.path())
            .map(|meta| meta.len())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        if bytes == 0 || written == 0 {
            return Err(FetchError::EmptyDownload(url.to_string()));
        }
        if !looks_like_pdf(temp.path())? {
            return Err(FetchError::NotPdf(url.to_string()));
        }

        if target.as_std_path().exists() {
            fs::remove_file(target.as_std_path())
                .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        }
        temp.persist(target.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        Ok(written)
    }
}

fn looks_like_pdf(path: &Path) -> Result<bool, FetchError> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)
        .and_then(|file| file.take(SNIFF_LEN as u64).read_to_end(&mut head))
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    Ok(head.windows(5).any(|window| window == b"%PDF-"))
}

pub(crate) fn display_title(record: &PaperRecord) -> &str {
    if record.title.is_empty() {
        record.id.as_str()
    } else {
        &record.title
    }
}
