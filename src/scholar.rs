use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ScholarConfig;
use crate::domain::{EdgeKinds, PaperId, PaperRecord};
use crate::error::FetchError;

const PAPER_FIELDS: &str = "paperId,title,year,authors,abstract,url,externalIds,openAccessPdf";
// The edge endpoints reject openAccessPdf on nested papers; PDFs are filled in by `enrich`.
const EDGE_FIELDS: &str = "paperId,title,year,authors,abstract,url,externalIds";
const PAGE_SIZE: usize = 100;
const BATCH_SIZE: usize = 500;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Papers on either side of one paper's citation edges.
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    /// Papers the paper cites.
    pub references: Vec<PaperRecord>,
    /// Papers citing the paper.
    pub citations: Vec<PaperRecord>,
}

impl Neighbors {
    pub fn len(&self) -> usize {
        self.references.len() + self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && self.citations.is_empty()
    }

    /// References first, then citations, each in service order.
    pub fn into_records(self) -> impl Iterator<Item = PaperRecord> {
        self.references.into_iter().chain(self.citations)
    }
}

pub trait MetadataClient: Send + Sync {
    fn resolve_seed(&self, id: &PaperId) -> Result<PaperRecord, FetchError>;
    fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, FetchError>;
    fn references(&self, id: &PaperId) -> Result<Vec<PaperRecord>, FetchError>;
    fn citations(&self, id: &PaperId) -> Result<Vec<PaperRecord>, FetchError>;

    fn neighbors(&self, id: &PaperId) -> Result<Neighbors, FetchError> {
        self.neighbors_of_kind(id, EdgeKinds::Both)
    }

    fn neighbors_of_kind(&self, id: &PaperId, kinds: EdgeKinds) -> Result<Neighbors, FetchError> {
        let references = if kinds.references() {
            self.references(id)?
        } else {
            Vec::new()
        };
        let citations = if kinds.citations() {
            self.citations(id)?
        } else {
            Vec::new()
        };
        Ok(Neighbors {
            references,
            citations,
        })
    }

    /// Fills in missing PDF links and abstracts. Returns how many records
    /// gained a PDF link.
    fn enrich(&self, _records: &mut [PaperRecord]) -> Result<usize, FetchError> {
        Ok(0)
    }

    /// Looks up PDF links elsewhere for records that still have none but
    /// carry a DOI. Returns how many records gained a PDF link.
    fn find_open_access(&self, _records: &mut [PaperRecord]) -> Result<usize, FetchError> {
        Ok(0)
    }
}

pub struct ScholarHttpClient {
    client: Client,
    // no API key header: the key must not leave api.semanticscholar.org
    unpaywall: Client,
    config: ScholarConfig,
    last_request: Mutex<Option<Instant>>,
}

impl ScholarHttpClient {
    pub fn new(config: ScholarConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("paper-fetcher/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::InvalidOption(err.to_string()))?,
        );
        let unpaywall = Client::builder()
            .default_headers(headers.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|err| FetchError::UnpaywallHttp(err.to_string()))?;
        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|_| FetchError::InvalidOption("API key is not a valid header".to_string()))?;
            value.set_sensitive(true);
            headers.insert("x-api-key", value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| FetchError::ScholarHttp(err.to_string()))?;
        Ok(Self {
            client,
            unpaywall,
            config,
            last_request: Mutex::new(None),
        })
    }

    fn paper_url(&self, id: &PaperId) -> String {
        format!("{}/paper/{}", self.config.base_url, id.as_str())
    }

    fn throttle(&self) {
        let Ok(mut last) = self.last_request.lock() else {
            return;
        };
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.request_interval {
                thread::sleep(self.config.request_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn send_with_retries<F>(&self, make_req: F) -> Result<Response, FetchError>
    where
        F: FnMut() -> RequestBuilder,
    {
        self.retrying(true, make_req)
            .map_err(|err| FetchError::ScholarHttp(err.to_string()))
    }

    fn retrying<F>(&self, throttled: bool, mut make_req: F) -> Result<Response, reqwest::Error>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 1_000;
        let mut attempt = 0usize;
        loop {
            if throttled {
                self.throttle();
            }
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = retry_after(&resp).unwrap_or_else(|| {
                            Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1))
                        });
                        let delay_ms = delay.as_millis() as u64;
                        warn!(status, attempt, delay_ms, "retrying request");
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1));
                        warn!(error = %err, attempt, "retrying request");
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    fn handle_status(response: Response) -> Result<Response, FetchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Semantic Scholar request failed".to_string());
        Err(FetchError::ScholarStatus { status, message })
    }

    fn read_json(response: Response) -> Result<Value, FetchError> {
        response
            .json()
            .map_err(|err| FetchError::ScholarParse(err.to_string()))
    }

    fn edges(&self, id: &PaperId, endpoint: &str, key: &str) -> Result<Vec<PaperRecord>, FetchError> {
        let url = format!("{}/{endpoint}", self.paper_url(id));
        let cap = self.config.max_neighbors;
        let mut records = Vec::new();
        let mut offset = 0usize;
        loop {
            let limit = match cap {
                Some(cap) => PAGE_SIZE.min(cap.saturating_sub(records.len())),
                None => PAGE_SIZE,
            };
            if limit == 0 {
                break;
            }
            debug!(paper = %id, endpoint, offset, "fetching edge page");
            let page = match self.edge_page(&url, offset, limit) {
                Ok(page) => page,
                Err(err) if !records.is_empty() => {
                    warn!(
                        paper = %id,
                        endpoint,
                        offset,
                        kept = records.len(),
                        error = %err,
                        "keeping partial neighbor list"
                    );
                    break;
                }
                Err(err) => return Err(err),
            };
            let (batch, next) = parse_edge_page(&page, key);
            records.extend(batch);
            match next {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
        }
        if let Some(cap) = cap {
            records.truncate(cap);
        }
        Ok(dedup_by_id(records))
    }

    fn edge_page(&self, url: &str, offset: usize, limit: usize) -> Result<Value, FetchError> {
        let response = self.send_with_retries(|| {
            self.client.get(url).query(&[
                ("fields", EDGE_FIELDS.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
        })?;
        Self::read_json(Self::handle_status(response)?)
    }
}

impl MetadataClient for ScholarHttpClient {
    fn resolve_seed(&self, id: &PaperId) -> Result<PaperRecord, FetchError> {
        let url = self.paper_url(id);
        debug!(paper = %id, "resolving paper");
        let response =
            self.send_with_retries(|| self.client.get(&url).query(&[("fields", PAPER_FIELDS)]))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::SeedNotFound(id.to_string()));
        }
        let raw = Self::read_json(Self::handle_status(response)?)?;
        parse_paper(&raw).ok_or_else(|| {
            FetchError::ScholarParse(format!("paper {id} has no paperId in response"))
        })
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, FetchError> {
        let url = format!("{}/paper/search", self.config.base_url);
        debug!(query, limit, "searching papers");
        let response = self.send_with_retries(|| {
            self.client.get(&url).query(&[
                ("query", query.to_string()),
                ("limit", limit.to_string()),
                ("fields", PAPER_FIELDS.to_string()),
            ])
        })?;
        let raw = Self::read_json(Self::handle_status(response)?)?;
        Ok(parse_search(&raw))
    }

    fn references(&self, id: &PaperId) -> Result<Vec<PaperRecord>, FetchError> {
        self.edges(id, "references", "citedPaper")
    }

    fn citations(&self, id: &PaperId) -> Result<Vec<PaperRecord>, FetchError> {
        self.edges(id, "citations", "citingPaper")
    }

    fn enrich(&self, records: &mut [PaperRecord]) -> Result<usize, FetchError> {
        let url = format!("{}/paper/batch", self.config.base_url);
        let mut gained = 0usize;
        for chunk in records.chunks_mut(BATCH_SIZE) {
            let pending: Vec<usize> = chunk
                .iter()
                .enumerate()
                .filter(|(_, record)| record.pdf_url.is_none())
                .map(|(index, _)| index)
                .collect();
            if pending.is_empty() {
                continue;
            }
            let body = json!({
                "ids": pending
                    .iter()
                    .map(|index| chunk[*index].id.as_str())
                    .collect::<Vec<_>>()
            });
            debug!(count = pending.len(), "enriching papers");
            let response = self.send_with_retries(|| {
                self.client
                    .post(&url)
                    .query(&[("fields", PAPER_FIELDS)])
                    .json(&body)
            })?;
            let raw = Self::read_json(Self::handle_status(response)?)?;
            let details = raw.as_array().cloned().unwrap_or_default();
            for (index, detail) in pending.into_iter().zip(details) {
                let Some(detail) = parse_paper(&detail) else {
                    continue;
                };
                let record = &mut chunk[index];
                if record.pdf_url.is_none() && detail.pdf_url.is_some() {
                    record.pdf_url = detail.pdf_url;
                    gained += 1;
                }
                if record.abstract_text.is_none() {
                    record.abstract_text = detail.abstract_text;
                }
            }
        }
        Ok(gained)
    }

    fn find_open_access(&self, records: &mut [PaperRecord]) -> Result<usize, FetchError> {
        let Some(email) = self.config.unpaywall_email.as_deref() else {
            return Ok(0);
        };
        let mut gained = 0usize;
        for record in records.iter_mut().filter(|record| record.pdf_url.is_none()) {
            let Some(doi) = record.doi.clone() else {
                continue;
            };
            let url = format!("{}/{doi}", self.config.unpaywall_url);
            debug!(paper = %record.id, doi = %doi, "looking up Unpaywall");
            let response = self
                .retrying(false, || self.unpaywall.get(&url).query(&[("email", email)]))
                .map_err(|err| FetchError::UnpaywallHttp(err.to_string()))?;
            if !response.status().is_success() {
                debug!(paper = %record.id, status = response.status().as_u16(), "no Unpaywall entry");
                continue;
            }
            let raw: Value = match response.json() {
                Ok(raw) => raw,
                Err(err) => {
                    debug!(paper = %record.id, error = %err, "unreadable Unpaywall entry");
                    continue;
                }
            };
            if let Some(pdf_url) = parse_unpaywall(&raw) {
                record.pdf_url = Some(pdf_url);
                gained += 1;
            }
        }
        Ok(gained)
    }
}

/// Builds a record from a Semantic Scholar paper object. Returns `None` when
/// the object has no `paperId`; every other field is optional.
pub fn parse_paper(raw: &Value) -> Option<PaperRecord> {
    let id = raw
        .get("paperId")
        .and_then(Value::as_str)
        .and_then(PaperId::from_service)?;

    let mut record = PaperRecord::new(id, string_field(raw, "title").unwrap_or_default());
    record.year = raw
        .get("year")
        .and_then(Value::as_i64)
        .and_then(|year| i32::try_from(year).ok());
    record.authors = raw
        .get("authors")
        .and_then(Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(|author| string_field(author, "name"))
                .collect()
        })
        .unwrap_or_default();
    record.abstract_text = string_field(raw, "abstract");
    record.url = string_field(raw, "url");
    let external = raw.get("externalIds");
    record.doi = external.and_then(|ids| string_field(ids, "DOI"));
    record.arxiv_id = external.and_then(|ids| string_field(ids, "ArXiv"));
    record.pdf_url = raw
        .get("openAccessPdf")
        .and_then(|pdf| string_field(pdf, "url"))
        .or_else(|| record.arxiv_id.as_deref().map(arxiv_pdf_url));
    Some(record)
}

pub fn parse_search(raw: &Value) -> Vec<PaperRecord> {
    raw.get("data")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_paper).collect())
        .unwrap_or_default()
}

/// Parses one page of `/references` (key `citedPaper`) or `/citations`
/// (key `citingPaper`). Returns the records and the `next` offset.
pub fn parse_edge_page(raw: &Value, key: &str) -> (Vec<PaperRecord>, Option<usize>) {
    let records = raw
        .get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(key))
                .filter_map(parse_paper)
                .collect()
        })
        .unwrap_or_default();
    let next = raw
        .get("next")
        .and_then(Value::as_u64)
        .and_then(|next| usize::try_from(next).ok());
    (records, next)
}

/// `best_oa_location.url_for_pdf` of an Unpaywall DOI record.
pub fn parse_unpaywall(raw: &Value) -> Option<String> {
    raw.get("best_oa_location")
        .and_then(|location| string_field(location, "url_for_pdf"))
}

pub fn arxiv_pdf_url(arxiv_id: &str) -> String {
    format!("https://arxiv.org/pdf/{arxiv_id}.pdf")
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn dedup_by_id(records: Vec<PaperRecord>) -> Vec<PaperRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .collect()
}

fn retry_after(response: &Response) -> Option<Duration> {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after)
}

/// Seconds form of `Retry-After`, capped so one header cannot stall a run.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
