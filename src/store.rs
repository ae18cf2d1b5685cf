use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{EdgeKinds, PaperId, PaperRecord};
use crate::error::FetchError;
use crate::walker::ExpansionFailure;

const MAX_FILE_STEM: usize = 120;
const DIGEST_BYTES: usize = 4;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid file name pattern"));
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("valid underscore pattern"));

/// Layout of one output directory: PDFs named after paper ids plus a single
/// metadata file.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: Utf8PathBuf,
    metadata_file: String,
}

impl OutputStore {
    pub fn new(root: Utf8PathBuf, metadata_file: impl Into<String>) -> Self {
        Self {
            root,
            metadata_file: metadata_file.into(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.root.join(&self.metadata_file)
    }

    pub fn pdf_path(&self, id: &PaperId) -> Utf8PathBuf {
        self.root.join(pdf_file_name(id))
    }

    pub fn ensure_root(&self) -> Result<(), FetchError> {
        fs::create_dir_all(self.root.as_std_path()).map_err(|err| {
            FetchError::Filesystem(format!("create output directory {}: {err}", self.root))
        })
    }

    pub fn is_nonempty_file(path: &Utf8Path) -> bool {
        fs::metadata(path.as_std_path())
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Clears `local_path` on records whose file is gone or empty, so the
    /// metadata never points at a missing PDF. Returns how many were cleared.
    pub fn reconcile(records: &mut [PaperRecord]) -> usize {
        let mut cleared = 0;
        for record in records.iter_mut() {
            let missing = record
                .local_path
                .as_deref()
                .is_some_and(|path| !Self::is_nonempty_file(Utf8Path::new(path)));
            if missing {
                record.local_path = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Replaces any previous metadata file in one rename.
    pub fn write_metadata(&self, metadata: &RunMetadata) -> Result<Utf8PathBuf, FetchError> {
        self.ensure_root()?;
        let path = self.metadata_path();
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| FetchError::Filesystem(format!("write {tmp_path}: {err}")))?;
        if let Err(err) = fs::rename(tmp_path.as_std_path(), path.as_std_path()) {
            let _ = fs::remove_file(tmp_path.as_std_path());
            return Err(FetchError::Filesystem(format!("replace {path}: {err}")));
        }
        Ok(path)
    }

    pub fn read_metadata(path: &Utf8Path) -> Result<RunMetadata, FetchError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| FetchError::Filesystem(err.to_string()))
    }
}

/// Everything one run writes to the metadata file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub generated_at: String,
    pub tool: String,
    pub seed: PaperId,
    pub max_depth: u32,
    pub edges: EdgeKinds,
    pub papers: Vec<PaperRecord>,
    #[serde(default)]
    pub expansion_failures: Vec<ExpansionFailure>,
}

impl RunMetadata {
    pub fn new(
        seed: PaperId,
        max_depth: u32,
        edges: EdgeKinds,
        papers: Vec<PaperRecord>,
        expansion_failures: Vec<ExpansionFailure>,
    ) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("paper-fetcher/{}", env!("CARGO_PKG_VERSION")),
            seed,
            max_depth,
            edges,
            papers,
            expansion_failures,
        }
    }
}

/// Deterministic file name for a paper's PDF. Ids that had to be rewritten
/// to be safe get a short digest of the raw id appended, so two ids never
/// share a file.
pub fn pdf_file_name(id: &PaperId) -> String {
    let replaced = UNSAFE_CHARS.replace_all(id.as_str(), "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    let stem: String = collapsed
        .trim_matches(|ch| ch == '_' || ch == '.')
        .chars()
        .take(MAX_FILE_STEM)
        .collect();
    if stem == id.as_str() {
        return format!("{stem}.pdf");
    }
    let stem = if stem.is_empty() { "paper" } else { &stem };
    format!("{stem}_{}.pdf", short_digest(id.as_str()))
}

fn short_digest(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .take(DIGEST_BYTES)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
