use camino::Utf8PathBuf;
use serde_json::Value;

use paper_fetcher::domain::{DownloadStatus, EdgeKinds, PaperId, PaperRecord};
use paper_fetcher::store::{OutputStore, RunMetadata};
use paper_fetcher::walker::ExpansionFailure;

fn store(temp: &tempfile::TempDir) -> OutputStore {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap();
    OutputStore::new(root, "papers_metadata.json")
}

fn record(value: &str) -> PaperRecord {
    PaperRecord::new(value.parse().unwrap(), format!("Paper {value}"))
}

#[test]
fn metadata_file_uses_snake_case_fields() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    let mut seed = record("S");
    seed.abstract_text = Some("Short abstract.".to_string());
    seed.status = DownloadStatus::AlreadyPresent;
    let failure = ExpansionFailure {
        paper_id: "A".parse().unwrap(),
        depth: 1,
        message: "Semantic Scholar returned status 503: busy".to_string(),
    };
    let metadata = RunMetadata::new(
        seed.id.clone(),
        1,
        EdgeKinds::Both,
        vec![seed, record("A").with_depth(1)],
        vec![failure.clone()],
    );

    let path = store.write_metadata(&metadata).unwrap();

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["seed"], "S");
    assert_eq!(raw["edges"], "both");
    assert_eq!(raw["papers"][0]["abstract"], "Short abstract.");
    assert_eq!(raw["papers"][0]["status"], "already_present");
    assert_eq!(raw["papers"][1]["depth"], 1);
    assert!(raw["papers"][1]["local_path"].is_null());
    assert!(raw["tool"].as_str().unwrap().starts_with("paper-fetcher/"));

    let back = OutputStore::read_metadata(&path).unwrap();
    assert_eq!(back.expansion_failures, vec![failure]);
    assert_eq!(back.papers.len(), 2);
}

#[test]
fn metadata_is_replaced_not_appended() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    let seed: PaperId = "S".parse().unwrap();

    let first = RunMetadata::new(
        seed.clone(),
        1,
        EdgeKinds::Both,
        vec![record("S"), record("A"), record("B")],
        Vec::new(),
    );
    store.write_metadata(&first).unwrap();
    let second = RunMetadata::new(seed, 0, EdgeKinds::Both, vec![record("S")], Vec::new());
    store.write_metadata(&second).unwrap();

    let back = OutputStore::read_metadata(&store.metadata_path()).unwrap();
    assert_eq!(back.papers.len(), 1);
    assert_eq!(back.max_depth, 0);
    let leftovers: Vec<_> = std::fs::read_dir(store.root().as_std_path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["papers_metadata.json".to_string()]);
}

#[test]
fn reconcile_clears_paths_to_missing_or_empty_files() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    store.ensure_root().unwrap();

    let present = store.pdf_path(&"A".parse().unwrap());
    std::fs::write(present.as_std_path(), b"%PDF-1.4").unwrap();
    let empty = store.pdf_path(&"B".parse().unwrap());
    std::fs::write(empty.as_std_path(), b"").unwrap();

    let mut records = vec![record("A"), record("B"), record("C"), record("D")];
    records[0].local_path = Some(present.to_string());
    records[1].local_path = Some(empty.to_string());
    records[2].local_path = Some(store.root().join("C.pdf").to_string());

    let cleared = OutputStore::reconcile(&mut records);

    assert_eq!(cleared, 2);
    assert_eq!(records[0].local_path, Some(present.to_string()));
    assert_eq!(records[1].local_path, None);
    assert_eq!(records[2].local_path, None);
    assert_eq!(records[3].local_path, None);
}

#[test]
fn failed_replace_leaves_no_temp_file() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    // a non-empty directory where the metadata file should go
    let blocker = store.metadata_path();
    std::fs::create_dir_all(blocker.join("keep").as_std_path()).unwrap();
    let metadata = RunMetadata::new(
        "S".parse().unwrap(),
        0,
        EdgeKinds::Both,
        vec![record("S")],
        Vec::new(),
    );

    let result = store.write_metadata(&metadata);

    assert!(result.is_err());
    assert!(!store.root().join("papers_metadata.json.tmp").exists());
}
