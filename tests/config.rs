use std::time::Duration;

use assert_matches::assert_matches;

use paper_fetcher::config::{
    Config, ConfigLoader, DEFAULT_BASE_URL, DEFAULT_MAX_NEIGHBORS, DEFAULT_UNPAYWALL_URL, Overrides,
};
use paper_fetcher::domain::{EdgeKinds, ExpansionPolicy, SeedSpecifier};
use paper_fetcher::error::FetchError;

fn seed() -> SeedSpecifier {
    SeedSpecifier::Id("ARXIV:1706.03762".parse().unwrap())
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");

    let result = ConfigLoader::load(path.to_str());

    assert_matches!(result, Err(FetchError::ConfigRead(missing)) if missing == path);
}

#[test]
fn config_file_is_parsed() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("paper-fetcher.json");
    std::fs::write(
        &path,
        r#"{
            "output_dir": "library",
            "depth": 2,
            "edges": "references",
            "on_service_error": "abort",
            "max_neighbors": 50,
            "request_interval_ms": 250,
            "base_url": "http://localhost:8080/graph/v1/"
        }"#,
    )
    .unwrap();

    let config = ConfigLoader::load(path.to_str()).unwrap();
    let resolved = ConfigLoader::resolve_config(config, Overrides::default(), &seed()).unwrap();

    assert_eq!(resolved.output_dir.as_str(), "library");
    assert_eq!(resolved.walker.max_depth, 2);
    assert_eq!(resolved.walker.edges, EdgeKinds::References);
    assert_eq!(resolved.walker.policy, ExpansionPolicy::Abort);
    assert_eq!(resolved.scholar.max_neighbors, Some(50));
    assert_eq!(resolved.scholar.request_interval, Duration::from_millis(250));
    assert_eq!(resolved.scholar.base_url, "http://localhost:8080/graph/v1");
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    std::fs::write(&path, "{ depth: two }").unwrap();

    assert_matches!(
        ConfigLoader::load(path.to_str()),
        Err(FetchError::ConfigParse(_))
    );
}

#[test]
fn command_line_wins_over_file_and_environment() {
    let config = Config {
        api_key: Some("from-file".to_string()),
        output_dir: Some("file-dir".to_string()),
        depth: Some(3),
        ..Config::default()
    };
    let overrides = Overrides {
        api_key: Some("from-cli".to_string()),
        env_api_key: Some("from-env".to_string()),
        depth: Some(0),
        ..Overrides::default()
    };

    let resolved = ConfigLoader::resolve_config(config, overrides, &seed()).unwrap();

    assert_eq!(resolved.scholar.api_key.as_deref(), Some("from-cli"));
    assert_eq!(resolved.output_dir.as_str(), "file-dir");
    assert_eq!(resolved.walker.max_depth, 0);
}

#[test]
fn environment_key_is_the_last_resort_and_shortens_the_interval() {
    let anonymous =
        ConfigLoader::resolve_config(Config::default(), Overrides::default(), &seed()).unwrap();
    assert_eq!(anonymous.scholar.api_key, None);
    assert_eq!(anonymous.scholar.base_url, DEFAULT_BASE_URL);

    let overrides = Overrides {
        env_api_key: Some("from-env".to_string()),
        ..Overrides::default()
    };
    let keyed = ConfigLoader::resolve_config(Config::default(), overrides, &seed()).unwrap();
    assert_eq!(keyed.scholar.api_key.as_deref(), Some("from-env"));
    assert!(keyed.scholar.request_interval < anonymous.scholar.request_interval);
}

#[test]
fn out_of_range_limits_are_rejected() {
    for overrides in [
        Overrides {
            search_limit: Some(0),
            ..Overrides::default()
        },
        Overrides {
            search_limit: Some(1000),
            ..Overrides::default()
        },
        Overrides {
            max_papers: Some(0),
            ..Overrides::default()
        },
        Overrides {
            output_dir: Some("  ".to_string()),
            ..Overrides::default()
        },
    ] {
        assert_matches!(
            ConfigLoader::resolve_config(Config::default(), overrides, &seed()),
            Err(FetchError::InvalidOption(_))
        );
    }
}

#[test]
fn neighbor_cap_and_unpaywall_settings() {
    let defaults =
        ConfigLoader::resolve_config(Config::default(), Overrides::default(), &seed()).unwrap();
    assert_eq!(defaults.scholar.max_neighbors, Some(DEFAULT_MAX_NEIGHBORS));
    assert_eq!(defaults.scholar.unpaywall_email, None);
    assert_eq!(defaults.scholar.unpaywall_url, DEFAULT_UNPAYWALL_URL);

    let config = Config {
        unpaywall_email: Some("file@example.org".to_string()),
        ..Config::default()
    };
    let overrides = Overrides {
        unpaywall_email: Some("cli@example.org".to_string()),
        ..Overrides::default()
    };
    let resolved = ConfigLoader::resolve_config(config, overrides, &seed()).unwrap();
    assert_eq!(
        resolved.scholar.unpaywall_email.as_deref(),
        Some("cli@example.org")
    );

    let zero = Config {
        max_neighbors: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero, Overrides::default(), &seed()),
        Err(FetchError::InvalidOption(_))
    );
}
