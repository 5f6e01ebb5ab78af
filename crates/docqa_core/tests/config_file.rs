use std::fs;

use docqa_core::config::{AppConfig, BudgetPolicy, DistanceMetric, IndexBackend, ProviderKind};
use docqa_core::error::codes;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[test]
fn loads_toml_over_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("docqa.toml");
    fs::write(
        &path,
        r#"
documents_dir = "docs"
state_dir = "state"

[embedding]
provider = "openai"
model = "text-embedding-3-small"
base_url = "https://api.openai.com"
dimension = 1536

[chunking]
chunk_size = 400
chunk_overlap = 50

[retrieval]
top_k = 5
similarity_threshold = 0.25
budget_policy = "truncate_tail"

[index]
backend = "disk"
metric = "dot"
"#,
    )
    .unwrap();

    let cfg = AppConfig::load(Some(&path)).expect("load");
    assert_eq!(cfg.documents_dir.to_str(), Some("docs"));
    assert_eq!(cfg.embedding.provider, ProviderKind::OpenAi);
    assert_eq!(cfg.embedding.dimension, 1536);
    assert_eq!(cfg.chunking.chunk_size, 400);
    assert_eq!(cfg.chunking.chunk_overlap, 50);
    assert_eq!(cfg.retrieval.top_k, 5);
    assert_eq!(cfg.retrieval.budget_policy, BudgetPolicy::TruncateTail);
    assert_eq!(cfg.index.backend, IndexBackend::Disk);
    assert_eq!(cfg.index.metric, DistanceMetric::Dot);
    // Untouched sections keep their defaults.
    assert_eq!(cfg.retry, AppConfig::default().retry);
    assert_eq!(cfg.generation, AppConfig::default().generation);
}

#[test]
fn invalid_chunking_in_file_fails_at_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("docqa.toml");
    fs::write(&path, "[chunking]\nchunk_size = 10\nchunk_overlap = 12\n").unwrap();

    let err = AppConfig::load(Some(&path)).unwrap_err();
    assert_eq!(err.code, codes::INVALID_CONFIGURATION);
}

#[test]
fn malformed_value_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("docqa.toml");
    fs::write(&path, "[retrieval]\ntop_k = \"many\"\n").unwrap();

    let err = AppConfig::load(Some(&path)).unwrap_err();
    assert_eq!(err.code, codes::INVALID_CONFIGURATION);
    assert!(err.details.is_some());
}
