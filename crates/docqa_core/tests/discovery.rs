use std::fs;

use docqa_core::document::{discover_documents, DocumentLoader, Fingerprint, PlainTextLoader};
use docqa_core::error::codes;
use tempfile::tempdir;

#[test]
fn discovers_nested_files_in_stable_order_and_skips_hidden() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("guides/setup")).unwrap();
    fs::create_dir_all(root.join(".git")).unwrap();
    fs::write(root.join("b.txt"), "bravo").unwrap();
    fs::write(root.join("a.md"), "alpha").unwrap();
    fs::write(root.join("guides/setup/install.TXT"), "install steps").unwrap();
    fs::write(root.join(".hidden.txt"), "secret").unwrap();
    fs::write(root.join(".git/config"), "[core]").unwrap();

    let files = discover_documents(root).expect("discover");
    let ids = files.iter().map(|f| f.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["a.md", "b.txt", "guides/setup/install.TXT"]);
    assert_eq!(files[2].meta.format, "txt");
    assert_eq!(files[1].len, 5);
}

#[test]
fn missing_root_is_an_extraction_failure() {
    let dir = tempdir().unwrap();
    let err = discover_documents(&dir.path().join("nope")).unwrap_err();
    assert_eq!(err.code, codes::EXTRACTION_FAILURE);
}

#[test]
fn fingerprint_tracks_content_and_stat() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("doc.txt"), "one").unwrap();
    let files = discover_documents(dir.path()).unwrap();
    let file = &files[0];

    let text = PlainTextLoader.extract_text(&file.path).unwrap();
    let fp = Fingerprint::compute(file, &text);
    assert!(fp.matches_stat(file));
    assert_eq!(fp.sha256.len(), 64);

    fs::write(dir.path().join("doc.txt"), "one two").unwrap();
    let changed = discover_documents(dir.path()).unwrap();
    assert!(!fp.matches_stat(&changed[0]));
}
