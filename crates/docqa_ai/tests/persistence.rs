mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use common::{BagOfWords, Fixture, HookedEmbedder, RecordingLlm};
use docqa_ai::{EngineDeps, QueryEngine, RebuildMode};
use docqa_core::config::{DistanceMetric, IndexBackend};
use docqa_core::document::PlainTextLoader;
use docqa_core::error::codes;
use pretty_assertions::assert_eq;

fn open(fx: &Fixture) -> Result<QueryEngine, docqa_core::error::AppError> {
    QueryEngine::open(
        &fx.config,
        fx.deps(Arc::new(BagOfWords::new()), Arc::new(RecordingLlm::default())),
    )
}

fn vector_blocks(gen_dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(gen_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|x| x == "bin"))
        .collect()
}

fn built(backend: IndexBackend) -> Fixture {
    let mut fx = Fixture::new();
    fx.config.index.backend = backend;
    fx.config.retrieval.top_k = 3;
    fx.write_doc("colors.txt", "The sky is blue. Grass is green.");
    fx.write_doc("more/night.md", "The blue sky at night.");
    open(&fx).unwrap().rebuild(fx.docs(), RebuildMode::Full).unwrap();
    fx
}

#[test]
fn both_backends_answer_identically_after_restart() {
    for backend in [IndexBackend::Memory, IndexBackend::Disk] {
        let fx = built(backend);

        let before = open(&fx).unwrap();
        let reopened = open(&fx).unwrap();
        let status = reopened.status().unwrap();
        assert_eq!(status.backend, backend);
        assert_eq!(status.entries, before.status().unwrap().entries);
        assert!(status.entries > 0);

        let a = before.answer("What color is grass?", None).unwrap();
        let b = reopened.answer("What color is grass?", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sources[0].chunk_text, ". Grass is green.");

        let gen_dir = fx.state().join(status.generation.unwrap());
        assert!(gen_dir.join("index.json").is_file());
        assert!(gen_dir.join("manifest.json").is_file());
        let expected_blocks = if backend == IndexBackend::Disk { 1 } else { 0 };
        assert_eq!(vector_blocks(&gen_dir).len(), expected_blocks);
    }
}

#[test]
fn stale_leftovers_from_an_interrupted_commit_are_ignored_and_pruned() {
    let fx = built(IndexBackend::Memory);
    let state = fx.state();

    // What a crash between writing a generation and swapping CURRENT leaves behind.
    fs::create_dir(state.join("gen-000099")).unwrap();
    fs::write(state.join("gen-000099").join("index.json"), "{ truncated").unwrap();
    fs::write(state.join("CURRENT.tmp"), "gen-000099").unwrap();

    let engine = open(&fx).unwrap();
    assert_eq!(engine.status().unwrap().generation.as_deref(), Some("gen-000001"));
    assert!(!engine.answer("What color is grass?", None).unwrap().sources.is_empty());

    let stats = engine.rebuild(fx.docs(), RebuildMode::Full).unwrap();
    assert_eq!(stats.generation.as_deref(), Some("gen-000100"));
    assert!(!state.join("gen-000099").exists());
    assert!(!state.join("gen-000001").exists());
    assert!(!state.join("CURRENT.tmp").exists());
}

#[test]
fn undecodable_index_is_corrupt() {
    let fx = built(IndexBackend::Memory);
    fs::write(fx.state().join("gen-000001").join("index.json"), b"\0\0garbage").unwrap();
    let err = open(&fx).err().unwrap();
    assert_eq!(err.code, codes::CORRUPT_INDEX);
}

#[test]
fn tampered_vector_block_is_corrupt() {
    let fx = built(IndexBackend::Disk);
    let blocks = vector_blocks(&fx.state().join("gen-000001"));
    assert_eq!(blocks.len(), 1);
    let bin = &blocks[0];
    let mut bytes = fs::read(bin).unwrap();
    bytes[0] ^= 0xff;
    fs::write(bin, bytes).unwrap();
    assert_eq!(open(&fx).err().unwrap().code, codes::CORRUPT_INDEX);

    fs::write(bin, b"short").unwrap();
    assert_eq!(open(&fx).err().unwrap().code, codes::CORRUPT_INDEX);
}

#[test]
fn dimension_or_metric_mismatch_is_corrupt() {
    let mut fx = built(IndexBackend::Memory);
    fx.config.embedding.dimension += 1;
    assert_eq!(open(&fx).err().unwrap().code, codes::CORRUPT_INDEX);

    fx.config.embedding.dimension -= 1;
    fx.config.index.metric = DistanceMetric::Dot;
    assert_eq!(open(&fx).err().unwrap().code, codes::CORRUPT_INDEX);
}

#[test]
fn switching_backend_requires_a_full_rebuild() {
    let mut fx = built(IndexBackend::Memory);
    fx.config.index.backend = IndexBackend::Disk;
    assert_eq!(open(&fx).err().unwrap().code, codes::CORRUPT_INDEX);

    // A fresh state directory plus a full rebuild recovers.
    fx.config.state_dir = fx.dir.path().join("state-disk");
    let engine = open(&fx).unwrap();
    engine.rebuild(fx.docs(), RebuildMode::Full).unwrap();
    assert_eq!(engine.status().unwrap().backend, IndexBackend::Disk);
}

#[test]
fn reload_swaps_in_state_written_by_another_engine() {
    let fx = built(IndexBackend::Memory);
    let reader = open(&fx).unwrap();
    let before = reader.status().unwrap().entries;

    fx.write_doc("extra.txt", "Green grass, blue sky, what else is there?");
    let writer = open(&fx).unwrap();
    writer.rebuild(fx.docs(), RebuildMode::Incremental).unwrap();

    assert_eq!(reader.status().unwrap().entries, before);
    let generation = reader.reload().unwrap();
    assert_eq!(generation.as_deref(), Some("gen-000002"));
    assert_eq!(reader.status().unwrap().entries, writer.status().unwrap().entries);
    assert!(reader.status().unwrap().entries > before);
}

#[test]
fn reload_during_a_rebuild_serves_the_generation_it_commits() {
    let fx = built(IndexBackend::Memory);
    fx.write_doc("extra.txt", "Green grass, blue sky.");

    let (started_tx, started_rx) = mpsc::channel();
    let embedder = HookedEmbedder::new(move || {
        started_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(100));
    });
    let engine = QueryEngine::open(
        &fx.config,
        EngineDeps {
            embedder: Arc::new(embedder),
            llm: Arc::new(RecordingLlm::default()),
            loader: Arc::new(PlainTextLoader),
        },
    )
    .unwrap();

    thread::scope(|s| {
        let rebuild = s.spawn(|| engine.rebuild(fx.docs(), RebuildMode::Incremental).unwrap());
        started_rx.recv().unwrap();
        let reloaded = engine.reload().unwrap();
        let stats = rebuild.join().unwrap();
        assert_eq!(reloaded.as_deref(), Some("gen-000002"));
        assert_eq!(reloaded, stats.generation);
    });

    let status = engine.status().unwrap();
    assert_eq!(status.generation.as_deref(), Some("gen-000002"));
    assert_eq!(status.entries, open(&fx).unwrap().status().unwrap().entries);
}
