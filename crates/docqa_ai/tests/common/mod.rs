#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docqa_ai::embeddings::Embedder;
use docqa_ai::llm::Llm;
use docqa_ai::prompt::GenerationRequest;
use docqa_ai::retry::RetryPolicy;
use docqa_ai::EngineDeps;
use docqa_core::config::AppConfig;
use docqa_core::document::PlainTextLoader;
use docqa_core::error::{codes, AppError};

pub const VOCAB: [&str; 8] = ["sky", "blue", "grass", "green", "color", "what", "is", "the"];

/// Counts vocabulary words; anything outside `VOCAB` is ignored. Text with no
/// vocabulary words maps to a constant vector so it still embeds.
pub struct BagOfWords {
    calls: AtomicUsize,
    poison: Option<String>,
}

impl BagOfWords {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            poison: None,
        }
    }

    /// Fails permanently on any input containing `word`.
    pub fn failing_on(word: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            poison: Some(word.to_string()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for BagOfWords {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(p) = &self.poison {
            if input.contains(p.as_str()) {
                return Err(AppError::new(codes::EMBEDDING_FAILURE, "model rejected input"));
            }
        }
        let mut v = vec![0.0; VOCAB.len()];
        for token in input
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
        {
            if let Some(i) = VOCAB.iter().position(|w| *w == token) {
                v[i] += 1.0;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[VOCAB.len() - 1] = 0.5;
        }
        Ok(v)
    }
}

type Hook = Box<dyn FnOnce() + Send>;

/// `BagOfWords` that runs `hook` once, inside the first `embed` call, while the
/// caller's rebuild is in progress.
pub struct HookedEmbedder {
    inner: BagOfWords,
    hook: Mutex<Option<Hook>>,
}

impl HookedEmbedder {
    pub fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: BagOfWords::new(),
            hook: Mutex::new(Some(Box::new(hook))),
        }
    }
}

impl Embedder for HookedEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.embed(model, input)
    }
}

/// Echoes how many passages it was given and records every request.
#[derive(Default)]
pub struct RecordingLlm {
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl RecordingLlm {
    pub fn last(&self) -> GenerationRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

impl Llm for RecordingLlm {
    fn complete(&self, _model: &str, request: &GenerationRequest) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        let passages = request.context_block.matches("[source: ").count();
        Ok(format!("answer from {passages} passage(s)"))
    }
}

pub fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: AppConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.documents_dir = dir.path().join("docs");
        config.state_dir = dir.path().join("state");
        config.embedding.dimension = VOCAB.len();
        config.embedding.model = "bag-of-words".to_string();
        config.chunking.chunk_size = 20;
        config.chunking.chunk_overlap = 5;
        config.retrieval.top_k = 1;
        config.retrieval.similarity_threshold = 0.0;
        fs::create_dir_all(&config.documents_dir).unwrap();
        Self { dir, config }
    }

    pub fn docs(&self) -> &Path {
        &self.config.documents_dir
    }

    pub fn state(&self) -> &Path {
        &self.config.state_dir
    }

    pub fn write_doc(&self, name: &str, text: &str) -> PathBuf {
        let path = self.docs().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    pub fn deps(&self, embedder: Arc<BagOfWords>, llm: Arc<RecordingLlm>) -> EngineDeps {
        EngineDeps {
            embedder,
            llm,
            loader: Arc::new(PlainTextLoader),
        }
    }
}
