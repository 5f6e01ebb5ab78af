use std::collections::{HashMap, HashSet};
use std::path::Path;

use docqa_core::config::DistanceMetric;
use docqa_core::error::AppError;

use super::prepare_vector;
use super::similarity::{dot, l2_norm};
use crate::evidence::fsutil::corrupt;
use crate::evidence::model::{IndexEntry, SimilarityResult};

/// Brute-force storage shared by the index backends.
///
/// Entries keep insertion order; that order breaks score ties in `search`.
#[derive(Debug, Clone)]
pub(crate) struct FlatStore {
    pub(crate) metric: DistanceMetric,
    pub(crate) dimension: usize,
    entries: Vec<IndexEntry>,
    by_id: HashMap<String, usize>,
}

impl FlatStore {
    pub(crate) fn new(metric: DistanceMetric, dimension: usize) -> Self {
        Self {
            metric,
            dimension,
            entries: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    pub(crate) fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Validate every entry before appending any, so a bad batch leaves the store untouched.
    pub(crate) fn add(&mut self, entries: Vec<IndexEntry>) -> Result<(), AppError> {
        let mut prepared = Vec::with_capacity(entries.len());
        for mut entry in entries {
            entry.embedding = prepare_vector(entry.embedding, self.dimension, self.metric)
                .map_err(|e| {
                    let details = e.details.clone().unwrap_or_default();
                    e.with_details(format!("chunk_id={}; {details}", entry.chunk_id))
                })?;
            prepared.push(entry);
        }
        self.entries.reserve(prepared.len());
        for entry in prepared {
            self.by_id.insert(entry.chunk_id.clone(), self.entries.len());
            self.entries.push(entry);
        }
        Ok(())
    }

    /// Replace the contents with entries read from `path`.
    ///
    /// Stored vectors are kept bit-for-bit, but any that `add` would have
    /// rejected make the whole file `CORRUPT_INDEX` and leave the store untouched.
    pub(crate) fn replace(&mut self, path: &Path, entries: Vec<IndexEntry>) -> Result<(), AppError> {
        for e in &entries {
            let problem = if e.embedding.len() != self.dimension {
                Some(format!("dimension {}", e.embedding.len()))
            } else if e.embedding.iter().any(|x| !x.is_finite()) {
                Some("non-finite component".to_string())
            } else if self.metric == DistanceMetric::Cosine && l2_norm(&e.embedding) == 0.0 {
                Some("zero vector".to_string())
            } else {
                None
            };
            if let Some(problem) = problem {
                return Err(corrupt(
                    "Stored vector is invalid",
                    path,
                    format!("chunk_id={}; {problem}", e.chunk_id),
                ));
            }
        }
        self.entries = entries;
        self.reindex();
        Ok(())
    }

    pub(crate) fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>, AppError> {
        let query = prepare_vector(query.to_vec(), self.dimension, self.metric)?;
        if top_k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, e)| {
                let raw = dot(&query, &e.embedding);
                let score = match self.metric {
                    DistanceMetric::Cosine => raw.clamp(-1.0, 1.0),
                    DistanceMetric::Dot => raw,
                };
                (pos, score)
            })
            .collect::<Vec<_>>();

        // Highest score first; equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| SimilarityResult {
                chunk_id: self.entries[pos].chunk_id.clone(),
                score,
            })
            .collect())
    }

    pub(crate) fn get(&self, chunk_id: &str) -> Option<&IndexEntry> {
        self.by_id.get(chunk_id).map(|&pos| &self.entries[pos])
    }

    pub(crate) fn remove(&mut self, chunk_ids: &[String]) -> usize {
        if chunk_ids.is_empty() {
            return 0;
        }
        let doomed = chunk_ids.iter().map(String::as_str).collect::<HashSet<_>>();
        let before = self.entries.len();
        self.entries.retain(|e| !doomed.contains(e.chunk_id.as_str()));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.by_id.clear();
    }

    fn reindex(&mut self) {
        self.by_id = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (e.chunk_id.clone(), pos))
            .collect();
    }
}
