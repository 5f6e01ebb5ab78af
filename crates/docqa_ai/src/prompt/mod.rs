//! Merge system prompt, retrieved evidence and the user's question into one request.

use docqa_core::config::{BudgetPolicy, RetrievalConfig};

use crate::retrieve::Evidence;

mod templates;

pub use templates::{source_tag, EVIDENCE_SEPARATOR, NO_CONTEXT_MARKER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub context_block: String,
    pub user_query: String,
}

impl GenerationRequest {
    /// Single prompt string for models without a separate system channel.
    pub fn render(&self) -> String {
        templates::render(&self.system_prompt, &self.context_block, &self.user_query)
    }

    /// Everything except the system prompt, for chat-style models.
    pub fn user_turn(&self) -> String {
        templates::user_turn(&self.context_block, &self.user_query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub request: GenerationRequest,
    /// How many leading evidence items made it into the context block.
    pub included: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptAssembler {
    max_context_length: usize,
    policy: BudgetPolicy,
}

impl PromptAssembler {
    pub fn new(max_context_length: usize, policy: BudgetPolicy) -> Self {
        Self {
            max_context_length,
            policy,
        }
    }

    pub fn from_config(cfg: &RetrievalConfig) -> Self {
        Self::new(cfg.max_context_length, cfg.budget_policy)
    }

    /// `evidence` must be in retrieval order (score descending).
    ///
    /// The context block never exceeds `max_context_length` chars.
    pub fn assemble(&self, system_prompt: &str, evidence: &[Evidence], user_query: &str) -> Assembled {
        let blocks = evidence
            .iter()
            .map(|e| templates::evidence_block(&e.chunk.document_id, e.chunk.position, &e.chunk.text))
            .collect::<Vec<_>>();

        let (context_block, included) = if blocks.is_empty() {
            (NO_CONTEXT_MARKER.to_string(), 0)
        } else {
            match self.policy {
                BudgetPolicy::DropLowestScore => drop_lowest(blocks, self.max_context_length),
                BudgetPolicy::TruncateTail => truncate_tail(&blocks, self.max_context_length),
            }
        };

        Assembled {
            request: GenerationRequest {
                system_prompt: system_prompt.to_string(),
                context_block,
                user_query: user_query.to_string(),
            },
            included,
        }
    }
}

fn joined_len(blocks: &[String]) -> usize {
    let sep = EVIDENCE_SEPARATOR.chars().count();
    blocks.iter().map(|b| b.chars().count()).sum::<usize>() + sep * blocks.len().saturating_sub(1)
}

fn drop_lowest(mut blocks: Vec<String>, budget: usize) -> (String, usize) {
    while blocks.len() > 1 && joined_len(&blocks) > budget {
        blocks.pop();
    }
    let included = blocks.len();
    let joined = blocks.join(EVIDENCE_SEPARATOR);
    // Only reachable with a single block longer than the budget.
    (take_chars(&joined, budget), included)
}

fn truncate_tail(blocks: &[String], budget: usize) -> (String, usize) {
    let sep = EVIDENCE_SEPARATOR.chars().count();
    let mut used = 0;
    let mut included = 0;
    for (i, b) in blocks.iter().enumerate() {
        let start = if i == 0 { 0 } else { used + sep };
        if start >= budget {
            break;
        }
        included += 1;
        used = start + b.chars().count();
    }
    (take_chars(&blocks.join(EVIDENCE_SEPARATOR), budget), included)
}

fn take_chars(s: &str, n: usize) -> String {
    match s.char_indices().nth(n) {
        Some((byte, _)) => s[..byte].to_string(),
        None => s.to_string(),
    }
}
