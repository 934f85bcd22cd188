//! Precision reranking of vector search candidates.
//!
//! A [`Reranker`] turns a recall-ordered candidate set into a total order by
//! relevance. [`ScoringReranker`] does so with a [`RelevanceScorer`], the
//! cross-encoding model that sees query and passage together. Ordering,
//! tie-breaking and truncation are handled here, so scorers only produce
//! numbers.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::document::{Candidate, RankedResult};
use crate::embedding::{is_ideographic, tokenize};
use crate::error::{RagError, Result};

/// A reranker that re-scores and reorders search candidates.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank `candidates` against `query` and keep the best `top_k`.
    ///
    /// Returns `min(top_k, candidates.len())` results ordered by descending
    /// `relevance_score`.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Result<Vec<RankedResult>>;
}

/// A model that scores `(query, passage)` pairs jointly.
///
/// Scores only need to be comparable within one call.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Return one score per passage, in input order.
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;

    /// A short name used in logs and errors.
    fn name(&self) -> &str;
}

/// A [`Reranker`] backed by a [`RelevanceScorer`].
///
/// Ties in relevance fall back to the candidate's similarity score, then to
/// its position in the input. An empty candidate set returns immediately
/// without calling the scorer.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use analyst_rag::{LexicalScorer, ScoringReranker};
///
/// let reranker = ScoringReranker::new(Arc::new(LexicalScorer::default()));
/// let top = reranker.rerank("humanoid robot market", candidates, 3).await?;
/// ```
pub struct ScoringReranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl ScoringReranker {
    /// Create a reranker around `scorer`.
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl Reranker for ScoringReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Result<Vec<RankedResult>> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let name = self.scorer.name();
        let passages: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let scores = self.scorer.score(query, &passages).await.map_err(|e| {
            error!(reranker = name, error = %e, "scoring failed");
            match e {
                RagError::Rerank { .. } => e,
                other => RagError::rerank(name, other.to_string()),
            }
        })?;

        if scores.len() != candidates.len() {
            return Err(RagError::rerank(
                name,
                format!("expected {} scores, got {}", candidates.len(), scores.len()),
            ));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(RagError::rerank(name, format!("non-finite relevance score {bad}")));
        }

        let mut scored: Vec<(usize, Candidate, f32)> = candidates
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(index, (candidate, score))| (index, candidate, score))
            .collect();

        scored.sort_by(|(index_a, a, score_a), (index_b, b, score_b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| b.similarity_score.total_cmp(&a.similarity_score))
                .then(index_a.cmp(index_b))
        });
        scored.truncate(top_k);

        debug!(reranker = name, result_count = scored.len(), "reranked candidates");

        Ok(scored
            .into_iter()
            .map(|(_, candidate, relevance_score)| RankedResult {
                id: candidate.id,
                text: candidate.text,
                relevance_score,
            })
            .collect())
    }
}

/// A reranker that keeps the recall order.
///
/// The relevance score is the similarity score. Useful as a default when no
/// reranking model is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Result<Vec<RankedResult>> {
        Ok(candidates
            .into_iter()
            .take(top_k)
            .map(|c| RankedResult { id: c.id, text: c.text, relevance_score: c.similarity_score })
            .collect())
    }
}

/// A local scorer based on query-term coverage.
///
/// The score is the fraction of distinct query terms (longer than
/// `min_term_len` characters; CJK bigrams always count) that occur in the
/// passage, plus a small bonus for the exact query phrase. Cheap, deterministic, and good enough to
/// exercise the reranking stage without a model.
#[derive(Debug, Clone)]
pub struct LexicalScorer {
    min_term_len: usize,
    phrase_bonus: f32,
}

impl LexicalScorer {
    /// Create a scorer ignoring query terms of `min_term_len` characters or fewer.
    pub fn new(min_term_len: usize) -> Self {
        Self { min_term_len, phrase_bonus: 0.25 }
    }
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self::new(2)
    }
}

#[async_trait]
impl RelevanceScorer for LexicalScorer {
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let terms: HashSet<String> = tokenize(query)
            .filter(|t| t.chars().any(is_ideographic) || t.chars().count() > self.min_term_len)
            .collect();
        let phrase = query.trim().to_lowercase();

        Ok(passages
            .iter()
            .map(|passage| {
                let words: HashSet<String> = tokenize(passage).collect();
                let coverage = if terms.is_empty() {
                    0.0
                } else {
                    terms.iter().filter(|t| words.contains(*t)).count() as f32 / terms.len() as f32
                };
                let bonus = if !phrase.is_empty() && passage.to_lowercase().contains(&phrase) {
                    self.phrase_bonus
                } else {
                    0.0
                };
                coverage + bonus
            })
            .collect())
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

