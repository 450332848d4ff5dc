//! Hybrid Retriever.
//!
//! Searches the shared vector index first and only calls the web when local
//! evidence is thin or the caller forces it. New web content is chunked,
//! embedded and committed to the index as one batch, so later queries find it
//! without another web call. Local and web chunks are scored against the same
//! query vector and ranked together.

use crate::deadline::{call_with_deadline, cancellable, CancelToken};
use crate::types::{RetrievalResult, ScoredDocument, SearchSource};
use crate::web::{WebDocument, WebSearchProvider};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use verity_core::config::AppConfig;
use verity_core::{AppError, AppResult};
use verity_knowledge::hashing::normalize_text;
use verity_knowledge::vector_index::rank_order;
use verity_knowledge::{
    similarity_score, DocumentProcessor, InsertOutcome, SearchHit, SourceMetadata, VectorIndex,
};

/// Knobs for the local-versus-web decision.
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub top_k: usize,

    /// Index hits below this score are ignored
    pub min_relevance: f32,
    pub min_local_docs: usize,

    /// Mean local score needed to skip the web
    pub web_search_threshold: f32,
    pub web_max_results: usize,
    pub web_timeout: Duration,
}

impl RetrieverSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            min_relevance: config.retrieval.min_relevance,
            min_local_docs: config.retrieval.min_local_docs,
            web_search_threshold: config.retrieval.web_search_threshold,
            web_max_results: config.web_search.max_results,
            web_timeout: config.timeouts.web_search(),
        }
    }
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveMode {
    /// Call the web only when local evidence is thin
    Auto,

    /// Always call the web
    ForceWeb,
}

pub struct HybridRetriever {
    processor: DocumentProcessor,
    index: Arc<dyn VectorIndex>,
    web: Arc<dyn WebSearchProvider>,
    settings: RetrieverSettings,
}

impl HybridRetriever {
    pub fn new(
        processor: DocumentProcessor,
        index: Arc<dyn VectorIndex>,
        web: Arc<dyn WebSearchProvider>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            processor,
            index,
            web,
            settings,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Retrieve ranked evidence for `query`.
    ///
    /// Web search failure degrades to a local-only result. Query embedding
    /// failure and index faults are returned as errors.
    #[instrument(skip(self, query, cancel))]
    pub async fn retrieve(
        &self,
        query: &str,
        mode: RetrieveMode,
        cancel: &CancelToken,
    ) -> AppResult<RetrievalResult> {
        let query_vector = cancellable(cancel, self.processor.embed_query(query)).await?;

        let local: Vec<SearchHit> = self
            .index
            .search(&query_vector, self.settings.top_k)?
            .into_iter()
            .filter(|hit| hit.score >= self.settings.min_relevance)
            .collect();

        let local_count = local.len();
        let mean_score = if local.is_empty() {
            0.0
        } else {
            local.iter().map(|h| h.score).sum::<f32>() / local_count as f32
        };
        let local_sufficient = local_count >= self.settings.min_local_docs
            && mean_score >= self.settings.web_search_threshold;

        debug!(
            local_count,
            mean_score, local_sufficient, "Local search complete"
        );

        if mode == RetrieveMode::Auto && local_sufficient {
            return Ok(assemble(local, Vec::new(), SearchSource::LocalOnly, false));
        }

        let search = self.web.search(query, self.settings.web_max_results);
        let documents =
            match call_with_deadline("web search", self.settings.web_timeout, cancel, search)
                .await
            {
                Ok(documents) => documents,
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    warn!("Web search failed; continuing with local results: {}", e);
                    return Ok(assemble(local, Vec::new(), SearchSource::LocalOnly, true));
                }
            };

        info!(
            provider = self.web.provider_name(),
            documents = documents.len(),
            "Web search returned"
        );

        let (mut web, echoed_ids) = self
            .absorb_web_documents(query, &query_vector, documents, &local, cancel)
            .await?;

        // Pages indexed by an earlier attempt come back from both searches;
        // they count as web hits of this call.
        let (echoed, local): (Vec<SearchHit>, Vec<SearchHit>) = local
            .into_iter()
            .partition(|hit| echoed_ids.contains(&hit.chunk.id));
        web.extend(echoed);

        let source = if local.is_empty() {
            SearchSource::WebOnly
        } else {
            SearchSource::Hybrid
        };
        Ok(assemble(local, web, source, false))
    }

    /// Chunk, dedup, embed and index web documents, returning them scored.
    ///
    /// Chunks already in the index are reused rather than re-embedded. When
    /// the local search already returned one, it is left out of the web hits
    /// and its id is returned in the second set instead. Chunks whose
    /// embedding fails stay in the result with a lexical score but are not
    /// indexed.
    async fn absorb_web_documents(
        &self,
        query: &str,
        query_vector: &[f32],
        documents: Vec<WebDocument>,
        local: &[SearchHit],
        cancel: &CancelToken,
    ) -> AppResult<(Vec<SearchHit>, HashSet<String>)> {
        let local_ids: HashSet<&str> = local.iter().map(|h| h.chunk.id.as_str()).collect();
        let mut echoed = HashSet::new();
        let mut seen_hashes = HashSet::new();
        let mut hits = Vec::new();
        let mut fresh = Vec::new();

        for document in &documents {
            let source = SourceMetadata::web(&document.url, document.published_at);
            for chunk in self.processor.chunk(&document.text, &source) {
                if !seen_hashes.insert(chunk.content_hash.clone()) {
                    debug!(url = %document.url, "Skipping duplicate web chunk in batch");
                    continue;
                }
                match self.index.get_by_hash(&chunk.content_hash)? {
                    Some(stored) if local_ids.contains(stored.chunk.id.as_str()) => {
                        echoed.insert(stored.chunk.id);
                    }
                    Some(stored) => hits.push(SearchHit {
                        score: similarity_score(query_vector, &stored.embedding),
                        chunk: stored.chunk,
                    }),
                    None => fresh.push(chunk),
                }
            }
        }

        let batch = cancellable(cancel, async { Ok(self.processor.embed_all(fresh).await) }).await?;

        for chunk in batch.failed {
            hits.push(SearchHit {
                score: lexical_score(query, &chunk.text),
                chunk,
            });
        }

        let scored: Vec<SearchHit> = batch
            .embedded
            .iter()
            .map(|e| SearchHit {
                chunk: e.chunk.clone(),
                score: similarity_score(query_vector, &e.embedding),
            })
            .collect();

        let outcomes = self.index.insert_batch(batch.embedded)?;
        let mut inserted = 0;
        for (hit, outcome) in scored.into_iter().zip(outcomes) {
            match outcome {
                InsertOutcome::Inserted => {
                    inserted += 1;
                    hits.push(hit);
                }
                // Another query indexed the same text in the meantime.
                InsertOutcome::DuplicateHash => match self.index.get_by_hash(&hit.chunk.content_hash)? {
                    Some(stored) if local_ids.contains(stored.chunk.id.as_str()) => {
                        echoed.insert(stored.chunk.id);
                    }
                    Some(stored) => hits.push(SearchHit {
                        chunk: stored.chunk,
                        score: hit.score,
                    }),
                    None => hits.push(hit),
                },
            }
        }
        debug!(inserted, "Indexed web chunks");

        hits.sort_by(rank_order);
        hits.truncate(self.settings.top_k);
        Ok((hits, echoed))
    }
}

/// Merge local and web hits into a ranked result.
fn assemble(
    local: Vec<SearchHit>,
    web: Vec<SearchHit>,
    search_source: SearchSource,
    web_degraded: bool,
) -> RetrievalResult {
    let local_count = local.len();
    let web_count = web.len();

    let mut merged = local;
    merged.extend(web);
    merged.sort_by(rank_order);

    let mut documents = Vec::with_capacity(merged.len());
    let mut chunks = HashMap::with_capacity(merged.len());
    for (i, hit) in merged.into_iter().enumerate() {
        documents.push(ScoredDocument {
            chunk_id: hit.chunk.id.clone(),
            similarity_score: hit.score,
            rank: i + 1,
        });
        chunks.insert(hit.chunk.id.clone(), hit.chunk);
    }

    RetrievalResult {
        documents,
        chunks,
        search_source,
        local_count,
        web_count,
        web_degraded,
    }
}

/// Share of query terms found in `text`, in [0, 1].
pub fn lexical_score(query: &str, text: &str) -> f32 {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms = terms(text);
    let matched = query_terms.intersection(&text_terms).count();
    matched as f32 / query_terms.len() as f32
}

fn terms(text: &str) -> HashSet<String> {
    normalize_text(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}
