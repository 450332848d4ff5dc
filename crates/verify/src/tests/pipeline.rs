//! Pipeline properties: bounds, degradation, citations, cancellation.

use super::fakes::*;
use crate::deadline::CancelToken;
use crate::retriever::{HybridRetriever, RetrieveMode, RetrieverSettings};
use crate::reasoning::LlmReasoning;
use crate::safety::{DISCLAIMER, SAFE_REFUSAL};
use crate::types::{SearchSource, VerificationStatus};
use crate::Verifier;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use verity_core::AppError;
use verity_knowledge::{content_hash, DocumentProcessor, MemoryIndex, SourceType, VectorIndex};

#[tokio::test]
async fn test_retry_budgets_are_never_exceeded() {
    let mut config = test_config();
    config.pipeline.max_retrieve_attempts = 2;
    config.pipeline.max_answer_attempts = 2;

    let harness = Harness::new(
        &config,
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new()
            .with_evidence(&[false; 10])
            .with_reviews(vec![rejection(None); 10]),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.retrieve_attempts, 2);
    assert_eq!(outcome.answer_attempts, 2);
    let reasoning = &harness.reasoning;
    assert_eq!(reasoning.classify_calls.load(Ordering::SeqCst), 3);
    assert_eq!(reasoning.synthesize_calls.load(Ordering::SeqCst), 3);
    assert_eq!(reasoning.review_calls.load(Ordering::SeqCst), 3);
    assert!(outcome.flags.safe_refusal);
    assert!(outcome.flags.low_confidence);
}

#[tokio::test]
async fn test_rejection_then_approval_resynthesizes() {
    let harness = Harness::new(
        &test_config(),
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new().with_reviews(vec![rejection(None)]),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Done);
    assert_eq!(outcome.answer_attempts, 1);
    assert!(!outcome.flags.safe_refusal);
    assert!(outcome.answer_text.starts_with("The bridge opened in March 1932 [1]."));
    assert_eq!(
        harness.reasoning.synthesize_calls.load(Ordering::SeqCst),
        2
    );
}

#[tokio::test]
async fn test_revision_is_released_without_second_review() {
    let harness = Harness::new(
        &test_config(),
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new().with_reviews(vec![rejection(Some(
            "Sources indicate the bridge opened in 1932 [1]. Unsupported aside [4].",
        ))]),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Done);
    assert!(outcome
        .answer_text
        .starts_with("Sources indicate the bridge opened in 1932 [1]. Unsupported aside."));
    assert_eq!(outcome.citations.len(), 1);
    assert_eq!(harness.reasoning.review_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.reasoning.synthesize_calls.load(Ordering::SeqCst),
        1
    );
}

fn llm_verifier(config: &verity_core::config::AppConfig, llm: Arc<QueuedLlm>) -> Verifier {
    Verifier::with_collaborators(
        config,
        Arc::new(MemoryIndex::new()),
        Arc::new(ScriptedEmbedder::new()),
        Arc::new(CountingWeb::returning(vec![web_doc(
            "https://news.example/1",
            "Opened in 1932.",
        )])),
        Arc::new(LlmReasoning::new(llm, "llama3.2")),
    )
}

#[tokio::test]
async fn test_rejection_with_placeholder_revision_resynthesizes() {
    let llm = Arc::new(QueuedLlm::new(&[
        "DECISION: SUFFICIENT\nRATIONALE: A dated report.",
        "CONCLUSION: TRUE\nCONFIDENCE: 0.9\nANSWER: It certainly opened in 1932 [1].",
        "DECISION: REJECT\nREASON: Overstated.\nREVISED: N/A",
        "CONCLUSION: TRUE\nCONFIDENCE: 0.8\nANSWER: Reports say it opened in 1932 [1].",
        "DECISION: APPROVE\nREASON: Fine.",
    ]));
    let verifier = llm_verifier(&test_config(), llm.clone());

    let outcome = verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Done);
    assert!(outcome
        .answer_text
        .starts_with("Reports say it opened in 1932 [1]."));
    assert!(!outcome.answer_text.contains("N/A"));
    assert_eq!(outcome.answer_attempts, 1);
    assert_eq!(outcome.citations.len(), 1);
    assert!(!outcome.flags.safe_refusal);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_rejection_with_revision_text_is_still_refused() {
    let mut config = test_config();
    config.pipeline.max_answer_attempts = 0;
    let llm = Arc::new(QueuedLlm::new(&[
        "DECISION: SUFFICIENT\nRATIONALE: A dated report.",
        "CONCLUSION: TRUE\nCONFIDENCE: 0.9\nANSWER: It opened in 1932 [1].",
        "DECISION: REJECT\nREASON: Harmful.\nREVISED: Something else entirely [1].",
    ]));
    let verifier = llm_verifier(&config, llm.clone());

    let outcome = verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Done);
    assert_eq!(outcome.answer_text, SAFE_REFUSAL);
    assert!(outcome.flags.safe_refusal);
    assert!(outcome.citations.is_empty());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_counts_previously_indexed_pages_as_web() {
    let mut config = test_config();
    config.pipeline.max_retrieve_attempts = 1;
    let harness = Harness::new(
        &config,
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new().with_evidence(&[false, true]),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    // The retry finds the page both in the index and on the web.
    assert_eq!(harness.web.calls(), 2);
    assert_eq!(outcome.status, VerificationStatus::Done);
    assert_eq!(outcome.search_source, Some(SearchSource::WebOnly));
    assert_eq!(outcome.local_count, 0);
    assert_eq!(outcome.web_count, 1);
    assert_eq!(outcome.citations.len(), 1);
    assert_eq!(outcome.citations[0].source_type, SourceType::Web);
    assert_eq!(harness.index.stats().unwrap().chunks_count, 1);
}

#[tokio::test]
async fn test_retry_keeps_genuine_local_hits_local() {
    let mut config = test_config();
    config.pipeline.max_retrieve_attempts = 1;
    let harness = Harness::new(
        &config,
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new().with_evidence(&[false, true]),
    );
    seed_local(harness.index.as_ref(), "The bridge opened in 1932.", 0.9);

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(harness.web.calls(), 2);
    assert_eq!(outcome.search_source, Some(SearchSource::Hybrid));
    assert_eq!(outcome.local_count, 1);
    assert_eq!(outcome.web_count, 1);
}

#[tokio::test]
async fn test_citations_reference_offered_evidence_only() {
    let harness = Harness::new(
        &test_config(),
        CountingWeb::returning(vec![
            web_doc("https://news.example/1", "Opened in 1932."),
            web_doc("https://news.example/2", "Designed by John Bradfield."),
        ]),
        ScriptedReasoning::new().with_answer("True [2]. Also [1, 9]. And [12]."),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    let offered: HashSet<String> = harness.reasoning.offered_evidence.lock().unwrap()[0]
        .iter()
        .map(|e| e.chunk_id.clone())
        .collect();
    assert_eq!(outcome.citations.len(), 2);
    for citation in &outcome.citations {
        assert!(offered.contains(&citation.chunk_id));
    }
    assert!(outcome.answer_text.starts_with("True [1]. Also [2]. And."));
}

#[tokio::test]
async fn test_hybrid_answers_cite_web_evidence_when_preferred() {
    let harness = Harness::new(
        &test_config(),
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new(),
    );
    seed_local(harness.index.as_ref(), "Older note: the bridge opened in 1932.", 0.95);

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.search_source, Some(SearchSource::Hybrid));
    let offered = harness.reasoning.offered_evidence.lock().unwrap();
    assert!(offered[0].iter().all(|e| e.source_type == SourceType::Web));
    assert_eq!(outcome.citations[0].source_type, SourceType::Web);
}

#[tokio::test]
async fn test_hybrid_answers_use_all_evidence_when_not_preferred() {
    let mut config = test_config();
    config.pipeline.prefer_web_citations_for_hybrid = false;
    let harness = Harness::new(
        &config,
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new(),
    );
    seed_local(harness.index.as_ref(), "Older note: the bridge opened in 1932.", 0.95);

    harness.verifier.verify(CLAIM).await;

    let offered = harness.reasoning.offered_evidence.lock().unwrap();
    assert_eq!(offered[0].len(), 2);
    // Highest score first.
    assert_eq!(offered[0][0].source_type, SourceType::Local);
}

#[tokio::test]
async fn test_web_failure_degrades_to_local_only() {
    let harness = Harness::new(&test_config(), CountingWeb::failing(), ScriptedReasoning::new());
    seed_local(harness.index.as_ref(), "The bridge opened in 1932.", 0.9);

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Done);
    assert_eq!(outcome.search_source, Some(SearchSource::LocalOnly));
    assert!(outcome.flags.web_search_degraded);
    assert_eq!(harness.web.calls(), 1);
    assert_eq!(outcome.local_count, 1);
}

#[tokio::test]
async fn test_web_timeout_degrades_to_local_only() {
    let harness = Harness::new(&test_config(), CountingWeb::stalling(), ScriptedReasoning::new());
    seed_local(harness.index.as_ref(), "The bridge opened in 1932.", 0.9);

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Done);
    assert_eq!(outcome.search_source, Some(SearchSource::LocalOnly));
    assert!(outcome.flags.web_search_degraded);
}

#[tokio::test]
async fn test_unembeddable_web_document_is_kept_but_not_indexed() {
    let embedder = ScriptedEmbedder::new().failing_on("outage");
    let harness = Harness::with_embedder(
        &test_config(),
        embedder,
        CountingWeb::returning(vec![
            web_doc("https://news.example/1", "Harbour bridge opened 1932 (outage page)."),
            web_doc("https://news.example/2", "Opened in 1932."),
        ]),
        ScriptedReasoning::new(),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Done);
    assert_eq!(outcome.web_count, 2);
    let stats = harness.index.stats().unwrap();
    assert_eq!(stats.web_chunks, 1);

    let offered = harness.reasoning.offered_evidence.lock().unwrap();
    let kept = offered[0]
        .iter()
        .find(|e| e.text.contains("outage"))
        .expect("unindexed chunk stays in the evidence");
    assert!(kept.score > 0.0 && kept.score <= 1.0);
}

#[tokio::test]
async fn test_embedding_timeout_on_web_chunk_is_absorbed() {
    let harness = Harness::with_embedder(
        &test_config(),
        ScriptedEmbedder::new().stalling_on("slow"),
        CountingWeb::returning(vec![web_doc("https://slow.example/1", "A slow page from 1932.")]),
        ScriptedReasoning::new(),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Done);
    assert_eq!(outcome.web_count, 1);
    assert_eq!(harness.index.stats().unwrap().chunks_count, 0);
}

#[tokio::test]
async fn test_known_web_content_is_reused_without_embedding() {
    let mut config = test_config();
    // Keeps the stored page out of the local hits so the web path sees it.
    config.retrieval.min_relevance = 0.9;
    let harness = Harness::new(
        &config,
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new(),
    );

    harness.verifier.verify(CLAIM).await;
    let calls_after_first = harness.embedder.calls.load(Ordering::SeqCst);
    let second = harness.verifier.verify(CLAIM).await;

    // Only the query was embedded again.
    assert_eq!(
        harness.embedder.calls.load(Ordering::SeqCst),
        calls_after_first + 1
    );
    assert_eq!(harness.index.stats().unwrap().chunks_count, 1);
    assert_eq!(second.status, VerificationStatus::Done);
    assert_eq!(second.search_source, Some(SearchSource::WebOnly));
    assert_eq!(second.web_count, 1);
    assert_eq!(second.citations.len(), 1);
}

#[tokio::test]
async fn test_concurrent_queries_share_one_copy_of_a_page() {
    let text = "Opened in 1932 after eight years of work.";
    let harness = Harness::new(
        &test_config(),
        CountingWeb::returning(vec![web_doc("https://news.example/1", text)]),
        ScriptedReasoning::new(),
    );

    let outcomes = join_all((0..8).map(|_| harness.verifier.verify(CLAIM))).await;

    assert!(outcomes.iter().all(|o| o.status == VerificationStatus::Done));
    let copies = harness
        .index
        .export()
        .unwrap()
        .into_iter()
        .filter(|c| c.chunk.content_hash == content_hash(text))
        .count();
    assert_eq!(copies, 1);
}

#[tokio::test]
async fn test_scores_stay_in_unit_interval() {
    let index: Arc<MemoryIndex> = Arc::new(MemoryIndex::new());
    let opposite = "Opposite direction entirely.";
    let embedder = ScriptedEmbedder::new().with_vector(opposite, vec![-1.0, 0.0, 0.0, 0.0]);
    seed_local(index.as_ref(), "Local note about the bridge.", 0.99);

    let settings = RetrieverSettings {
        min_relevance: 0.0,
        ..RetrieverSettings::default()
    };
    let processor = DocumentProcessor::new(Arc::new(embedder), 1000, 200, Duration::from_secs(1));
    let retriever = HybridRetriever::new(
        processor,
        index,
        Arc::new(CountingWeb::returning(vec![
            web_doc("https://news.example/1", opposite),
            web_doc("https://news.example/2", "Something else."),
        ])),
        settings,
    );

    let result = retriever
        .retrieve(CLAIM, RetrieveMode::ForceWeb, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(result.documents.len(), 3);
    for doc in &result.documents {
        assert!((0.0..=1.0).contains(&doc.similarity_score));
    }
    for pair in result.documents.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
        assert_eq!(pair[0].rank + 1, pair[1].rank);
    }
    let last = result.documents.last().unwrap();
    assert_eq!(last.similarity_score, 0.0);
}

#[tokio::test]
async fn test_evidence_failure_ends_failed() {
    let harness = Harness::new(
        &test_config(),
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new().with_evidence_error(AppError::UnrecoverableState(
            "verdict missing".to_string(),
        )),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Failed);
    assert!(outcome.answer_text.starts_with("Verification failed"));
    assert!(outcome.error.unwrap().contains("verdict missing"));
    assert_eq!(outcome.search_source, Some(SearchSource::WebOnly));
    assert_eq!(harness.reasoning.synthesize_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_query_embedding_failure_ends_failed() {
    let harness = Harness::with_embedder(
        &test_config(),
        ScriptedEmbedder::new().failing_on("harbour"),
        CountingWeb::returning(vec![]),
        ScriptedReasoning::new(),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    assert_eq!(outcome.status, VerificationStatus::Failed);
    assert_eq!(outcome.search_source, None);
    assert_eq!(harness.web.calls(), 0);
}

#[tokio::test]
async fn test_empty_query_fails_without_calls() {
    let harness = Harness::new(&test_config(), CountingWeb::returning(vec![]), ScriptedReasoning::new());

    let outcome = harness.verifier.verify("   ").await;

    assert_eq!(outcome.status, VerificationStatus::Failed);
    assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_stops_in_flight_query() {
    let harness = Harness::new(&test_config(), CountingWeb::stalling(), ScriptedReasoning::new());
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SHORT).await;
        trigger.cancel();
    });

    let outcome = harness.verifier.verify_with_cancel(CLAIM, &cancel).await;

    assert_eq!(outcome.status, VerificationStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("Cancelled"));
    assert_eq!(harness.web.calls(), 1);
    assert_eq!(harness.reasoning.classify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_issues_no_calls() {
    let harness = Harness::new(&test_config(), CountingWeb::returning(vec![]), ScriptedReasoning::new());
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = harness.verifier.verify_with_cancel(CLAIM, &cancel).await;

    assert_eq!(outcome.status, VerificationStatus::Failed);
    assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_released_answer_carries_disclaimer() {
    let harness = Harness::new(
        &test_config(),
        CountingWeb::returning(vec![web_doc("https://news.example/1", "Opened in 1932.")]),
        ScriptedReasoning::new()
            .with_answer("Claims about medication and a lawsuit are unrelated [1]."),
    );

    let outcome = harness.verifier.verify(CLAIM).await;

    assert!(outcome.answer_text.ends_with(DISCLAIMER));
    assert!(outcome.answer_text.contains("sensitive topics"));
}

#[tokio::test]
async fn test_no_evidence_short_circuits_reasoning() {
    let harness = Harness::new(&test_config(), CountingWeb::returning(vec![]), ScriptedReasoning::new());

    let outcome = harness.verifier.verify(CLAIM).await;

    let reasoning = &harness.reasoning;
    assert_eq!(outcome.status, VerificationStatus::Done);
    assert_eq!(outcome.conclusion, crate::types::Conclusion::Insufficient);
    assert!(outcome.answer_text.starts_with(crate::synthesizer::INSUFFICIENT_ANSWER));
    assert!(outcome.flags.low_confidence);
    assert_eq!(reasoning.classify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(reasoning.synthesize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(reasoning.review_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.web.calls(), 2);
}
