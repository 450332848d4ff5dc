//! Tests for processor, index and snapshot working together.

use crate::embeddings::MockProvider;
use crate::memory_index::MemoryIndex;
use crate::processor::DocumentProcessor;
use crate::types::{InsertOutcome, SourceMetadata};
use crate::vector_index::VectorIndex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn processor() -> DocumentProcessor {
    DocumentProcessor::new(
        Arc::new(MockProvider::new(128)),
        300,
        50,
        Duration::from_secs(1),
    )
}

async fn index_docs(proc: &DocumentProcessor, index: &MemoryIndex, docs: &[(&str, &str)]) {
    for (path, text) in docs {
        let chunks = proc.chunk(text, &SourceMetadata::local(*path));
        let batch = proc.embed_all(chunks).await;
        index.insert_batch(batch.embedded).unwrap();
    }
}

#[tokio::test]
async fn test_relevant_query_ranks_matching_chunk_first() {
    let proc = processor();
    let index = MemoryIndex::new();
    index_docs(
        &proc,
        &index,
        &[
            ("tower.txt", "The Eiffel Tower stands in Paris and opened in 1889."),
            ("pasta.txt", "Cooking recipes for pasta with tomato sauce."),
            ("rust.txt", "Rust is a systems programming language."),
        ],
    )
    .await;

    let query = proc.embed_query("When did the Eiffel Tower open?").await.unwrap();
    let hits = index.search(&query, 3).unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].chunk.source_locator, "tower.txt");
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
}

#[tokio::test]
async fn test_readers_proceed_during_batch_commit() {
    let proc = processor();
    let index = Arc::new(MemoryIndex::new());
    index_docs(&proc, &index, &[("seed.txt", "Seed document about oceans.")]).await;
    let query = proc.embed_query("oceans").await.unwrap();

    let writer = {
        let index = Arc::clone(&index);
        let proc = proc.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                let text = format!("Generated web page number {} about tides", i);
                let chunks = proc.chunk(&text, &SourceMetadata::web(format!("https://w/{}", i), None));
                let batch = proc.embed_all(chunks).await;
                index.insert_batch(batch.embedded).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            let query = query.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let hits = index.search(&query, 5).unwrap();
                    assert!(!hits.is_empty());
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(index.stats().unwrap().chunks_count, 51);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("index.sqlite");
    let proc = processor();

    let query;
    let before;
    {
        let index = MemoryIndex::new();
        index_docs(
            &proc,
            &index,
            &[
                ("a.txt", "Mount Everest is the highest mountain above sea level."),
                ("b.txt", "The Pacific is the largest ocean."),
            ],
        )
        .await;
        query = proc.embed_query("highest mountain").await.unwrap();
        before = index.search(&query, 2).unwrap();
        index.persist(&path).unwrap();
    }

    let restored = MemoryIndex::new();
    restored.load(&path).unwrap();
    let after = restored.search(&query, 2).unwrap();

    assert_eq!(before, after);

    let dup = proc.embed(&before[0].chunk).await.unwrap();
    assert_eq!(restored.insert(dup).unwrap(), InsertOutcome::DuplicateHash);

    // Reloading the same snapshot adds nothing.
    assert_eq!(restored.load(&path).unwrap(), 0);
}
