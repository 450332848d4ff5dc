//! Document ingestion from the local filesystem and from web pages.

use crate::parser::{self, ContentType};
use crate::processor::DocumentProcessor;
use crate::types::{IngestStats, InsertOutcome, SourceMetadata};
use crate::vector_index::VectorIndex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::Path;
use std::time::{Duration, Instant};
use verity_core::{AppError, AppResult};
use walkdir::WalkDir;

/// Options for the ingest operation.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Skip paths containing any of these substrings
    pub exclude: Vec<String>,
}

/// Ingest a file or every supported file under a directory as local chunks.
pub async fn ingest_path(
    processor: &DocumentProcessor,
    index: &dyn VectorIndex,
    path: &Path,
    options: &IngestOptions,
) -> AppResult<IngestStats> {
    let start = Instant::now();

    if !path.exists() {
        return Err(AppError::Knowledge(format!(
            "Ingest path does not exist: {:?}",
            path
        )));
    }

    tracing::info!("Starting ingest of {:?}", path);

    let files: Vec<_> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| ContentType::from_path(p).is_supported() && should_include(p, options))
        .collect();

    let mut stats = IngestStats::default();

    for file in &files {
        match ingest_file(processor, index, file, &mut stats).await {
            Ok(()) => stats.sources_count += 1,
            // Index faults are not per-file problems.
            Err(e @ AppError::Storage(_)) => return Err(e),
            Err(e) => tracing::warn!("Skipping {:?}: {}", file, e),
        }
    }

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Ingest completed: {} sources, {} chunks ({} duplicate, {} failed), {} bytes in {:.2}s",
        stats.sources_count,
        stats.chunks_count,
        stats.duplicate_chunks,
        stats.failed_chunks,
        stats.bytes_processed,
        stats.duration_secs
    );

    Ok(stats)
}

/// Fetch one web page and index its text as web chunks located by `url`.
pub async fn ingest_url(
    processor: &DocumentProcessor,
    index: &dyn VectorIndex,
    url: &str,
    timeout: Duration,
) -> AppResult<IngestStats> {
    let start = Instant::now();

    if !is_url(url) {
        return Err(AppError::Knowledge(format!(
            "Not an http(s) URL: {}",
            url
        )));
    }

    tracing::info!("Fetching {}", url);
    let text = fetch_page(url, timeout).await?;
    if text.is_empty() {
        return Err(AppError::Knowledge(format!("No text content at {}", url)));
    }

    let mut stats = IngestStats::default();
    index_text(processor, index, &text, &SourceMetadata::web(url, None), &mut stats).await?;
    stats.sources_count = 1;
    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Ingested {}: {} chunks ({} duplicate, {} failed), {} bytes in {:.2}s",
        url,
        stats.chunks_count,
        stats.duplicate_chunks,
        stats.failed_chunks,
        stats.bytes_processed,
        stats.duration_secs
    );

    Ok(stats)
}

/// Whether `source` names a web page rather than a filesystem path.
pub fn is_url(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn fetch_page(url: &str, timeout: Duration) -> AppResult<String> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Knowledge(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to fetch {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Knowledge(format!(
            "Failed to fetch {}: HTTP {}",
            url, status
        )));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ContentType::from_mime)
        .unwrap_or(ContentType::Html);

    let body = response
        .text()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to read {}: {}", url, e)))?;

    tracing::debug!(content_type = content_type.as_str(), bytes = body.len(), "Fetched page");
    Ok(parser::parse_text(&body, content_type))
}

async fn ingest_file(
    processor: &DocumentProcessor,
    index: &dyn VectorIndex,
    path: &Path,
    stats: &mut IngestStats,
) -> AppResult<()> {
    tracing::debug!("Processing file: {:?}", path);

    let text = parser::parse_file(path)?;
    let source = SourceMetadata::local(path.to_string_lossy());
    index_text(processor, index, &text, &source, stats).await
}

/// Chunk, embed and insert `text`, skipping already-indexed chunks.
async fn index_text(
    processor: &DocumentProcessor,
    index: &dyn VectorIndex,
    text: &str,
    source: &SourceMetadata,
    stats: &mut IngestStats,
) -> AppResult<()> {
    let mut chunks = processor.chunk(text, source);
    // Already-indexed text need not be embedded again.
    let mut fresh = Vec::with_capacity(chunks.len());
    for chunk in chunks.drain(..) {
        if index.contains_hash(&chunk.content_hash)? {
            stats.duplicate_chunks += 1;
        } else {
            fresh.push(chunk);
        }
    }

    let batch = processor.embed_all(fresh).await;
    stats.failed_chunks += batch.failed.len() as u32;

    for outcome in index.insert_batch(batch.embedded)? {
        match outcome {
            InsertOutcome::Inserted => stats.chunks_count += 1,
            InsertOutcome::DuplicateHash => stats.duplicate_chunks += 1,
        }
    }

    stats.bytes_processed += text.len() as u64;
    Ok(())
}

/// Check if a file should be included based on exclude patterns.
fn should_include(path: &Path, options: &IngestOptions) -> bool {
    let path_str = path.to_string_lossy();
    !options
        .exclude
        .iter()
        .any(|pattern| path_str.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockProvider;
    use crate::memory_index::MemoryIndex;
    use crate::types::SourceType;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(
            Arc::new(MockProvider::new(32)),
            200,
            40,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_ingest_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "The Moon orbits the Earth.").unwrap();
        fs::write(temp.path().join("b.md"), "# Tides\n\nTides follow the Moon.").unwrap();
        fs::create_dir(temp.path().join("web")).unwrap();
        fs::write(
            temp.path().join("web").join("c.html"),
            "<p>Mars has two moons.</p>",
        )
        .unwrap();
        fs::write(temp.path().join("skip.bin"), "binary").unwrap();

        let index = MemoryIndex::new();
        let stats = ingest_path(&processor(), &index, temp.path(), &IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.sources_count, 3);
        assert_eq!(stats.chunks_count, 3);
        let index_stats = index.stats().unwrap();
        assert_eq!(index_stats.local_chunks, 3);
        assert_eq!(index_stats.web_chunks, 0);
    }

    #[tokio::test]
    async fn test_reingest_is_deduplicated() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "Water boils at 100 C.").unwrap();
        fs::write(temp.path().join("copy.txt"), "water   boils at 100 c.").unwrap();

        let index = MemoryIndex::new();
        let proc = processor();
        let stats = ingest_path(&proc, &index, temp.path(), &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.chunks_count, 1);
        assert_eq!(stats.duplicate_chunks, 1);

        let again = ingest_path(&proc, &index, temp.path(), &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(again.chunks_count, 0);
        assert_eq!(index.stats().unwrap().chunks_count, 1);
    }

    #[tokio::test]
    async fn test_ingest_single_file_and_exclude() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("keep.txt");
        fs::write(&file, "Single file content.").unwrap();
        fs::write(temp.path().join("drafts.txt"), "Excluded content.").unwrap();

        let index = MemoryIndex::new();
        let options = IngestOptions {
            exclude: vec!["drafts".to_string()],
        };
        let stats = ingest_path(&processor(), &index, temp.path(), &options)
            .await
            .unwrap();
        assert_eq!(stats.sources_count, 1);

        let stored = index.export().unwrap();
        assert_eq!(stored[0].chunk.source_type, SourceType::Local);
        assert!(stored[0].chunk.source_locator.ends_with("keep.txt"));
    }

    #[tokio::test]
    async fn test_missing_path_errors() {
        let index = MemoryIndex::new();
        let result = ingest_path(
            &processor(),
            &index,
            Path::new("/definitely/not/here"),
            &IngestOptions::default(),
        )
        .await;
        assert!(result.is_err());
    }

    /// Answer one HTTP request on a loopback port; returns the page URL.
    async fn serve_once(status: &'static str, content_type: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                content_type,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/history/bridge", addr)
    }

    #[tokio::test]
    async fn test_ingest_url_indexes_page_text_as_web() {
        let url = serve_once(
            "200 OK",
            "text/html; charset=utf-8",
            "<html><head><style>p { color: red; }</style></head>\
             <body><p>The harbour bridge opened in <b>1932</b>.</p>\
             <script>track();</script></body></html>",
        )
        .await;

        let index = MemoryIndex::new();
        let stats = ingest_url(&processor(), &index, &url, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(stats.sources_count, 1);
        assert_eq!(stats.chunks_count, 1);
        let stored = index.export().unwrap();
        assert_eq!(stored[0].chunk.source_type, SourceType::Web);
        assert_eq!(stored[0].chunk.source_locator, url);
        let text = &stored[0].chunk.text;
        assert!(text.contains("The harbour bridge opened in 1932"));
        assert!(!text.contains('<'));
        assert!(!text.contains("track"));
        assert!(!text.contains("color"));
    }

    #[tokio::test]
    async fn test_ingest_url_http_error() {
        let url = serve_once("404 Not Found", "text/html", "<p>missing</p>").await;
        let index = MemoryIndex::new();

        let err = ingest_url(&processor(), &index, &url, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Knowledge(ref m) if m.contains("404")));
        assert_eq!(index.stats().unwrap().chunks_count, 0);
    }

    #[tokio::test]
    async fn test_ingest_url_rejects_other_schemes() {
        assert!(is_url("HTTPS://example.org/a"));
        assert!(!is_url("docs/notes.md"));

        let index = MemoryIndex::new();
        let result = ingest_url(
            &processor(),
            &index,
            "ftp://example.org/file.txt",
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_err());
    }
}
