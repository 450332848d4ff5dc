//! Content hashing for deduplication.

use sha2::{Digest, Sha256};

/// Normalize text before hashing.
///
/// Lowercases and collapses all whitespace runs to a single space so that
/// the same page fetched twice with different formatting hashes identically.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Calculate the SHA-256 content hash of normalized text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        let text = "Hello, world!";
        let hash = content_hash(text);
        assert_eq!(hash.len(), 64);

        assert_eq!(hash, content_hash(text));
        assert_ne!(hash, content_hash("Different text"));
    }

    #[test]
    fn test_hash_ignores_case_and_spacing() {
        assert_eq!(
            content_hash("The  Eiffel Tower\nis in Paris"),
            content_hash("the eiffel tower is in   paris ")
        );
    }
}
