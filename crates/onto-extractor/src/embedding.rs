//! Offline embedding provider
//!
//! Hashes character trigrams of a normalized surface form into a fixed
//! number of buckets. Deterministic, needs no model or network, and is
//! good enough to catch spelling and corporate-suffix variants of a name.

use async_trait::async_trait;
use onto_core::{BackendError, EmbeddingProvider};

/// Default vector dimension
pub const DEFAULT_DIMENSION: usize = 256;

/// Trailing words that do not change which organization is meant
const CORPORATE_SUFFIXES: &[&str] = &[
    "corporation",
    "corp",
    "incorporated",
    "inc",
    "limited",
    "ltd",
    "llc",
    "llp",
    "plc",
    "gmbh",
    "co",
    "company",
    "group",
    "holdings",
];

/// Feature-hashing embedder over character trigrams.
///
/// Only surface forms that share most of their trigrams after suffix
/// normalization land close together. Acronyms and aliases ("MS" for
/// "Microsoft", "Big Blue" for "IBM") stay far apart; merging those needs a
/// semantic [`EmbeddingProvider`](onto_core::EmbeddingProvider).
#[derive(Debug, Clone)]
pub struct HashedNgramEmbedder {
    dimension: usize,
}

impl HashedNgramEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Lowercase, drop punctuation and trailing corporate suffixes
    pub fn normalize(text: &str) -> String {
        let cleaned: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();

        let mut words: Vec<&str> = cleaned.split_whitespace().collect();
        while words.len() > 1 && words.last().is_some_and(|w| CORPORATE_SUFFIXES.contains(w)) {
            words.pop();
        }
        words.join(" ")
    }

    /// Embed one text; the result has unit length unless the text is empty
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let normalized = Self::normalize(text);
        if normalized.is_empty() {
            return vector;
        }

        let padded: Vec<char> = format!(" {normalized} ").chars().collect();
        for gram in padded.windows(3) {
            let hash = fnv1a(gram.iter().collect::<String>().as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashedNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashedNgramEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Cosine similarity; zero vectors are dissimilar to everything
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_suffixes() {
        assert_eq!(HashedNgramEmbedder::normalize("Microsoft Corporation"), "microsoft");
        assert_eq!(HashedNgramEmbedder::normalize("Acme Corp."), "acme");
        assert_eq!(HashedNgramEmbedder::normalize("Co"), "co");
    }

    #[test]
    fn test_acronym_stays_apart_from_full_name() {
        let embedder = HashedNgramEmbedder::default();
        let full = embedder.embed_one("Microsoft");
        let acronym = embedder.embed_one("MS");
        assert!(cosine_similarity(&full, &acronym) < 0.5);
    }

    #[test]
    fn test_suffix_variants_are_identical() {
        let embedder = HashedNgramEmbedder::default();
        let a = embedder.embed_one("Microsoft");
        let b = embedder.embed_one("Microsoft Corporation");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_unrelated_names_are_far_apart() {
        let embedder = HashedNgramEmbedder::default();
        let a = embedder.embed_one("Microsoft");
        let b = embedder.embed_one("Pfizer");
        assert!(cosine_similarity(&a, &b) < 0.5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashedNgramEmbedder::new(16);
        assert!(embedder.embed_one("...").iter().all(|v| *v == 0.0));
        assert_eq!(embedder.dimension(), 16);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = HashedNgramEmbedder::default();
        let texts = vec!["Alice".to_string(), "Bob".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], embedder.embed_one("Bob"));
    }
}
