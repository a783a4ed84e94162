//! Semantic matching of encounter text against the catalog.
//!
//! Catalog entries are embedded once when the matcher is built; each query is
//! embedded on demand and ranked by cosine similarity.

use std::sync::Arc;

use thiserror::Error;

use super::catalog::Catalog;
use crate::models::SemanticMatch;

/// Number of ranked matches returned by [`SemanticMatcher::rank`].
pub const MAX_MATCHES: usize = 5;

/// Embedding backend failure.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Embedding failed: {0}")]
pub struct EmbeddingError(pub String);

/// Turns text into fixed-length vectors.
pub trait Embedder: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// One vector per input text, all of the same length.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Semantic ranking could not run. Callers degrade to no alternatives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Unavailable {
    #[error("No embedding backend configured")]
    NoBackend,

    #[error("Catalog index could not be built: {0}")]
    IndexFailed(String),

    #[error("Query embedding failed: {0}")]
    QueryFailed(String),
}

const LEXICAL_DIMENSIONS: usize = 256;

/// Local embedder over hashed word and character-trigram features.
///
/// Vectors are L2-normalized, so cosine similarity is a dot product.
#[derive(Debug, Clone)]
pub struct LexicalEmbedder {
    dimensions: usize,
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self {
            dimensions: LEXICAL_DIMENSIONS,
        }
    }
}

impl LexicalEmbedder {
    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.bump(&mut vector, word.as_bytes(), 1.0);

            let chars: Vec<char> = format!(" {} ", word).chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.bump(&mut vector, trigram.as_bytes(), 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn bump(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let index = (fnv1a(feature) % self.dimensions as u64) as usize;
        vector[index] += weight;
    }
}

impl Embedder for LexicalEmbedder {
    fn name(&self) -> &str {
        "lexical"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct IndexedEntry {
    code: String,
    description: String,
    base_fee: f64,
    vector: Vec<f32>,
}

/// Ranks catalog entries by similarity to free text.
pub struct SemanticMatcher {
    embedder: Option<Arc<dyn Embedder>>,
    index: Result<Vec<IndexedEntry>, Unavailable>,
}

impl SemanticMatcher {
    /// A matcher that always reports [`Unavailable::NoBackend`].
    pub fn disabled() -> Self {
        Self {
            embedder: None,
            index: Err(Unavailable::NoBackend),
        }
    }

    /// Embed every billable catalog entry. Modifier pseudo-codes are not indexed.
    ///
    /// Index failures are kept and surface on each [`rank`](Self::rank) call.
    pub fn build(embedder: Option<Arc<dyn Embedder>>, catalog: &Catalog) -> Self {
        let Some(embedder) = embedder else {
            return Self::disabled();
        };

        let entries: Vec<_> = catalog.entries().iter().filter(|e| !e.is_modifier()).collect();
        let texts: Vec<String> = entries.iter().map(|e| e.semantic_text()).collect();

        let index = match embedder.embed(&texts) {
            Ok(vectors) if vectors.len() == entries.len() => {
                tracing::info!(backend = embedder.name(), entries = entries.len(), "Semantic index built");
                Ok(entries
                    .into_iter()
                    .zip(vectors)
                    .map(|(e, vector)| IndexedEntry {
                        code: e.code.clone(),
                        description: e.description.clone(),
                        base_fee: e.base_fee,
                        vector,
                    })
                    .collect())
            }
            Ok(vectors) => Err(Unavailable::IndexFailed(format!(
                "expected {} vectors, got {}",
                entries.len(),
                vectors.len()
            ))),
            Err(e) => Err(Unavailable::IndexFailed(e.to_string())),
        };

        if let Err(e) = &index {
            tracing::warn!(backend = embedder.name(), error = %e, "Semantic matcher unavailable");
        }

        Self {
            embedder: Some(embedder),
            index,
        }
    }

    pub fn is_available(&self) -> bool {
        self.index.is_ok()
    }

    /// Top matches for `query`, best first. Ties keep catalog order.
    ///
    /// Entries sharing nothing with the query (similarity 0) are left out.
    pub fn rank(&self, query: &str) -> Result<Vec<SemanticMatch>, Unavailable> {
        let index = self.index.as_ref().map_err(Clone::clone)?;
        let embedder = self.embedder.as_ref().ok_or(Unavailable::NoBackend)?;

        let query_vector = embedder
            .embed(&[query.to_string()])
            .map_err(|e| Unavailable::QueryFailed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Unavailable::QueryFailed("empty embedding batch".into()))?;

        let mut scored: Vec<(f64, &IndexedEntry)> = index
            .iter()
            .map(|entry| (cosine(&query_vector, &entry.vector), entry))
            .filter(|(similarity, _)| *similarity > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(MAX_MATCHES)
            .map(|(similarity, entry)| SemanticMatch {
                code: entry.code.clone(),
                description: entry.description.clone(),
                base_fee: entry.base_fee,
                similarity,
            })
            .collect())
    }
}

impl std::fmt::Debug for SemanticMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMatcher")
            .field("backend", &self.embedder.as_ref().map(|e| e.name().to_string()))
            .field("indexed", &self.index.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::base_fee_schedule;

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError("model not loaded".into()))
        }
    }

    fn lexical_matcher() -> SemanticMatcher {
        let catalog = Catalog::from_entries(base_fee_schedule());
        SemanticMatcher::build(Some(Arc::new(LexicalEmbedder::default())), &catalog)
    }

    #[test]
    fn test_lexical_vectors_normalized() {
        let vectors = LexicalEmbedder::default()
            .embed(&["Suture simple".to_string(), String::new()])
            .unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vectors[1].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rank_returns_top_five_descending() {
        let matches = lexical_matcher().rank("Suture face complexe joue").unwrap();
        assert_eq!(matches.len(), MAX_MATCHES);
        assert_eq!(matches[0].code, "15.04");
        assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_modifiers_not_indexed() {
        let matches = lexical_matcher().rank("Majoration nuit fin de semaine").unwrap();
        assert!(matches.iter().all(|m| !m.code.starts_with("MOD_")));
    }

    #[test]
    fn test_no_backend_is_unavailable() {
        let catalog = Catalog::from_entries(base_fee_schedule());
        let matcher = SemanticMatcher::build(None, &catalog);
        assert!(!matcher.is_available());
        assert_eq!(matcher.rank("douleur"), Err(Unavailable::NoBackend));
    }

    #[test]
    fn test_backend_failure_is_unavailable() {
        let catalog = Catalog::from_entries(base_fee_schedule());
        let matcher = SemanticMatcher::build(Some(Arc::new(FailingEmbedder)), &catalog);
        assert!(matches!(matcher.rank("douleur"), Err(Unavailable::IndexFailed(_))));
    }

    #[test]
    fn test_query_without_words_ranks_nothing() {
        let matcher = lexical_matcher();
        assert!(matcher.rank("???").unwrap().is_empty());
        assert!(matcher.rank("").unwrap().is_empty());
    }

    #[test]
    fn test_empty_catalog_ranks_nothing() {
        let matcher =
            SemanticMatcher::build(Some(Arc::new(LexicalEmbedder::default())), &Catalog::default());
        assert!(matcher.rank("douleur").unwrap().is_empty());
    }
}
