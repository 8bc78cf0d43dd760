//! TF-IDF Embedding Provider
//!
//! Local, offline, deterministic vectors. `embed_documents` fits the
//! vocabulary on the batch it is given (the whole chunked corpus), and later
//! queries are projected into that vocabulary.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::embedding_provider::{
    EmbeddingError, EmbeddingProvider, EmbeddingProviderType, EmbeddingResult,
};

/// Maximum number of distinct tokens tracked.
const MAX_VOCAB_SIZE: usize = 8192;

#[derive(Debug, Clone)]
struct Vocabulary {
    token_to_idx: HashMap<String, usize>,
    idf: Vec<f32>,
}

#[derive(Debug, Default)]
pub struct TfIdfEmbeddingProvider {
    vocab: Mutex<Option<Vocabulary>>,
}

impl TfIdfEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vocabulary>> {
        self.vocab.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EmbeddingProvider for TfIdfEmbeddingProvider {
    async fn embed_documents(&self, documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let vocab = build_vocab(documents);
        let vectors = documents.iter().map(|d| tfidf_vector(d, &vocab)).collect();
        *self.lock() = Some(vocab);
        Ok(vectors)
    }

    async fn embed_query(&self, query: &str) -> EmbeddingResult<Vec<f32>> {
        let guard = self.lock();
        let vocab = guard.as_ref().ok_or_else(|| EmbeddingError::ProviderUnavailable {
            message: "TF-IDF vocabulary has not been fitted yet".to_string(),
        })?;
        Ok(tfidf_vector(query, vocab))
    }

    fn dimension(&self) -> usize {
        self.lock().as_ref().map_or(0, |v| v.idf.len())
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        Ok(())
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::TfIdf
    }

    fn display_name(&self) -> &str {
        "TF-IDF (Local)"
    }
}

/// Lowercase, split on non-alphanumerics, drop one-character tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn build_vocab(corpus: &[&str]) -> Vocabulary {
    let num_docs = corpus.len().max(1);

    let mut doc_freq: HashMap<String, usize> = HashMap::new();
    for doc in corpus {
        let tokens = tokenize(doc);
        let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        for tok in unique {
            *doc_freq.entry(tok.to_string()).or_insert(0) += 1;
        }
    }

    // Most frequent first; ties broken alphabetically so the layout is stable.
    let mut entries: Vec<(String, usize)> = doc_freq.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(MAX_VOCAB_SIZE);

    let mut token_to_idx = HashMap::with_capacity(entries.len());
    let mut idf = Vec::with_capacity(entries.len());
    for (idx, (token, freq)) in entries.into_iter().enumerate() {
        token_to_idx.insert(token, idx);
        idf.push((num_docs as f32 / freq as f32).ln() + 1.0);
    }

    Vocabulary { token_to_idx, idf }
}

fn tfidf_vector(text: &str, vocab: &Vocabulary) -> Vec<f32> {
    let dim = vocab.idf.len();
    if dim == 0 {
        return Vec::new();
    }

    let tokens = tokenize(text);
    let total = tokens.len().max(1) as f32;

    let mut tf = vec![0.0f32; dim];
    for tok in &tokens {
        if let Some(&idx) = vocab.token_to_idx.get(tok.as_str()) {
            tf[idx] += 1.0 / total;
        }
    }
    for (value, idf) in tf.iter_mut().zip(&vocab.idf) {
        *value *= idf;
    }

    let mag: f32 = tf.iter().map(|v| v * v).sum::<f32>().sqrt();
    if mag > 0.0 {
        for v in &mut tf {
            *v /= mag;
        }
    }
    tf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::retrieval::vector_store::cosine_similarity;

    #[test]
    fn tokenize_lowercases_and_filters() {
        assert_eq!(
            tokenize("Remote-work, a Burnout!"),
            vec!["remote", "work", "burnout"]
        );
    }

    #[test]
    fn idf_prefers_rare_terms() {
        let vocab = build_vocab(&["trust team", "trust leader", "trust culture"]);
        let common = vocab.idf[vocab.token_to_idx["trust"]];
        let rare = vocab.idf[vocab.token_to_idx["culture"]];
        assert!((common - 1.0).abs() < 1e-6);
        assert!(rare > common);
    }

    #[test]
    fn vectors_are_normalised() {
        let vocab = build_vocab(&["hello world", "goodbye world"]);
        let v = tfidf_vector("hello world", &vocab);
        let mag: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((mag - 1.0).abs() < 1e-5);
        assert!(tfidf_vector("", &vocab).iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn query_requires_fitted_vocabulary() {
        let provider = TfIdfEmbeddingProvider::new();
        assert_eq!(provider.dimension(), 0);
        assert!(provider.embed_query("anything").await.is_err());
    }

    #[tokio::test]
    async fn similar_texts_score_higher() {
        let provider = TfIdfEmbeddingProvider::new();
        let docs = [
            "psychological safety in remote teams",
            "supply chain logistics costs",
            "remote teams and psychological safety climate",
        ];
        let vectors = provider.embed_documents(&docs).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(provider.dimension(), vectors[0].len());

        let query = provider.embed_query("psychological safety").await.unwrap();
        let close = cosine_similarity(&query, &vectors[0]);
        let far = cosine_similarity(&query, &vectors[1]);
        assert!(close > far);
    }
}
