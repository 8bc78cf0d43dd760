//! Retrieval Integration Tests
//!
//! Ranking a corpus through the local TF-IDF embedder, directly and through
//! the pipeline entry point.

use std::sync::Arc;

use theory_cascade::models::settings::RetrievalParams;
use theory_cascade::services::coding::StageStatus;
use theory_cascade::services::knowledge::TextChunker;
use theory_cascade::services::retrieval::{
    CorpusIndex, EmbeddingProvider, RankingService, TfIdfEmbeddingProvider,
};
use theory_cascade_core::Document;
use theory_cascade_llm::ProviderType;

use super::support::{scripted_pipeline, MockLlmProvider, ScriptedBackends};

fn corpus() -> Vec<Document> {
    vec![
        Document::new("d1", "Supply chains", "Logistics costs and shipping delays dominate."),
        Document::new("d2", "Remote work", "Remote employees describe burnout and isolation at home."),
        Document::new("d3", "Accounting", "Ledger reconciliation and quarterly audits."),
        Document::new("d4", "Hybrid teams", "Burnout rises when remote employees lack boundaries."),
        Document::new("d5", "Retail pricing", "Discount strategies and seasonal pricing."),
    ]
}

fn ids(documents: &[Document]) -> Vec<&str> {
    documents.iter().map(|d| d.id.as_str()).collect()
}

#[tokio::test]
async fn test_similar_documents_rank_first_without_duplicates() {
    let service = RankingService::new(RetrievalParams::default());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TfIdfEmbeddingProvider::new());

    let ranked = service
        .rank("remote employees burnout", &corpus(), Some(embedder))
        .await
        .unwrap();

    let ranked_ids = ids(&ranked);
    let mut top_two = ranked_ids[..2].to_vec();
    top_two.sort();
    assert_eq!(top_two, vec!["d2", "d4"]);

    let mut unique = ranked_ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ranked_ids.len());
}

#[tokio::test]
async fn test_blank_query_is_identity() {
    let service = RankingService::default();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TfIdfEmbeddingProvider::new());
    let ranked = service.rank("   ", &corpus(), Some(embedder)).await.unwrap();
    assert_eq!(ranked, corpus());
}

#[tokio::test]
async fn test_index_chunks_carry_document_ids() {
    let chunker = TextChunker::new(20, 0);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TfIdfEmbeddingProvider::new());
    let index = CorpusIndex::build(&corpus(), &chunker, embedder).await.unwrap();
    assert!(index.len() > corpus().len());

    let hits = index.search("shipping delays", 3).await.unwrap();
    assert_eq!(hits[0].document_id, "d1");
    assert!(hits[0].chunk_id.starts_with("d1:"));
}

#[tokio::test]
async fn test_pipeline_retrieval_ranks_with_backend_embeddings() {
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(MockLlmProvider::new("openai")));

    let outcome = pipeline
        .run_retrieval(Some("remote employees burnout"), corpus())
        .await;

    assert_eq!(outcome.status, StageStatus::Completed);
    assert_eq!(outcome.value.len(), 5);
    assert!(ids(&outcome.value[..2]).contains(&"d2"));
    assert!(ids(&outcome.value[..2]).contains(&"d4"));
    assert_eq!(backends.provider(ProviderType::OpenAI).total_calls(), 0);
}

#[tokio::test]
async fn test_pipeline_retrieval_without_embeddings_is_unchanged() {
    let (pipeline, _) = scripted_pipeline(
        ScriptedBackends::new(MockLlmProvider::new("gemini")).without_embeddings(),
    );

    let outcome = pipeline.run_retrieval(Some("burnout"), corpus()).await;

    assert_eq!(outcome.status, StageStatus::Skipped);
    assert_eq!(outcome.value, corpus());
}

#[tokio::test]
async fn test_pipeline_retrieval_without_query_is_identity() {
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(MockLlmProvider::new("openai")));
    let outcome = pipeline.run_retrieval(None, corpus()).await;
    assert_eq!(outcome.status, StageStatus::Skipped);
    assert_eq!(outcome.value, corpus());
}
