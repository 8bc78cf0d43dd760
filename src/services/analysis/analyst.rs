//! Analyst
//!
//! The operation set of the pipeline bound to one backend: a completion
//! provider, its prompt templates and, when available, an embedder. Every
//! operation returns `LlmResult<T>`; transport and credential failures
//! propagate, while malformed answers resolve to empty values here.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use theory_cascade_core::{ConceptTuple, DimensionMap, Document, ModelState, ThemeMap, Theory};
use theory_cascade_llm::{LlmProvider, LlmRequestOptions, LlmResult, Message};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::backend::AnalysisBackend;
use super::prompts::{PromptPair, PromptSet, DIAGRAM_KEYWORD};
use crate::models::settings::PipelineParams;
use crate::services::parsing::{
    extract_diagram, record_list, string_list, string_map, strip_code_fences,
};
use crate::services::retrieval::EmbeddingProvider;

/// Reply used when a detail cannot be extracted.
pub const NOT_AVAILABLE: &str = "n/a";

/// Capacity of the channel between a streaming provider and the sink.
const STREAM_BUFFER: usize = 64;

pub struct Analyst {
    llm: Arc<dyn LlmProvider>,
    prompts: Arc<dyn PromptSet>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    params: PipelineParams,
}

impl Analyst {
    pub fn new(backend: AnalysisBackend, params: PipelineParams) -> Self {
        Self {
            llm: backend.llm,
            prompts: backend.prompts,
            embeddings: backend.embeddings,
            params,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.llm.name()
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// The embedder paired with this backend, if it has one.
    pub fn embeddings(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.embeddings.clone()
    }

    fn options(&self, json_output: bool) -> LlmRequestOptions {
        LlmRequestOptions {
            temperature_override: Some(self.params.temperature),
            max_tokens_override: Some(self.params.max_tokens),
            json_output,
        }
    }

    async fn ask(&self, prompt: PromptPair) -> LlmResult<String> {
        debug!(
            provider = self.llm.name(),
            operation = %prompt.operation,
            prompt_chars = prompt.user.len(),
            "Sending prompt"
        );
        let options = self.options(prompt.operation.expects_json());
        let response = self
            .llm
            .send_message(vec![Message::user(prompt.user)], Some(prompt.system), options)
            .await?;
        Ok(response.into_text())
    }

    /// Single-shot completion with an optional system instruction.
    pub async fn complete(&self, prompt: &str, system: Option<&str>) -> LlmResult<String> {
        let response = self
            .llm
            .send_message(
                vec![Message::user(prompt)],
                system.map(str::to_string),
                self.options(false),
            )
            .await?;
        Ok(response.into_text())
    }

    /// Stream a completion, handing each fragment to `sink` as it arrives.
    /// Returns the concatenated text.
    pub async fn stream_completion<F>(&self, prompt: &str, mut sink: F) -> LlmResult<String>
    where
        F: FnMut(&str),
    {
        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
        let mut text = String::new();

        let send = self
            .llm
            .stream_message(vec![Message::user(prompt)], None, tx, self.options(false));
        let receive = async {
            while let Some(event) = rx.recv().await {
                if let Some(fragment) = event.text() {
                    sink(fragment);
                    text.push_str(fragment);
                } else if event.is_terminal() {
                    debug!(provider = self.llm.name(), event = ?event, "Stream finished");
                }
            }
        };
        let (result, ()) = tokio::join!(send, receive);
        result?;
        Ok(text)
    }

    /// One named detail of a paper, in a few words. Documents without text
    /// yield an empty string; an answer that just echoes the detail name
    /// becomes `"n/a"`.
    pub async fn extract_detail(&self, document: &Document, detail: &str) -> LlmResult<String> {
        if !document.has_text() {
            return Ok(String::new());
        }
        let answer = self
            .ask(self.prompts.detail(document, detail, &self.params))
            .await?;
        let answer = answer.trim();
        if answer.eq_ignore_ascii_case(detail.trim()) {
            Ok(NOT_AVAILABLE.to_string())
        } else {
            Ok(answer.to_string())
        }
    }

    pub async fn brainstorm_research_questions(&self, titles: &[&str]) -> LlmResult<Vec<String>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self
            .ask(self.prompts.research_questions(titles, &self.params))
            .await?;
        Ok(string_list(&raw, "research_questions"))
    }

    /// First-order codes for one document or one chunk of it.
    pub async fn code_text(
        &self,
        title: &str,
        text: &str,
        remarks: Option<&str>,
    ) -> LlmResult<Vec<String>> {
        let raw = self
            .ask(self.prompts.initial_coding(title, text, remarks, &self.params))
            .await?;
        Ok(string_list(&raw, "codes"))
    }

    pub async fn cluster_themes(&self, codes: &[String]) -> LlmResult<ThemeMap> {
        let raw = self
            .ask(self.prompts.thematic_clustering(codes, &self.params))
            .await?;
        Ok(string_map(&raw, "thematic_clustering"))
    }

    pub async fn aggregate_dimensions(&self, themes: &[&str]) -> LlmResult<DimensionMap> {
        let raw = self
            .ask(self.prompts.dimension_aggregation(themes, &self.params))
            .await?;
        Ok(string_map(&raw, "dimension_aggregation"))
    }

    pub async fn brainstorm_theories(&self, dimensions: &DimensionMap) -> LlmResult<Vec<Theory>> {
        let raw = self
            .ask(self.prompts.theory_brainstorm(dimensions, &self.params))
            .await?;
        let theories: Vec<Theory> = record_list(&raw, "theories");
        Ok(theories
            .into_iter()
            .filter(|t| !t.name.trim().is_empty())
            .collect())
    }

    pub async fn hypothesize_concept_tuples(
        &self,
        state: &ModelState,
    ) -> LlmResult<Vec<ConceptTuple>> {
        let raw = self
            .ask(self.prompts.concept_tuples(state, &self.params))
            .await?;
        let pairs: Vec<Value> = record_list(&raw, "tuples");
        Ok(concept_pairs(pairs))
    }

    /// How two concepts relate according to the given passages.
    pub async fn summarize_interrelationship(
        &self,
        tuple: &ConceptTuple,
        passages: &[&str],
    ) -> LlmResult<String> {
        let raw = self
            .ask(self.prompts.interrelationship(tuple, passages, &self.params))
            .await?;
        Ok(raw.trim().to_string())
    }

    pub async fn construct_model(
        &self,
        state: &ModelState,
        remarks: Option<&str>,
    ) -> LlmResult<String> {
        let raw = self
            .ask(self.prompts.model_construction(state, remarks, &self.params))
            .await?;
        Ok(raw.trim().to_string())
    }

    pub async fn name_model(&self, description: &str) -> LlmResult<String> {
        if description.trim().is_empty() {
            return Ok(String::new());
        }
        let raw = self
            .ask(self.prompts.model_naming(description, &self.params))
            .await?;
        Ok(clean_model_name(&raw))
    }

    pub async fn critique_model(&self, state: &ModelState) -> LlmResult<String> {
        let raw = self.ask(self.prompts.critique(state, &self.params)).await?;
        Ok(raw.trim().to_string())
    }

    /// Mermaid flowchart source, or empty when the answer holds none.
    pub async fn synthesize_diagram(&self, state: &ModelState) -> LlmResult<String> {
        let raw = self.ask(self.prompts.diagram(state, &self.params)).await?;
        Ok(extract_diagram(&raw, DIAGRAM_KEYWORD))
    }
}

/// Keep entries that carry at least two strings; the first two form the pair.
fn concept_pairs(items: Vec<Value>) -> Vec<ConceptTuple> {
    let total = items.len();
    let pairs: Vec<ConceptTuple> = items
        .into_iter()
        .filter_map(|item| {
            let Value::Array(parts) = item else {
                return None;
            };
            let mut names = parts
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty());
            match (names.next(), names.next()) {
                (Some(a), Some(b)) => Some(ConceptTuple::new(a, b)),
                _ => None,
            }
        })
        .collect();
    if pairs.len() < total {
        warn!(skipped = total - pairs.len(), "Dropped malformed concept pairs");
    }
    // Exact duplicates add nothing downstream.
    let mut seen = HashSet::new();
    pairs
        .into_iter()
        .filter(|pair| seen.insert(pair.clone()))
        .collect()
}

/// Strip fences, quotes and a leading "Name:" label.
fn clean_model_name(raw: &str) -> String {
    let text = strip_code_fences(raw);
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let line = line.trim();
    let line = line
        .strip_prefix("Name:")
        .or_else(|| line.strip_prefix("Model name:"))
        .unwrap_or(line);
    line.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '*' | '`'))
        .trim()
        .to_string()
}
