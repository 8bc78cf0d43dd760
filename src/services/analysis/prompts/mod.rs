//! Prompt Templates
//!
//! Every backend phrases its own instructions for each [`Operation`], while
//! the data sections of the user prompt (titles, codes, maps, the model so
//! far) are rendered the same way for all of them. A backend implements
//! [`PromptSet::system_prompt`] and [`PromptSet::instruction`]; the provided
//! methods assemble the full [`PromptPair`] per operation.

mod gemini;
mod ollama;
mod openai;

use std::sync::Arc;

use serde::Serialize;
use theory_cascade_core::{ConceptTuple, DimensionMap, Document, ModelState};
use theory_cascade_llm::ProviderType;

use crate::models::settings::PipelineParams;

pub use gemini::GeminiPrompts;
pub use ollama::OllamaPrompts;
pub use openai::OpenAiPrompts;

/// Keyword a diagram answer must start from.
pub const DIAGRAM_KEYWORD: &str = "flowchart ";

/// Worked example shown to every backend when synthesizing a diagram.
pub(crate) const DIAGRAM_EXAMPLE: &str = r#"flowchart TD
  %% Nodes
  A[Team Autonomy<br>'freedom to choose tools'<br>'self-set deadlines']
  B[Managerial Trust]
  C[Work Engagement]
  D[Output Quality]
  E[Client Retention]

  %% Relationships
  A --> B
  B ==>|Directly Influences<br>'trust enables autonomy'| C
  A -.->|Moderates| C
  C --> D
  D -->|Impacts| E
  B --- E"#;

/// Legend for the four edge strengths.
pub(crate) const DIAGRAM_LEGEND: &str = "`==>` marks a strong direct influence, `-->` a weaker influence, `-.->` a moderating relationship and `---` a correlation. \
Cite evidence by adding `<br>` followed by the evidence in single quotes. Evidence must be one of the given codes.";

/// The operation set every backend answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DetailExtraction,
    ResearchQuestions,
    InitialCoding,
    ThematicClustering,
    DimensionAggregation,
    TheoryBrainstorm,
    ConceptTuples,
    Interrelationship,
    ModelConstruction,
    ModelNaming,
    Critique,
    DiagramSynthesis,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetailExtraction => "detail_extraction",
            Self::ResearchQuestions => "research_questions",
            Self::InitialCoding => "initial_coding",
            Self::ThematicClustering => "thematic_clustering",
            Self::DimensionAggregation => "dimension_aggregation",
            Self::TheoryBrainstorm => "theory_brainstorm",
            Self::ConceptTuples => "concept_tuples",
            Self::Interrelationship => "interrelationship",
            Self::ModelConstruction => "model_construction",
            Self::ModelNaming => "model_naming",
            Self::Critique => "critique",
            Self::DiagramSynthesis => "diagram_synthesis",
        }
    }

    /// Whether the answer must be a single JSON value.
    pub fn expects_json(&self) -> bool {
        matches!(
            self,
            Self::ResearchQuestions
                | Self::InitialCoding
                | Self::ThematicClustering
                | Self::DimensionAggregation
                | Self::TheoryBrainstorm
                | Self::ConceptTuples
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ready-to-send prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPair {
    pub operation: Operation,
    pub system: String,
    pub user: String,
}

/// Backend-specific prompt templates.
pub trait PromptSet: Send + Sync {
    /// Backend these templates were written for.
    fn backend(&self) -> ProviderType;

    /// System instruction for `op`.
    fn system_prompt(&self, op: Operation, params: &PipelineParams) -> String;

    /// Closing line of the user prompt for `op`.
    fn instruction(&self, op: Operation, params: &PipelineParams) -> String;

    fn pair(&self, op: Operation, params: &PipelineParams, body: String) -> PromptPair {
        let instruction = self.instruction(op, params);
        let user = if body.trim().is_empty() {
            instruction
        } else {
            format!("{}\n\n{}", body.trim_end(), instruction)
        };
        PromptPair {
            operation: op,
            system: self.system_prompt(op, params),
            user,
        }
    }

    fn detail(&self, document: &Document, detail: &str, params: &PipelineParams) -> PromptPair {
        let body = format!(
            "{}\n{}\n\nRequested detail: '{}'",
            document.title, document.full_text, detail
        );
        self.pair(Operation::DetailExtraction, params, body)
    }

    fn research_questions(&self, titles: &[&str], params: &PipelineParams) -> PromptPair {
        self.pair(Operation::ResearchQuestions, params, bullet_list(titles))
    }

    fn initial_coding(
        &self,
        title: &str,
        text: &str,
        remarks: Option<&str>,
        params: &PipelineParams,
    ) -> PromptPair {
        let mut body = format!("{}\n{}", title, text);
        push_remarks(&mut body, remarks);
        self.pair(Operation::InitialCoding, params, body)
    }

    fn thematic_clustering(&self, codes: &[String], params: &PipelineParams) -> PromptPair {
        let body = format!("Initial codes: {}", json_text(&codes));
        self.pair(Operation::ThematicClustering, params, body)
    }

    fn dimension_aggregation(&self, themes: &[&str], params: &PipelineParams) -> PromptPair {
        let body = format!("Second-order themes: {}", json_text(&themes));
        self.pair(Operation::DimensionAggregation, params, body)
    }

    fn theory_brainstorm(&self, dimensions: &DimensionMap, params: &PipelineParams) -> PromptPair {
        let body = format!(
            "Aggregate dimensions with their themes: {}",
            json_text(dimensions)
        );
        self.pair(Operation::TheoryBrainstorm, params, body)
    }

    fn concept_tuples(&self, state: &ModelState, params: &PipelineParams) -> PromptPair {
        let mut body = format!(
            "Research focus: {}",
            state
                .query
                .as_deref()
                .filter(|q| !q.trim().is_empty())
                .unwrap_or("specific phenomena within a given context")
        );
        push_remarks(&mut body, state.remarks.as_deref());
        body.push_str(&format!(
            "\n\nAggregate dimensions with their themes: {}",
            json_text(&state.dimension_map)
        ));
        self.pair(Operation::ConceptTuples, params, body)
    }

    fn interrelationship(
        &self,
        tuple: &ConceptTuple,
        passages: &[&str],
        params: &PipelineParams,
    ) -> PromptPair {
        let body = format!(
            "Concept A: {}\nConcept B: {}\n\nPassages:\n{}",
            tuple.0,
            tuple.1,
            passages
                .iter()
                .enumerate()
                .map(|(i, p)| format!("[{}] {}", i + 1, p.trim()))
                .collect::<Vec<_>>()
                .join("\n\n")
        );
        self.pair(Operation::Interrelationship, params, body)
    }

    fn model_construction(
        &self,
        state: &ModelState,
        remarks: Option<&str>,
        params: &PipelineParams,
    ) -> PromptPair {
        let mut sections = Vec::new();
        if !state.critique.trim().is_empty() && !state.model_description.trim().is_empty() {
            sections.push(format!(
                "Previous model: {}\nCritique: {}",
                state.model_description.trim(),
                state.critique.trim()
            ));
        }
        if !state.theories.is_empty() {
            let theories: Vec<String> = state
                .theories
                .iter()
                .map(|t| {
                    if t.description.trim().is_empty() {
                        t.name.clone()
                    } else {
                        format!("{}: {}", t.name, t.description.trim())
                    }
                })
                .collect();
            sections.push(format!("Relevant existing theories:\n{}", bullet_list(&theories)));
        }
        let mut dims = format!(
            "Aggregate dimensions with their themes: {}",
            json_text(&state.dimension_map)
        );
        push_remarks(&mut dims, remarks);
        sections.push(dims);
        if !state.interrelationships.is_empty() {
            sections.push(
                state
                    .interrelationships
                    .iter()
                    .map(|r| format!("{}: {}", r.concepts, r.summary.trim()))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        self.pair(Operation::ModelConstruction, params, sections.join("\n\n"))
    }

    fn model_naming(&self, description: &str, params: &PipelineParams) -> PromptPair {
        self.pair(Operation::ModelNaming, params, description.to_string())
    }

    fn critique(&self, state: &ModelState, params: &PipelineParams) -> PromptPair {
        let mut sections = Vec::new();
        if !state.first_order_codes.is_empty()
            && state.first_order_codes.len() < params.critique_code_limit
        {
            sections.push(format!(
                "First-order codes: {}",
                state.first_order_codes.join(", ")
            ));
        }
        if !state.interrelationships.is_empty() {
            sections.push(format!(
                "Interrelationships: {}",
                json_text(&state.interrelationships)
            ));
        }
        sections.push(format!(
            "Model: {}\n{}",
            state.model_name.trim(),
            state.model_description.trim()
        ));
        self.pair(Operation::Critique, params, sections.join("\n\n"))
    }

    fn diagram(&self, state: &ModelState, params: &PipelineParams) -> PromptPair {
        let vocabulary = state.diagram_vocabulary(params.diagram_vocabulary_threshold);
        let label = if state.first_order_codes.len() > params.diagram_vocabulary_threshold {
            "Second-order codes"
        } else {
            "First-order codes"
        };
        let mut body = format!(
            "{}: {}\n\n{}",
            label,
            vocabulary.join(", "),
            state.model_description.trim()
        );
        if let Some(remarks) = state.remarks.as_deref().filter(|r| !r.trim().is_empty()) {
            body.push_str(&format!("\n\nRemarks: {}", remarks.trim()));
        }
        self.pair(Operation::DiagramSynthesis, params, body)
    }
}

/// Templates for `provider`.
pub fn prompts_for(provider: ProviderType) -> Arc<dyn PromptSet> {
    match provider {
        ProviderType::OpenAI => Arc::new(OpenAiPrompts),
        ProviderType::Gemini => Arc::new(GeminiPrompts),
        ProviderType::Ollama => Arc::new(OllamaPrompts),
    }
}

pub(crate) fn bullet_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| format!("- {}", s.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_remarks(body: &mut String, remarks: Option<&str>) {
    if let Some(remarks) = remarks.map(str::trim).filter(|r| !r.is_empty()) {
        body.push_str(&format!("\n\nRemarks: {}", remarks));
    }
}

fn json_text<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
