//! Prompt templates for local Ollama models.
//!
//! Smaller local models drift from long instructions, so these are short and
//! repeat the exact output shape.

use theory_cascade_llm::ProviderType;

use super::{Operation, PromptSet, DIAGRAM_EXAMPLE, DIAGRAM_LEGEND};
use crate::models::settings::PipelineParams;

pub struct OllamaPrompts;

impl PromptSet for OllamaPrompts {
    fn backend(&self) -> ProviderType {
        ProviderType::Ollama
    }

    fn system_prompt(&self, op: Operation, params: &PipelineParams) -> String {
        match op {
            Operation::DetailExtraction => "Answer with one to three words taken from the paper. No sentences. Say 'n/a' if unknown.".to_string(),
            Operation::ResearchQuestions => "Propose research questions for a new theoretical model based on paper titles. Output only JSON: {\"research_questions\": [\"question\"]}".to_string(),
            Operation::InitialCoding => format!(
                "Gioia method, initial coding. List the concepts in the text as short codes (max {} words each, source wording). Output only JSON: {{\"codes\": [\"code\"]}}",
                params.max_code_words
            ),
            Operation::ThematicClustering => "Gioia method, second-order coding. Group the given codes into themes. Copy codes exactly. Output only JSON: {\"theme\": [\"code\", \"code\"]}".to_string(),
            Operation::DimensionAggregation => "Gioia method, aggregate dimensions. Group the given themes into measurable dimensions. Copy theme names exactly. Output only JSON: {\"dimension\": [\"theme\", \"theme\"]}".to_string(),
            Operation::TheoryBrainstorm => "Name existing theories that could explain the dimensions. Output only JSON: {\"theories\": [{\"theory\": \"name\", \"description\": \"text\", \"relatedDimensions\": [\"dimension\"], \"possibleResearchQuestions\": [\"question\"]}]}".to_string(),
            Operation::ConceptTuples => "Guess which concepts are related. Output only JSON: {\"tuples\": [[\"concept\", \"concept\"]]}".to_string(),
            Operation::Interrelationship => "Use only the passages. In two or three sentences, say how the two concepts are related. If the passages do not say, answer 'no evidence'.".to_string(),
            Operation::ModelConstruction => "You build a new theoretical model from qualitative findings. Relate the dimensions to each other, say which links are causal and which are correlational, and give the model a name. Write a plain description, no greetings.".to_string(),
            Operation::ModelNaming => "Reply with the model's name only. Invent one if none is given.".to_string(),
            Operation::Critique => "Critique the model: novelty, conciseness, clarity, theoretical insight, and new patterns to look for. Reply with the critique only.".to_string(),
            Operation::DiagramSynthesis => format!(
                "Draw the model as a MermaidJS flowchart, like this:\n\n{}\n\n{} Reply with the MermaidJS code only.",
                DIAGRAM_EXAMPLE, DIAGRAM_LEGEND
            ),
        }
    }

    fn instruction(&self, op: Operation, params: &PipelineParams) -> String {
        match op {
            Operation::DetailExtraction => "Answer now.".to_string(),
            Operation::ResearchQuestions => format!(
                "Give exactly {} questions as JSON.",
                params.research_question_count
            ),
            Operation::InitialCoding => "Give the codes as JSON.".to_string(),
            Operation::ThematicClustering => format!(
                "Give exactly {} themes as JSON.",
                params.focus_code_count
            ),
            Operation::DimensionAggregation => format!(
                "Give {}-{} dimensions as JSON.",
                params.dimension_min, params.dimension_max
            ),
            Operation::TheoryBrainstorm => "Give the theories as JSON.".to_string(),
            Operation::ConceptTuples => format!(
                "Give {}-{} pairs as JSON.",
                params.tuple_min, params.tuple_max
            ),
            Operation::Interrelationship => "Answer now.".to_string(),
            Operation::ModelConstruction => "Describe the new model now.".to_string(),
            Operation::ModelNaming => "Name:".to_string(),
            Operation::Critique => "Critique now.".to_string(),
            Operation::DiagramSynthesis => "Flowchart:".to_string(),
        }
    }
}
