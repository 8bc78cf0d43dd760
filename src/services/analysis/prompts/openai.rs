//! Prompt templates for OpenAI chat models.
//!
//! JSON operations run with `response_format: json_object`, which requires the
//! word "JSON" somewhere in the messages.

use theory_cascade_llm::ProviderType;

use super::{Operation, PromptSet, DIAGRAM_EXAMPLE, DIAGRAM_LEGEND};
use crate::models::settings::PipelineParams;

pub struct OpenAiPrompts;

impl PromptSet for OpenAiPrompts {
    fn backend(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn system_prompt(&self, op: Operation, params: &PipelineParams) -> String {
        match op {
            Operation::DetailExtraction => "You extract information from a paper. Answer briefly, in one or a few words, without full sentences. Reply with the answer only. If no reasonable answer exists, reply 'n/a'.".to_string(),
            Operation::ResearchQuestions => "Given a list of paper titles, propose research questions that developing a new theoretical model might answer. Output a JSON object: {\"research_questions\": [\"...\"]}.".to_string(),
            Operation::InitialCoding => format!(
                "You apply the initial coding phase of the Gioia method to an academic paper. Identify emergent themes, concepts and patterns in the text. Every code is at most {} words long and uses the wording of the source. Output a JSON object: {{\"codes\": [\"...\"]}}.",
                params.max_code_words
            ),
            Operation::ThematicClustering => format!(
                "You apply the second-order coding phase of the Gioia method. Find about {} higher-level themes that aggregate the initial codes; for example \"employee sentiment\" could aggregate \"positive feelings toward new policy\" and \"sense of control\". Output a JSON object mapping each theme to the array of initial codes it aggregates, copying the codes exactly.",
                params.focus_code_count
            ),
            Operation::DimensionAggregation => format!(
                "You apply the aggregate-dimensions phase of the Gioia method. Identify {}-{} overarching theoretical dimensions that aggregate the second-order themes; a good dimension is quantifiable, such as \"Policy Usability\". Output a JSON object mapping each dimension to the array of themes it aggregates, copying the theme names exactly.",
                params.dimension_min, params.dimension_max
            ),
            Operation::TheoryBrainstorm => "Brainstorm theories from existing literature that could apply to the research findings. Each theory must be well defined and relate to at least one aggregate dimension. Output a JSON object: {\"theories\": [{\"theory\": \"...\", \"description\": \"...\", \"relatedDimensions\": [\"...\"], \"possibleResearchQuestions\": [\"...\"]}]}.".to_string(),
            Operation::ConceptTuples => format!(
                "Hypothesize which concepts could be related to each other, so the relationships can be researched in the literature. Output a JSON object with {}-{} concept pairs: {{\"tuples\": [[\"Knowledge Management\", \"Organizational Performance\"]]}}.",
                params.tuple_min, params.tuple_max
            ),
            Operation::Interrelationship => "Summarize, from the numbered passages only, how the two concepts are related. Mention direction and strength where the passages support it. If they do not address the relationship, say that plainly.".to_string(),
            Operation::ModelConstruction => "You are a qualitative researcher constructing a theoretical model that fits the research findings. It should relate to one or more aggregate dimensions and be novel: build on existing theories but introduce new ideas. Emphasize the relationships between the dimensions, explain whether they are causal or correlational, and keep the narrative clear. Do not converse; describe the model and give it a name.".to_string(),
            Operation::ModelNaming => "You extract theoretical model names. If none is given, invent an original one. Reply with the name and nothing else.".to_string(),
            Operation::Critique => "You are a qualitative researcher critiquing a theoretical model. Comment on novelty, conciseness, clarity and theoretical insight, and brainstorm new patterns to look for in the data. Do not converse; return only the critique.".to_string(),
            Operation::DiagramSynthesis => format!(
                "You visualize theoretical models with MermaidJS. Example:\n\n{}\n\n{} Use codes as evidence rather than as their own nodes. Keep it simple. Do not converse; return only the MermaidJS code.",
                DIAGRAM_EXAMPLE, DIAGRAM_LEGEND
            ),
        }
    }

    fn instruction(&self, op: Operation, params: &PipelineParams) -> String {
        match op {
            Operation::DetailExtraction => "What is the requested detail of this paper?".to_string(),
            Operation::ResearchQuestions => format!(
                "Provide {} potential research questions.",
                params.research_question_count
            ),
            Operation::InitialCoding => "Perform Gioia initial coding on this paper.".to_string(),
            Operation::ThematicClustering => "Perform Gioia second-order coding on these codes.".to_string(),
            Operation::DimensionAggregation => "Aggregate these themes into theoretical dimensions.".to_string(),
            Operation::TheoryBrainstorm => "Which theories could explain these dimensions and themes?".to_string(),
            Operation::ConceptTuples => "Which concepts could be related to each other?".to_string(),
            Operation::Interrelationship => "How are Concept A and Concept B related?".to_string(),
            Operation::ModelConstruction => "Construct an extensive, comprehensive, new theoretical model.".to_string(),
            Operation::ModelNaming => "Return the model name.".to_string(),
            Operation::Critique => "Return your critique.".to_string(),
            Operation::DiagramSynthesis => "Return the MermaidJS diagram.".to_string(),
        }
    }
}
