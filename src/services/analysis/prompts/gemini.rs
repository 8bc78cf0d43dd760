//! Prompt templates for Gemini.
//!
//! Gemini receives the system text folded into the user turn, so these
//! templates restate the expected shape in the closing instruction as well.

use theory_cascade_llm::ProviderType;

use super::{Operation, PromptSet, DIAGRAM_EXAMPLE, DIAGRAM_LEGEND};
use crate::models::settings::PipelineParams;

pub struct GeminiPrompts;

impl PromptSet for GeminiPrompts {
    fn backend(&self) -> ProviderType {
        ProviderType::Gemini
    }

    fn system_prompt(&self, op: Operation, params: &PipelineParams) -> String {
        match op {
            Operation::DetailExtraction => "You pull single facts out of academic papers. Answer in one or a few words about the given text, never in full sentences, and reply with the answer only. An approximate answer is fine; if there is no acceptable answer, reply 'n/a'.".to_string(),
            Operation::ResearchQuestions => "You receive a list of paper titles and propose research questions that a new theoretical model could answer. Respond with a JSON object of the form {\"research_questions\": string[]} and nothing else.".to_string(),
            Operation::InitialCoding => format!(
                "You perform the initial coding phase of the Gioia method on an academic paper. Read the text closely and identify emergent concepts, themes and patterns. Each code is a string of at most {} words phrased in the language of the source. Respond with a JSON object of the form {{\"codes\": string[]}} and nothing else.",
                params.max_code_words
            ),
            Operation::ThematicClustering => "You perform the second-order coding phase of the Gioia method: group the initial codes into higher-level themes. For example, \"employee sentiment\" could gather the initial codes \"positive feelings toward new policy\" and \"sense of control\". Respond with a JSON object whose keys are themes and whose values are arrays of the initial codes belonging to them, e.g. {\"a theme\": [\"code\", \"another code\"]}. Use the initial codes verbatim.".to_string(),
            Operation::DimensionAggregation => format!(
                "You perform the aggregate-dimensions phase of the Gioia method: identify {}-{} overarching, quantifiable theoretical dimensions that gather the second-order themes. Respond with a JSON object whose keys are dimensions and whose values are arrays of themes, e.g. {{\"a dimension\": [\"theme\", \"another theme\"]}}. Ground every dimension in the given themes and use the theme names verbatim.",
                params.dimension_min, params.dimension_max
            ),
            Operation::TheoryBrainstorm => "You brainstorm theories from existing literature that could explain a set of research findings. Each theory must be well defined and relate to one or more aggregate dimensions. Respond with a JSON object following this schema: {\"theories\": [{\"theory\": string, \"description\": string, \"relatedDimensions\": string[], \"possibleResearchQuestions\": string[]}]}.".to_string(),
            Operation::ConceptTuples => "You hypothesize which concepts could be related to each other so that the relationships can be researched in the literature next. Respond with a JSON object holding an array of two-element arrays: {\"tuples\": [[string, string], ...]}, e.g. {\"tuples\": [[\"Knowledge Management\", \"Organizational Performance\"]]}.".to_string(),
            Operation::Interrelationship => "You are a qualitative researcher. Using only the numbered passages, describe how the two concepts relate: direction, strength and any conditions. Be concise. If the passages say nothing about the relationship, say so.".to_string(),
            Operation::ModelConstruction => "You are a qualitative researcher constructing a novel theoretical model from the findings. The model relates to one or more aggregate dimensions and may build on existing theories, but it must introduce new ideas. Emphasize the relationships between the dimensions, state whether each is causal or correlational and keep a clear narrative. Do not address the user; give a general description of the model and name it.".to_string(),
            Operation::ModelNaming => "You extract the name of a theoretical model from its description. If none is given, invent an original one. Reply with the name only.".to_string(),
            Operation::Critique => "You are a qualitative researcher critiquing a theoretical model. Comment on novelty, conciseness, clarity and theoretical insight, and suggest new patterns worth looking for in the data. Do not address the user; return only the critique.".to_string(),
            Operation::DiagramSynthesis => format!(
                "You are a qualitative researcher visualizing a theoretical model as a MermaidJS flowchart. Example:\n\n{}\n\n{} Prefer codes as evidence over codes as nodes. Keep the diagram simple and effective. Return only the MermaidJS code.",
                DIAGRAM_EXAMPLE, DIAGRAM_LEGEND
            ),
        }
    }

    fn instruction(&self, op: Operation, params: &PipelineParams) -> String {
        match op {
            Operation::DetailExtraction => "Describe the requested detail of the given paper.".to_string(),
            Operation::ResearchQuestions => format!(
                "Now provide {} potential research questions as a JSON object.",
                params.research_question_count
            ),
            Operation::InitialCoding => "Perform initial coding according to the Gioia method on the given paper. Return a JSON object.".to_string(),
            Operation::ThematicClustering => format!(
                "Perform second-order coding according to the Gioia method and return a JSON object of {} focus codes.",
                params.focus_code_count
            ),
            Operation::DimensionAggregation => "Aggregate the themes into theoretical dimensions according to the Gioia method and return a JSON object.".to_string(),
            Operation::TheoryBrainstorm => "Suggest theories that could help explain these dimensions and themes. Return a JSON object.".to_string(),
            Operation::ConceptTuples => format!(
                "Hypothesize which concepts could be related and return only the JSON object with {}-{} tuples.",
                params.tuple_min, params.tuple_max
            ),
            Operation::Interrelationship => "Summarize how Concept A and Concept B relate.".to_string(),
            Operation::ModelConstruction => "Now construct an extensive, comprehensive, new theoretical model.".to_string(),
            Operation::ModelNaming => "Now return the model name.".to_string(),
            Operation::Critique => "Now return your critique.".to_string(),
            Operation::DiagramSynthesis => "Now return the MermaidJS flowchart for this model.".to_string(),
        }
    }
}
