//! Coding Pipeline Integration Tests
//!
//! Drives every stage through scripted providers:
//! - Stage 1 idempotence, chunking and per-document failure isolation
//! - Membership pruning of themes and dimensions
//! - Terminal conditions and degraded outcomes
//! - Model construction, critique re-entry, naming and diagrams
//! - Per-call backend resolution

use theory_cascade::models::settings::AppConfig;
use theory_cascade::services::analysis::Operation;
use theory_cascade::services::coding::{
    NoticeKind, StageStatus, STAGE_DIMENSION_AGGREGATION, STAGE_INITIAL_CODING,
    STAGE_MODEL_CRITIQUE, STAGE_THEMATIC_CLUSTERING,
};
use theory_cascade::SettingsUpdate;
use theory_cascade_core::{ConceptTuple, DimensionMap, Document, ModelState, ThemeMap};
use theory_cascade_llm::{LlmError, ProviderType};

use super::support::{network_error, scripted_pipeline, scripted_pipeline_with, MockLlmProvider, ScriptedBackends};

const DIAGRAM: &str = "Here is the diagram:\n```mermaid\nflowchart TD\n  A[Trust<br>'peer trust'] ==>|Enables| B[Autonomy]\n  B -.-> C[Burnout]\n```";

fn corpus() -> Vec<Document> {
    vec![
        Document::new("p1", "Remote Work Study", "Remote teams rely on peer trust and flexible hours."),
        Document::new("p2", "Leadership Survey", "Managers grant autonomy; workload drives burnout."),
    ]
}

fn coding_mock() -> MockLlmProvider {
    MockLlmProvider::new("openai")
        .on_containing(
            Operation::InitialCoding,
            "Remote Work Study",
            r#"{"codes": ["peer trust", "flexible hours"]}"#,
        )
        .on_containing(
            Operation::InitialCoding,
            "Leadership Survey",
            "```json\n{\"codes\": [\"granted autonomy\", \"peer trust\", \"workload burnout\"]}\n```",
        )
        .on(
            Operation::ThematicClustering,
            r#"{"Trust": ["peer trust", "invented code"], "Autonomy": ["granted autonomy", "flexible hours"], "Ghost": ["nobody said this"]}"#,
        )
        .on(
            Operation::DimensionAggregation,
            r#"{"Relational Climate": ["Trust", "Ghost"], "Work Design": ["Autonomy"]}"#,
        )
}

fn coded_state() -> ModelState {
    let mut state = ModelState::new(corpus());
    state.first_order_codes = vec!["peer trust".into(), "granted autonomy".into()];
    state.theme_map = ThemeMap::from([
        ("Trust".to_string(), vec!["peer trust".to_string()]),
        ("Autonomy".to_string(), vec!["granted autonomy".to_string()]),
    ]);
    state.dimension_map = DimensionMap::from([
        ("Relational Climate".to_string(), vec!["Trust".to_string()]),
        ("Work Design".to_string(), vec!["Autonomy".to_string()]),
    ]);
    state
}

// ============================================================================
// Stage 1
// ============================================================================

#[tokio::test]
async fn test_initial_coding_unions_codes_without_duplicates() {
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(coding_mock()));

    let outcome = pipeline.run_initial_coding(corpus(), None).await;

    assert_eq!(outcome.status, StageStatus::Completed);
    assert_eq!(
        outcome.value.codes,
        vec!["peer trust", "flexible hours", "granted autonomy", "workload burnout"]
    );
    assert_eq!(outcome.value.documents[0].initial_codes, vec!["peer trust", "flexible hours"]);
    assert_eq!(outcome.value.documents[1].initial_codes.len(), 3);
}

#[tokio::test]
async fn test_initial_coding_skips_coded_documents() {
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(coding_mock()));
    let mut documents = corpus();
    documents[0].initial_codes = vec!["existing code".to_string()];

    let outcome = pipeline.run_initial_coding(documents, None).await;

    let mock = backends.provider(ProviderType::OpenAI);
    assert_eq!(mock.call_count(Operation::InitialCoding), 1);
    assert_eq!(outcome.value.documents[0].initial_codes, vec!["existing code"]);
    assert!(outcome.value.codes.contains(&"existing code".to_string()));

    // A second pass over the coded corpus calls nothing.
    let again = pipeline.run_initial_coding(outcome.value.documents.clone(), None).await;
    assert_eq!(mock.call_count(Operation::InitialCoding), 1);
    assert_eq!(again.value, outcome.value);
}

#[tokio::test]
async fn test_transport_failure_only_loses_that_document() {
    let mock = MockLlmProvider::new("openai")
        .fail_containing(Operation::InitialCoding, "Leadership Survey", network_error())
        .on(Operation::InitialCoding, r#"{"codes": ["peer trust"]}"#);
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));

    let outcome = pipeline.run_initial_coding(corpus(), None).await;

    assert_eq!(outcome.status, StageStatus::Degraded);
    assert_eq!(outcome.notices.len(), 1);
    assert_eq!(outcome.notices[0].kind, NoticeKind::Transport);
    assert!(outcome.notices[0].message.starts_with("initial_coding: "));
    assert_eq!(outcome.value.documents[0].initial_codes, vec!["peer trust"]);
    assert!(outcome.value.documents[1].initial_codes.is_empty());
    assert_eq!(outcome.value.codes, vec!["peer trust"]);
}

#[tokio::test]
async fn test_oversized_documents_are_coded_per_chunk() {
    let mut config = AppConfig::default();
    config.pipeline.coding_chunk_threshold = 40;
    config.pipeline.coding_chunk_size = 30;
    let mock = MockLlmProvider::new("openai").on(Operation::InitialCoding, r#"{"codes": ["chunk code"]}"#);
    let (pipeline, backends) = scripted_pipeline_with(ScriptedBackends::new(mock), config);

    let text = "a".repeat(75);
    let outcome = pipeline
        .run_initial_coding(vec![Document::new("long", "Long Paper", text)], Some("focus on trust"))
        .await;

    let prompts = backends.provider(ProviderType::OpenAI).prompts_for(Operation::InitialCoding);
    assert_eq!(prompts.len(), 3);
    assert!(prompts.iter().all(|p| p.contains("Remarks: focus on trust")));
    assert_eq!(outcome.value.codes, vec!["chunk code"]);
}

#[tokio::test]
async fn test_missing_credential_is_a_configuration_notice() {
    let mut config = AppConfig::default();
    config.provider = ProviderType::Gemini;
    let (pipeline, backends) = scripted_pipeline_with(ScriptedBackends::new(coding_mock()), config);

    let outcome = pipeline.run_initial_coding(corpus(), None).await;

    assert!(outcome.is_degraded());
    assert_eq!(outcome.notices[0].kind, NoticeKind::Configuration);
    assert_eq!(outcome.value.documents, corpus());
    assert!(outcome.value.codes.is_empty());
    assert_eq!(backends.provider(ProviderType::OpenAI).total_calls(), 0);
}

#[tokio::test]
async fn test_empty_corpus_is_skipped() {
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(coding_mock()));
    let outcome = pipeline.run_initial_coding(Vec::new(), None).await;
    assert_eq!(outcome.status, StageStatus::Skipped);
    assert_eq!(backends.provider(ProviderType::OpenAI).total_calls(), 0);
}

// ============================================================================
// Stages 2-3
// ============================================================================

#[tokio::test]
async fn test_themes_only_reference_known_codes() {
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(coding_mock()));
    let codes: Vec<String> = vec!["peer trust".into(), "granted autonomy".into(), "flexible hours".into()];

    let outcome = pipeline.run_thematic_clustering(&codes).await;

    let themes = outcome.value;
    assert_eq!(themes.len(), 2);
    assert_eq!(themes["Trust"], vec!["peer trust"]);
    assert_eq!(themes["Autonomy"], vec!["granted autonomy", "flexible hours"]);
    assert!(!themes.contains_key("Ghost"));
}

#[tokio::test]
async fn test_clustering_without_codes_does_not_call_provider() {
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(coding_mock()));
    let outcome = pipeline.run_thematic_clustering(&[]).await;
    assert_eq!(outcome.status, StageStatus::Skipped);
    assert_eq!(backends.provider(ProviderType::OpenAI).total_calls(), 0);
}

#[tokio::test]
async fn test_code_corpus_runs_first_three_stages() {
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(coding_mock()));
    let (state, report) = pipeline.code_corpus(&ModelState::new(corpus())).await;

    assert!(report.stopped_at.is_none());
    assert!(!report.is_degraded());
    assert_eq!(state.first_order_codes.len(), 4);
    assert_eq!(state.theme_map.len(), 2);
    assert_eq!(
        state.dimension_map["Relational Climate"],
        vec!["Trust"],
        "dimension members outside the theme map are dropped"
    );
    assert!(state.validate().is_ok());
}

#[tokio::test]
async fn test_code_corpus_stops_on_empty_theme_map() {
    let mock = MockLlmProvider::new("openai")
        .on(Operation::InitialCoding, r#"{"codes": ["peer trust"]}"#)
        .on(Operation::ThematicClustering, "I could not find any themes, sorry.");
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(mock));

    let (state, report) = pipeline.code_corpus(&ModelState::new(corpus())).await;

    assert_eq!(report.stopped_at.as_deref(), Some(STAGE_THEMATIC_CLUSTERING));
    assert_eq!(report.status_of(STAGE_THEMATIC_CLUSTERING), Some(StageStatus::Empty));
    assert_eq!(report.status_of(STAGE_DIMENSION_AGGREGATION), None);
    assert!(state.theme_map.is_empty());
    assert_eq!(state.first_order_codes, vec!["peer trust"]);
    assert_eq!(
        backends.provider(ProviderType::OpenAI).call_count(Operation::DimensionAggregation),
        0
    );
}

#[tokio::test]
async fn test_code_corpus_stops_without_codes() {
    let mock = MockLlmProvider::new("openai").on(Operation::InitialCoding, "not json at all");
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(mock));

    let (state, report) = pipeline.code_corpus(&ModelState::new(corpus())).await;

    assert_eq!(report.stopped_at.as_deref(), Some(STAGE_INITIAL_CODING));
    assert!(state.first_order_codes.is_empty());
    assert_eq!(
        backends.provider(ProviderType::OpenAI).call_count(Operation::ThematicClustering),
        0
    );
}

#[tokio::test]
async fn test_failed_stage_keeps_previous_value() {
    let mock = MockLlmProvider::new("openai").fail(Operation::DimensionAggregation, network_error());
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));
    let state = coded_state();

    let dimensions = pipeline.run_dimension_aggregation(&state.theme_map).await;
    assert!(dimensions.is_degraded());
    assert!(dimensions.value.is_empty());

    // Already coded corpus: the driver only re-runs stages 2-3.
    let mock = MockLlmProvider::new("openai")
        .on(Operation::ThematicClustering, r#"{"Trust": ["peer trust"], "Autonomy": ["granted autonomy"]}"#)
        .fail(Operation::DimensionAggregation, network_error());
    let mut documents = corpus();
    documents[0].initial_codes = vec!["peer trust".into()];
    documents[1].initial_codes = vec!["granted autonomy".into()];
    let mut previous = state.clone();
    previous.documents = documents;
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));

    let (next, report) = pipeline.code_corpus(&previous).await;
    assert_eq!(report.status_of(STAGE_DIMENSION_AGGREGATION), Some(StageStatus::Degraded));
    assert_eq!(next.dimension_map, previous.dimension_map);
    assert_eq!(report.notices.len(), 1);
}

// ============================================================================
// Stages 4-7
// ============================================================================

#[tokio::test]
async fn test_theorize_collects_theories_tuples_and_evidence() {
    let mock = MockLlmProvider::new("openai")
        .on(
            Operation::TheoryBrainstorm,
            r#"{"theories": [{"theory": "Social Exchange Theory", "description": "Reciprocity", "relatedDimensions": ["Relational Climate"], "possibleResearchQuestions": []}]}"#,
        )
        .on(Operation::ConceptTuples, r#"{"tuples": [["trust", "autonomy"], ["lonely"]]}"#)
        .on(Operation::Interrelationship, "Trust precedes granted autonomy.");
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));

    let (state, report) = pipeline.theorize(&coded_state()).await;

    assert!(!report.is_degraded());
    assert_eq!(state.theories[0].name, "Social Exchange Theory");
    assert_eq!(state.concept_tuples, vec![ConceptTuple::new("trust", "autonomy")]);
    assert_eq!(state.interrelationships.len(), 1);
    let relation = &state.interrelationships[0];
    assert_eq!(relation.summary, "Trust precedes granted autonomy.");
    assert!(!relation.evidence.is_empty());
}

#[tokio::test]
async fn test_interrelationships_need_embeddings() {
    let mock = MockLlmProvider::new("openai").on(Operation::Interrelationship, "Related.");
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(mock).without_embeddings());

    let outcome = pipeline
        .run_interrelationships(&coded_state(), &[ConceptTuple::new("trust", "autonomy")])
        .await;

    assert_eq!(outcome.status, StageStatus::Skipped);
    assert!(outcome.value.is_empty());
    assert_eq!(backends.provider(ProviderType::OpenAI).total_calls(), 0);
}

#[tokio::test]
async fn test_build_model_names_and_draws() {
    let mock = MockLlmProvider::new("openai")
        .on(Operation::ModelConstruction, "The Trust-Autonomy Loop explains how peer trust enables autonomy.")
        .on(Operation::ModelNaming, "\"Trust-Autonomy Loop\"")
        .on(Operation::DiagramSynthesis, DIAGRAM);
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(mock));

    let (state, report) = pipeline.build_model(&coded_state()).await;

    assert!(report.stopped_at.is_none());
    assert_eq!(state.model_name, "Trust-Autonomy Loop");
    assert!(state.model_description.starts_with("The Trust-Autonomy Loop"));
    assert!(state.diagram.starts_with("flowchart TD"));
    assert!(!state.diagram.contains("```"));

    let diagram_prompt = &backends.provider(ProviderType::OpenAI).prompts_for(Operation::DiagramSynthesis)[0];
    assert!(diagram_prompt.contains("First-order codes: peer trust, granted autonomy"));
}

#[tokio::test]
async fn test_refine_model_feeds_critique_back() {
    let mock = MockLlmProvider::new("openai")
        .on(Operation::Critique, "Too vague about burnout.")
        .on(Operation::ModelConstruction, "Revised model with burnout as outcome.")
        .on(Operation::ModelNaming, "Name: Revised Loop")
        .on(Operation::DiagramSynthesis, DIAGRAM);
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(mock));
    let mut state = coded_state();
    state.model_name = "Loop".into();
    state.model_description = "First draft of the model.".into();

    let (refined, report) = pipeline.refine_model(&state).await;

    assert_eq!(report.status_of(STAGE_MODEL_CRITIQUE), Some(StageStatus::Completed));
    assert_eq!(refined.critique, "Too vague about burnout.");
    assert_eq!(refined.model_description, "Revised model with burnout as outcome.");
    assert_eq!(refined.model_name, "Revised Loop");

    let construction = &backends.provider(ProviderType::OpenAI).prompts_for(Operation::ModelConstruction)[0];
    assert!(construction.contains("Previous model: First draft of the model."));
    assert!(construction.contains("Critique: Too vague about burnout."));
}

#[tokio::test]
async fn test_unparseable_diagram_resolves_to_empty() {
    let mock = MockLlmProvider::new("openai").on(Operation::DiagramSynthesis, "I cannot draw this model.");
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));
    let mut state = coded_state();
    state.model_description = "A model.".into();

    let outcome = pipeline.run_diagram_synthesis(&state).await;

    assert_eq!(outcome.status, StageStatus::Empty);
    assert!(outcome.value.is_empty());
}

#[tokio::test]
async fn test_diagram_keyword_in_preamble_is_not_the_header() {
    let mock = MockLlmProvider::new("openai").on(
        Operation::DiagramSynthesis,
        "Here is the flowchart diagram you asked for:\n```mermaid\nflowchart LR\n  A[Trust] ==> B[Autonomy]\n```",
    );
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));
    let mut state = coded_state();
    state.model_description = "A model.".into();

    let outcome = pipeline.run_diagram_synthesis(&state).await;

    assert_eq!(outcome.status, StageStatus::Completed);
    assert_eq!(outcome.value, "flowchart LR\n  A[Trust] ==> B[Autonomy]");
}

#[tokio::test]
async fn test_graph_header_diagram_is_kept() {
    let mock = MockLlmProvider::new("openai").on(
        Operation::DiagramSynthesis,
        "```mermaid\ngraph TD\n  A[Trust] ==> B[Autonomy]\n```",
    );
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));
    let mut state = coded_state();
    state.model_description = "A model.".into();

    let outcome = pipeline.run_diagram_synthesis(&state).await;

    assert_eq!(outcome.status, StageStatus::Completed);
    assert_eq!(outcome.value, "graph TD\n  A[Trust] ==> B[Autonomy]");
}

#[tokio::test]
async fn test_diagram_with_unknown_direction_is_discarded() {
    let mock = MockLlmProvider::new("openai")
        .on(Operation::DiagramSynthesis, "flowchart sideways\n  A ==> B");
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));
    let mut state = coded_state();
    state.model_description = "A model.".into();

    let outcome = pipeline.run_diagram_synthesis(&state).await;

    assert_eq!(outcome.status, StageStatus::Empty);
    assert!(outcome.value.is_empty());
}

#[tokio::test]
async fn test_model_stages_skip_without_upstream_input() {
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(coding_mock()));
    let empty = ModelState::default();

    assert_eq!(pipeline.run_theory_brainstorm(&empty.dimension_map).await.status, StageStatus::Skipped);
    assert_eq!(pipeline.run_concept_tuples(&empty).await.status, StageStatus::Skipped);
    assert_eq!(pipeline.run_model_construction(&empty, None).await.status, StageStatus::Skipped);
    assert_eq!(pipeline.run_model_critique(&empty).await.status, StageStatus::Skipped);
    assert_eq!(pipeline.run_diagram_synthesis(&empty).await.status, StageStatus::Skipped);
    assert_eq!(pipeline.run_model_naming("  ").await.status, StageStatus::Skipped);
    assert_eq!(backends.provider(ProviderType::OpenAI).total_calls(), 0);
}

// ============================================================================
// Backend selection and single operations
// ============================================================================

#[tokio::test]
async fn test_backend_switch_applies_to_next_call() {
    let openai = MockLlmProvider::new("openai").on(Operation::ModelNaming, "Alpha");
    let ollama = MockLlmProvider::new("ollama").on(Operation::ModelNaming, "Beta");
    let (pipeline, backends) = scripted_pipeline(
        ScriptedBackends::new(openai).with(ProviderType::Ollama, ollama),
    );

    assert_eq!(pipeline.run_model_naming("A model.").await.value, "Alpha");
    pipeline
        .settings()
        .update(SettingsUpdate {
            provider: Some(ProviderType::Ollama),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pipeline.run_model_naming("A model.").await.value, "Beta");

    assert_eq!(backends.provider(ProviderType::OpenAI).total_calls(), 1);
    assert_eq!(backends.provider(ProviderType::Ollama).total_calls(), 1);
}

#[tokio::test]
async fn test_stream_completion_feeds_sink() {
    let mock = MockLlmProvider::new("openai").on_free_form("trust builds autonomy");
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));

    let mut fragments = Vec::new();
    let outcome = pipeline
        .stream_completion("Summarize.", |fragment| fragments.push(fragment.to_string()))
        .await;

    assert_eq!(outcome.value, "trust builds autonomy");
    assert_eq!(fragments, vec!["trust ", "builds ", "autonomy"]);
}

#[tokio::test]
async fn test_complete_sends_system_instruction() {
    let mock = MockLlmProvider::new("openai")
        .on_system("Answer in one word.", "Trust")
        .on_free_form("A longer answer about trust.");
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(mock));

    let guided = pipeline.complete("What drives autonomy?", Some("Answer in one word.")).await;
    let plain = pipeline.complete("What drives autonomy?", None).await;

    assert_eq!(guided.status, StageStatus::Completed);
    assert_eq!(guided.value, "Trust");
    assert_eq!(plain.value, "A longer answer about trust.");
    let mock = backends.provider(ProviderType::OpenAI);
    assert_eq!(mock.prompts_under(Some("Answer in one word.")), vec!["What drives autonomy?"]);
    assert_eq!(mock.prompts_under(None).len(), 1);

    assert_eq!(pipeline.complete("  ", None).await.status, StageStatus::Skipped);
    assert_eq!(mock.total_calls(), 2);
}

#[tokio::test]
async fn test_complete_transport_failure_is_degraded() {
    let mock = MockLlmProvider::new("openai").fail_free_form(network_error());
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));

    let outcome = pipeline.complete("Summarize.", None).await;

    assert_eq!(outcome.status, StageStatus::Degraded);
    assert_eq!(outcome.notices[0].kind, NoticeKind::Transport);
}

#[tokio::test]
async fn test_detail_echo_becomes_not_available() {
    let mock = MockLlmProvider::new("openai")
        .on_containing(Operation::DetailExtraction, "'Sample size'", "Sample size")
        .on(Operation::DetailExtraction, "Survey");
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));
    let documents = corpus();
    let document = &documents[0];

    assert_eq!(pipeline.get_detail(document, "Sample size").await.value, "n/a");
    assert_eq!(pipeline.get_detail(document, "Method").await.value, "Survey");

    let blank = Document::new("x", "Untitled", "");
    assert_eq!(pipeline.get_detail(&blank, "Method").await.status, StageStatus::Skipped);
}

#[tokio::test]
async fn test_research_questions_from_titles() {
    let mock = MockLlmProvider::new("openai").on(
        Operation::ResearchQuestions,
        r#"{"research_questions": ["How does trust shape autonomy?"]}"#,
    );
    let (pipeline, backends) = scripted_pipeline(ScriptedBackends::new(mock));

    let outcome = pipeline.research_questions(&corpus()).await;

    assert_eq!(outcome.value, vec!["How does trust shape autonomy?"]);
    let prompt = &backends.provider(ProviderType::OpenAI).prompts_for(Operation::ResearchQuestions)[0];
    assert!(prompt.contains("Remote Work Study"));
    assert!(prompt.contains("Leadership Survey"));
}

#[tokio::test]
async fn test_authentication_failure_is_configuration() {
    let mock = MockLlmProvider::new("openai").fail(
        Operation::Critique,
        LlmError::AuthenticationFailed {
            message: "invalid key".to_string(),
        },
    );
    let (pipeline, _) = scripted_pipeline(ScriptedBackends::new(mock));
    let mut state = coded_state();
    state.model_description = "A model.".into();

    let (unchanged, report) = pipeline.refine_model(&state).await;

    assert_eq!(report.stopped_at.as_deref(), Some(STAGE_MODEL_CRITIQUE));
    assert_eq!(report.notices[0].kind, NoticeKind::Configuration);
    assert_eq!(unchanged, state);
}
