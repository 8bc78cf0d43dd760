//! Coding Pipeline
//!
//! Orchestrates the Gioia stages over the active backend. Every entry point
//! snapshots the settings and resolves a fresh backend, so switching providers
//! between stages is honored. No entry point returns an error: provider and
//! configuration failures become a `Degraded` outcome carrying the empty
//! default and a one-line notice.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use theory_cascade_core::{
    dedupe_codes, restrict_members, ConceptTuple, DimensionMap, Document, InitialCode,
    Interrelationship, ModelState, ModelStateUpdate, ThemeMap, Theory,
};
use tracing::{debug, info, warn};

use super::diagram::FlowchartDiagram;
use super::outcome::{PipelineReport, StageNotice, StageOutcome, StageStatus};
use crate::models::settings::AppConfig;
use crate::services::analysis::{Analyst, BackendFactory, ProviderRegistry};
use crate::services::batch::map_bounded_infallible;
use crate::services::knowledge::{coding_segments, TextChunker};
use crate::services::retrieval::{CorpusIndex, RankingService};
use crate::state::SettingsStore;
use crate::utils::error::AppError;

pub const STAGE_INITIAL_CODING: &str = "initial_coding";
pub const STAGE_THEMATIC_CLUSTERING: &str = "thematic_clustering";
pub const STAGE_DIMENSION_AGGREGATION: &str = "dimension_aggregation";
pub const STAGE_THEORY_BRAINSTORM: &str = "theory_brainstorm";
pub const STAGE_CONCEPT_TUPLES: &str = "concept_tuples";
pub const STAGE_INTERRELATIONSHIPS: &str = "interrelationships";
pub const STAGE_MODEL_CONSTRUCTION: &str = "model_construction";
pub const STAGE_MODEL_NAMING: &str = "model_naming";
pub const STAGE_MODEL_CRITIQUE: &str = "model_critique";
pub const STAGE_DIAGRAM_SYNTHESIS: &str = "diagram_synthesis";
pub const STAGE_RETRIEVAL: &str = "retrieval";
pub const STAGE_RESEARCH_QUESTIONS: &str = "research_questions";
pub const STAGE_DETAIL: &str = "detail_extraction";
pub const STAGE_COMPLETION: &str = "completion";

/// Stage-1 result: the corpus with codes attached, plus their union.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodedCorpus {
    pub documents: Vec<Document>,
    pub codes: Vec<InitialCode>,
}

impl CodedCorpus {
    fn from_documents(documents: Vec<Document>) -> Self {
        let codes = dedupe_codes(documents.iter().flat_map(|d| d.initial_codes.iter()));
        Self { documents, codes }
    }
}

pub struct CodingPipeline {
    settings: SettingsStore,
    factory: Arc<dyn BackendFactory>,
}

impl CodingPipeline {
    pub fn new(settings: SettingsStore, factory: Arc<dyn BackendFactory>) -> Self {
        Self { settings, factory }
    }

    /// Pipeline over the built-in providers.
    pub fn with_registry(settings: SettingsStore) -> Self {
        Self::new(settings, Arc::new(ProviderRegistry::new()))
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Resolve the backend for one call from the current settings.
    async fn analyst(&self, stage: &str) -> Result<(Analyst, AppConfig), StageNotice> {
        let config = self.settings.snapshot().await;
        match self.factory.resolve(&config) {
            Ok(backend) => Ok((Analyst::new(backend, config.pipeline.clone()), config)),
            Err(err) => {
                warn!(stage, error = %err, "Could not resolve analysis backend");
                Err(StageNotice::from_error(stage, &err))
            }
        }
    }

    // ------------------------------------------------------------------
    // Stage 1
    // ------------------------------------------------------------------

    /// Code every document that has no codes yet. Oversized documents are
    /// coded chunk by chunk; documents fan out up to `concurrency` at a time.
    /// A failing chunk loses only its own codes.
    pub async fn run_initial_coding(
        &self,
        documents: Vec<Document>,
        remarks: Option<&str>,
    ) -> StageOutcome<CodedCorpus> {
        if documents.is_empty() {
            return StageOutcome::skipped(CodedCorpus::default());
        }
        if documents.iter().all(|d| d.is_coded() || !d.has_text()) {
            debug!(documents = documents.len(), "Nothing left to code");
            let corpus = CodedCorpus::from_documents(documents);
            let is_empty = corpus.codes.is_empty();
            return StageOutcome::from_answer(corpus, is_empty);
        }

        let (analyst, config) = match self.analyst(STAGE_INITIAL_CODING).await {
            Ok(resolved) => resolved,
            Err(notice) => {
                return StageOutcome::degraded(CodedCorpus::from_documents(documents), notice)
            }
        };

        let total = documents.len();
        let analyst = &analyst;
        let results = map_bounded_infallible(
            documents,
            config.pipeline.concurrency,
            |_, document| async move { code_document(analyst, document, remarks).await },
        )
        .await;

        let mut notices: Vec<StageNotice> = Vec::new();
        let mut documents = Vec::with_capacity(total);
        for (document, failures) in results {
            for notice in failures {
                if !notices.contains(&notice) {
                    notices.push(notice);
                }
            }
            documents.push(document);
        }

        let corpus = CodedCorpus::from_documents(documents);
        info!(
            stage = STAGE_INITIAL_CODING,
            documents = total,
            codes = corpus.codes.len(),
            failures = notices.len(),
            "Initial coding finished"
        );
        if notices.is_empty() {
            let is_empty = corpus.codes.is_empty();
            StageOutcome::from_answer(corpus, is_empty)
        } else {
            StageOutcome {
                value: corpus,
                status: StageStatus::Degraded,
                notices,
            }
        }
    }

    // ------------------------------------------------------------------
    // Stages 2-5
    // ------------------------------------------------------------------

    /// Group first-order codes into themes. Members outside `codes` are
    /// dropped, as are themes left empty.
    pub async fn run_thematic_clustering(&self, codes: &[String]) -> StageOutcome<ThemeMap> {
        if codes.is_empty() {
            return StageOutcome::skipped(ThemeMap::new());
        }
        let (analyst, _) = match self.analyst(STAGE_THEMATIC_CLUSTERING).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(ThemeMap::new(), notice),
        };
        match analyst.cluster_themes(codes).await {
            Ok(themes) => {
                let proposed = themes.len();
                let themes = restrict_members(themes, codes.iter().map(String::as_str));
                if themes.len() < proposed {
                    debug!(dropped = proposed - themes.len(), "Dropped themes with unknown codes");
                }
                info!(stage = STAGE_THEMATIC_CLUSTERING, themes = themes.len(), "Themes ready");
                let is_empty = themes.is_empty();
                StageOutcome::from_answer(themes, is_empty)
            }
            Err(err) => transport_failure(STAGE_THEMATIC_CLUSTERING, err.into()),
        }
    }

    /// Aggregate theme names into theoretical dimensions.
    pub async fn run_dimension_aggregation(
        &self,
        theme_map: &ThemeMap,
    ) -> StageOutcome<DimensionMap> {
        if theme_map.is_empty() {
            return StageOutcome::skipped(DimensionMap::new());
        }
        let (analyst, _) = match self.analyst(STAGE_DIMENSION_AGGREGATION).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(DimensionMap::new(), notice),
        };
        let themes: Vec<&str> = theme_map.keys().map(String::as_str).collect();
        match analyst.aggregate_dimensions(&themes).await {
            Ok(dimensions) => {
                let dimensions = restrict_members(dimensions, themes.iter().copied());
                info!(
                    stage = STAGE_DIMENSION_AGGREGATION,
                    dimensions = dimensions.len(),
                    "Dimensions ready"
                );
                let is_empty = dimensions.is_empty();
                StageOutcome::from_answer(dimensions, is_empty)
            }
            Err(err) => transport_failure(STAGE_DIMENSION_AGGREGATION, err.into()),
        }
    }

    pub async fn run_theory_brainstorm(&self, dimensions: &DimensionMap) -> StageOutcome<Vec<Theory>> {
        if dimensions.is_empty() {
            return StageOutcome::skipped(Vec::new());
        }
        let (analyst, _) = match self.analyst(STAGE_THEORY_BRAINSTORM).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(Vec::new(), notice),
        };
        match analyst.brainstorm_theories(dimensions).await {
            Ok(theories) => {
                let is_empty = theories.is_empty();
                StageOutcome::from_answer(theories, is_empty)
            }
            Err(err) => transport_failure(STAGE_THEORY_BRAINSTORM, err.into()),
        }
    }

    pub async fn run_concept_tuples(&self, state: &ModelState) -> StageOutcome<Vec<ConceptTuple>> {
        if state.dimension_map.is_empty() {
            return StageOutcome::skipped(Vec::new());
        }
        let (analyst, _) = match self.analyst(STAGE_CONCEPT_TUPLES).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(Vec::new(), notice),
        };
        match analyst.hypothesize_concept_tuples(state).await {
            Ok(tuples) => {
                let is_empty = tuples.is_empty();
                StageOutcome::from_answer(tuples, is_empty)
            }
            Err(err) => transport_failure(STAGE_CONCEPT_TUPLES, err.into()),
        }
    }

    /// Summarize how each tuple's concepts relate, grounded in the passages
    /// the retrieval index finds for it. Tuples without evidence are left out.
    pub async fn run_interrelationships(
        &self,
        state: &ModelState,
        tuples: &[ConceptTuple],
    ) -> StageOutcome<Vec<Interrelationship>> {
        if tuples.is_empty() || state.documents.is_empty() {
            return StageOutcome::skipped(Vec::new());
        }
        let (analyst, config) = match self.analyst(STAGE_INTERRELATIONSHIPS).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(Vec::new(), notice),
        };
        let Some(embedder) = analyst.embeddings() else {
            info!(
                provider = analyst.provider_name(),
                "Backend has no embeddings, skipping interrelationships"
            );
            return StageOutcome::skipped(Vec::new());
        };

        let chunker = TextChunker::for_retrieval(&config.retrieval);
        let index = match CorpusIndex::build(&state.documents, &chunker, embedder).await {
            Ok(index) => index,
            Err(err) => return transport_failure(STAGE_INTERRELATIONSHIPS, err.into()),
        };

        let top_k = config.retrieval.evidence_top_k;
        let analyst = &analyst;
        let index = &index;
        let results = map_bounded_infallible(
            tuples.to_vec(),
            config.pipeline.concurrency,
            |_, tuple| async move {
                let hits = match index.search(&tuple.as_query(), top_k).await {
                    Ok(hits) => hits,
                    Err(err) => {
                        return Err(StageNotice::from_error(STAGE_INTERRELATIONSHIPS, &err.into()))
                    }
                };
                if hits.is_empty() {
                    return Ok(None);
                }
                let passages: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
                match analyst.summarize_interrelationship(&tuple, &passages).await {
                    Ok(summary) if summary.is_empty() => Ok(None),
                    Ok(summary) => Ok(Some(Interrelationship {
                        evidence: hits.iter().map(|h| h.chunk_id.clone()).collect(),
                        concepts: tuple,
                        summary,
                    })),
                    Err(err) => Err(StageNotice::from_error(STAGE_INTERRELATIONSHIPS, &err.into())),
                }
            },
        )
        .await;

        let mut relationships = Vec::new();
        let mut notices: Vec<StageNotice> = Vec::new();
        for result in results {
            match result {
                Ok(Some(relationship)) => relationships.push(relationship),
                Ok(None) => {}
                Err(notice) if notices.contains(&notice) => {}
                Err(notice) => notices.push(notice),
            }
        }
        info!(
            stage = STAGE_INTERRELATIONSHIPS,
            tuples = tuples.len(),
            relationships = relationships.len(),
            "Interrelationships ready"
        );
        if notices.is_empty() {
            let is_empty = relationships.is_empty();
            StageOutcome::from_answer(relationships, is_empty)
        } else {
            StageOutcome {
                value: relationships,
                status: StageStatus::Degraded,
                notices,
            }
        }
    }

    // ------------------------------------------------------------------
    // Stages 6-7
    // ------------------------------------------------------------------

    /// Describe the model. When `state` already carries a description and a
    /// critique, the new description revises the old one.
    pub async fn run_model_construction(
        &self,
        state: &ModelState,
        remarks: Option<&str>,
    ) -> StageOutcome<String> {
        if state.dimension_map.is_empty() {
            return StageOutcome::skipped(String::new());
        }
        let (analyst, _) = match self.analyst(STAGE_MODEL_CONSTRUCTION).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(String::new(), notice),
        };
        match analyst.construct_model(state, remarks).await {
            Ok(description) => {
                let revision = !state.critique.trim().is_empty();
                info!(
                    stage = STAGE_MODEL_CONSTRUCTION,
                    revision,
                    chars = description.len(),
                    "Model description ready"
                );
                let is_empty = description.is_empty();
                StageOutcome::from_answer(description, is_empty)
            }
            Err(err) => transport_failure(STAGE_MODEL_CONSTRUCTION, err.into()),
        }
    }

    pub async fn run_model_naming(&self, description: &str) -> StageOutcome<String> {
        if description.trim().is_empty() {
            return StageOutcome::skipped(String::new());
        }
        let (analyst, _) = match self.analyst(STAGE_MODEL_NAMING).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(String::new(), notice),
        };
        match analyst.name_model(description).await {
            Ok(name) => {
                let is_empty = name.is_empty();
                StageOutcome::from_answer(name, is_empty)
            }
            Err(err) => transport_failure(STAGE_MODEL_NAMING, err.into()),
        }
    }

    pub async fn run_model_critique(&self, state: &ModelState) -> StageOutcome<String> {
        if state.model_description.trim().is_empty() {
            return StageOutcome::skipped(String::new());
        }
        let (analyst, _) = match self.analyst(STAGE_MODEL_CRITIQUE).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(String::new(), notice),
        };
        match analyst.critique_model(state).await {
            Ok(critique) => {
                let is_empty = critique.is_empty();
                StageOutcome::from_answer(critique, is_empty)
            }
            Err(err) => transport_failure(STAGE_MODEL_CRITIQUE, err.into()),
        }
    }

    /// Mermaid flowchart of the model. Answers that do not parse as a
    /// flowchart resolve to empty.
    pub async fn run_diagram_synthesis(&self, state: &ModelState) -> StageOutcome<String> {
        if state.model_description.trim().is_empty() {
            return StageOutcome::skipped(String::new());
        }
        let (analyst, _) = match self.analyst(STAGE_DIAGRAM_SYNTHESIS).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(String::new(), notice),
        };
        let source = match analyst.synthesize_diagram(state).await {
            Ok(source) => source,
            Err(err) => return transport_failure(STAGE_DIAGRAM_SYNTHESIS, err.into()),
        };

        let diagram = match FlowchartDiagram::parse(&source) {
            Ok(diagram) => diagram,
            Err(err) => {
                warn!(stage = STAGE_DIAGRAM_SYNTHESIS, error = %err, "Discarding unparseable diagram");
                return StageOutcome::empty(String::new());
            }
        };
        let vocabulary = state.code_vocabulary();
        let unknown = diagram.unknown_citations(&vocabulary);
        if !unknown.is_empty() {
            warn!(
                stage = STAGE_DIAGRAM_SYNTHESIS,
                unknown = ?unknown,
                "Diagram cites excerpts outside the code vocabulary"
            );
        }
        info!(
            stage = STAGE_DIAGRAM_SYNTHESIS,
            nodes = diagram.nodes.len(),
            edges = diagram.edges.len(),
            "Diagram ready"
        );
        StageOutcome::completed(source)
    }

    // ------------------------------------------------------------------
    // Retrieval and single operations
    // ------------------------------------------------------------------

    /// Rank `documents` by relevance to `query`. A blank query, or a backend
    /// without embeddings, hands the collection back unchanged.
    pub async fn run_retrieval(
        &self,
        query: Option<&str>,
        documents: Vec<Document>,
    ) -> StageOutcome<Vec<Document>> {
        let query = query.map(str::trim).unwrap_or_default();
        if query.is_empty() || documents.is_empty() {
            return StageOutcome::skipped(documents);
        }
        let (analyst, config) = match self.analyst(STAGE_RETRIEVAL).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(documents, notice),
        };
        let Some(embedder) = analyst.embeddings() else {
            info!(
                provider = analyst.provider_name(),
                "Backend has no embeddings, returning documents unranked"
            );
            return StageOutcome::skipped(documents);
        };

        let service = RankingService::new(config.retrieval.clone());
        match service.rank(query, &documents, Some(embedder)).await {
            Ok(ranked) => {
                info!(stage = STAGE_RETRIEVAL, matched = ranked.len(), of = documents.len(), "Ranked corpus");
                StageOutcome::completed(ranked)
            }
            Err(err) => {
                let err = AppError::from(err);
                warn!(stage = STAGE_RETRIEVAL, error = %err, "Ranking failed, returning documents unranked");
                StageOutcome::degraded(documents, StageNotice::from_error(STAGE_RETRIEVAL, &err))
            }
        }
    }

    /// Free-form completion in one request, optionally under a system
    /// instruction.
    pub async fn complete(&self, prompt: &str, system: Option<&str>) -> StageOutcome<String> {
        if prompt.trim().is_empty() {
            return StageOutcome::skipped(String::new());
        }
        let (analyst, _) = match self.analyst(STAGE_COMPLETION).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(String::new(), notice),
        };
        let system = system.map(str::trim).filter(|s| !s.is_empty());
        match analyst.complete(prompt, system).await {
            Ok(text) => {
                let is_empty = text.trim().is_empty();
                StageOutcome::from_answer(text, is_empty)
            }
            Err(err) => transport_failure(STAGE_COMPLETION, err.into()),
        }
    }

    /// Free-form completion streamed fragment by fragment into `sink`.
    pub async fn stream_completion<F>(&self, prompt: &str, sink: F) -> StageOutcome<String>
    where
        F: FnMut(&str),
    {
        let (analyst, _) = match self.analyst(STAGE_COMPLETION).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(String::new(), notice),
        };
        match analyst.stream_completion(prompt, sink).await {
            Ok(text) => {
                let is_empty = text.is_empty();
                StageOutcome::from_answer(text, is_empty)
            }
            Err(err) => transport_failure(STAGE_COMPLETION, err.into()),
        }
    }

    pub async fn get_detail(&self, document: &Document, detail: &str) -> StageOutcome<String> {
        if !document.has_text() {
            return StageOutcome::skipped(String::new());
        }
        let (analyst, _) = match self.analyst(STAGE_DETAIL).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(String::new(), notice),
        };
        match analyst.extract_detail(document, detail).await {
            Ok(answer) => {
                let is_empty = answer.is_empty();
                StageOutcome::from_answer(answer, is_empty)
            }
            Err(err) => transport_failure(STAGE_DETAIL, err.into()),
        }
    }

    pub async fn research_questions(&self, documents: &[Document]) -> StageOutcome<Vec<String>> {
        let titles: Vec<&str> = documents
            .iter()
            .map(|d| d.title.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if titles.is_empty() {
            return StageOutcome::skipped(Vec::new());
        }
        let (analyst, _) = match self.analyst(STAGE_RESEARCH_QUESTIONS).await {
            Ok(resolved) => resolved,
            Err(notice) => return StageOutcome::degraded(Vec::new(), notice),
        };
        match analyst.brainstorm_research_questions(&titles).await {
            Ok(questions) => {
                let is_empty = questions.is_empty();
                StageOutcome::from_answer(questions, is_empty)
            }
            Err(err) => transport_failure(STAGE_RESEARCH_QUESTIONS, err.into()),
        }
    }

    // ------------------------------------------------------------------
    // Drivers
    // ------------------------------------------------------------------

    /// Stages 1-3. Stops when stage 1 yields no codes or stage 2 no themes.
    pub async fn code_corpus(&self, state: &ModelState) -> (ModelState, PipelineReport) {
        let mut report = PipelineReport::default();

        let coded = self
            .run_initial_coding(state.documents.clone(), state.remarks.as_deref())
            .await;
        let corpus = report.record(STAGE_INITIAL_CODING, coded);
        let no_codes = corpus.codes.is_empty();
        let mut state = state.merge(ModelStateUpdate {
            documents: Some(corpus.documents),
            first_order_codes: Some(corpus.codes),
            ..Default::default()
        });
        if no_codes {
            report.stop(STAGE_INITIAL_CODING);
            return (state, report);
        }

        let themes = self.run_thematic_clustering(&state.first_order_codes).await;
        let completed = themes.status == StageStatus::Completed;
        let themes = report.record(STAGE_THEMATIC_CLUSTERING, themes);
        if !completed {
            report.stop(STAGE_THEMATIC_CLUSTERING);
            return (state, report);
        }
        state = state.merge(ModelStateUpdate {
            theme_map: Some(themes),
            ..Default::default()
        });

        let dimensions = self.run_dimension_aggregation(&state.theme_map).await;
        let completed = dimensions.status == StageStatus::Completed;
        let dimensions = report.record(STAGE_DIMENSION_AGGREGATION, dimensions);
        if completed {
            state = state.merge(ModelStateUpdate {
                dimension_map: Some(dimensions),
                ..Default::default()
            });
        }
        (state, report)
    }

    /// Stages 4-5 and the evidence behind each concept tuple.
    pub async fn theorize(&self, state: &ModelState) -> (ModelState, PipelineReport) {
        let mut report = PipelineReport::default();
        let mut state = state.clone();

        let theories = self.run_theory_brainstorm(&state.dimension_map).await;
        if let Some(theories) = completed_value(&mut report, STAGE_THEORY_BRAINSTORM, theories) {
            state = state.merge(ModelStateUpdate {
                theories: Some(theories),
                ..Default::default()
            });
        }

        let tuples = self.run_concept_tuples(&state).await;
        if let Some(tuples) = completed_value(&mut report, STAGE_CONCEPT_TUPLES, tuples) {
            state = state.merge(ModelStateUpdate {
                concept_tuples: Some(tuples),
                ..Default::default()
            });
        }

        let relationships = self
            .run_interrelationships(&state, &state.concept_tuples)
            .await;
        if let Some(relationships) =
            completed_value(&mut report, STAGE_INTERRELATIONSHIPS, relationships)
        {
            state = state.merge(ModelStateUpdate {
                interrelationships: Some(relationships),
                ..Default::default()
            });
        }
        (state, report)
    }

    /// Stage 6, naming, stage 7.
    pub async fn build_model(&self, state: &ModelState) -> (ModelState, PipelineReport) {
        let mut report = PipelineReport::default();
        let state = self.describe_and_draw(state.clone(), &mut report).await;
        (state, report)
    }

    /// Critique the current model, then rebuild it with the critique in hand.
    pub async fn refine_model(&self, state: &ModelState) -> (ModelState, PipelineReport) {
        let mut report = PipelineReport::default();
        let critique = self.run_model_critique(state).await;
        let Some(critique) = completed_value(&mut report, STAGE_MODEL_CRITIQUE, critique) else {
            report.stop(STAGE_MODEL_CRITIQUE);
            return (state.clone(), report);
        };
        let state = state.merge(ModelStateUpdate {
            critique: Some(critique),
            ..Default::default()
        });
        let state = self.describe_and_draw(state, &mut report).await;
        (state, report)
    }

    async fn describe_and_draw(&self, state: ModelState, report: &mut PipelineReport) -> ModelState {
        let description = self
            .run_model_construction(&state, state.remarks.as_deref())
            .await;
        let Some(description) = completed_value(report, STAGE_MODEL_CONSTRUCTION, description)
        else {
            report.stop(STAGE_MODEL_CONSTRUCTION);
            return state;
        };
        let mut state = state.apply(ModelStateUpdate {
            model_description: Some(description),
            ..Default::default()
        });

        let name = self.run_model_naming(&state.model_description).await;
        if let Some(name) = completed_value(report, STAGE_MODEL_NAMING, name) {
            state = state.apply(ModelStateUpdate {
                model_name: Some(name),
                ..Default::default()
            });
        }

        let diagram = self.run_diagram_synthesis(&state).await;
        if let Some(diagram) = completed_value(report, STAGE_DIAGRAM_SYNTHESIS, diagram) {
            state = state.apply(ModelStateUpdate {
                diagram: Some(diagram),
                ..Default::default()
            });
        }
        state
    }
}

/// Code one document, chunk by chunk, in order. Already coded documents
/// pass through untouched.
async fn code_document(
    analyst: &Analyst,
    mut document: Document,
    remarks: Option<&str>,
) -> (Document, Vec<StageNotice>) {
    if document.is_coded() {
        return (document, Vec::new());
    }
    let segments = coding_segments(&document.full_text, analyst.params());
    if segments.len() > 1 {
        debug!(document = %document.id, chunks = segments.len(), "Coding oversized document in chunks");
    }

    let mut codes = Vec::new();
    let mut notices = Vec::new();
    for segment in segments {
        match analyst.code_text(&document.title, segment, remarks).await {
            Ok(found) => codes.extend(found),
            Err(err) => {
                warn!(document = %document.id, error = %err, "Coding request failed");
                notices.push(StageNotice::from_error(STAGE_INITIAL_CODING, &err.into()));
            }
        }
    }
    document.initial_codes = dedupe_codes(&codes);
    (document, notices)
}

/// Record `outcome` and return its value only when the stage completed, so
/// failed or empty stages never overwrite earlier state.
fn completed_value<T>(report: &mut PipelineReport, stage: &str, outcome: StageOutcome<T>) -> Option<T> {
    let completed = outcome.status == StageStatus::Completed;
    let value = report.record(stage, outcome);
    completed.then_some(value)
}

fn transport_failure<T: Default>(stage: &str, err: AppError) -> StageOutcome<T> {
    warn!(stage, error = %err, "Stage degraded");
    StageOutcome::failed(stage, &err)
}

