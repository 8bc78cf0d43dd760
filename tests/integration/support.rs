//! Scripted providers for driving the pipeline without network access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use theory_cascade::models::settings::{AppConfig, PipelineParams};
use theory_cascade::services::analysis::{AnalysisBackend, BackendFactory, Operation, PromptSet};
use theory_cascade::services::retrieval::{EmbeddingProvider, TfIdfEmbeddingProvider};
use theory_cascade::{AppError, AppResult, CodingPipeline, SettingsStore};
use theory_cascade_core::streaming::UnifiedStreamEvent;
use theory_cascade_llm::{
    LlmError, LlmProvider, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig,
    ProviderType, StopReason, UsageStats,
};

/// Prompt set whose system prompt is just the operation name, so the mock
/// can tell operations apart regardless of template wording.
pub struct OperationTags;

impl PromptSet for OperationTags {
    fn backend(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn system_prompt(&self, op: Operation, _params: &PipelineParams) -> String {
        op.as_str().to_string()
    }

    fn instruction(&self, op: Operation, _params: &PipelineParams) -> String {
        format!("Answer the {} request.", op)
    }
}

struct Rule {
    /// `None` matches prompts sent without a system instruction.
    system: Option<String>,
    needle: Option<String>,
    reply: LlmResult<String>,
}

/// Replies chosen by operation and, optionally, by prompt content. The
/// first matching rule wins; unmatched prompts get an empty answer.
pub struct MockLlmProvider {
    name: &'static str,
    rules: Vec<Rule>,
    calls: Mutex<Vec<(Option<String>, String)>>,
    config: ProviderConfig,
}

impl MockLlmProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
            config: ProviderConfig::default(),
        }
    }

    pub fn on(self, op: Operation, reply: &str) -> Self {
        self.rule(Some(op.as_str().to_string()), None, Ok(reply.to_string()))
    }

    pub fn on_containing(self, op: Operation, needle: &str, reply: &str) -> Self {
        self.rule(
            Some(op.as_str().to_string()),
            Some(needle.to_string()),
            Ok(reply.to_string()),
        )
    }

    pub fn fail_containing(self, op: Operation, needle: &str, error: LlmError) -> Self {
        self.rule(Some(op.as_str().to_string()), Some(needle.to_string()), Err(error))
    }

    pub fn fail(self, op: Operation, error: LlmError) -> Self {
        self.rule(Some(op.as_str().to_string()), None, Err(error))
    }

    /// Reply for free-form completions (no system instruction).
    pub fn on_free_form(self, reply: &str) -> Self {
        self.rule(None, None, Ok(reply.to_string()))
    }

    pub fn fail_free_form(self, error: LlmError) -> Self {
        self.rule(None, None, Err(error))
    }

    /// Reply for free-form completions sent under `system`.
    pub fn on_system(self, system: &str, reply: &str) -> Self {
        self.rule(Some(system.to_string()), None, Ok(reply.to_string()))
    }

    fn rule(mut self, system: Option<String>, needle: Option<String>, reply: LlmResult<String>) -> Self {
        self.rules.push(Rule {
            system,
            needle,
            reply,
        });
        self
    }

    /// User prompts sent for `op`, in call order.
    pub fn prompts_for(&self, op: Operation) -> Vec<String> {
        self.prompts_under(Some(op.as_str()))
    }

    /// User prompts sent with exactly this system instruction.
    pub fn prompts_under(&self, system: Option<&str>) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(sent, _)| sent.as_deref() == system)
            .map(|(_, user)| user.clone())
            .collect()
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.prompts_for(op).len()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, messages: &[Message], system: Option<String>) -> LlmResult<String> {
        let user = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.calls.lock().unwrap().push((system.clone(), user.clone()));

        self.rules
            .iter()
            .find(|rule| {
                rule.system == system
                    && rule
                        .needle
                        .as_deref()
                        .map_or(true, |needle| user.contains(needle))
            })
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| Ok(String::new()))
    }

    fn response(&self, text: String) -> LlmResponse {
        LlmResponse {
            content: Some(text),
            stop_reason: StopReason::EndTurn,
            usage: UsageStats::default(),
            model: "scripted".to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        _request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let text = self.answer(&messages, system)?;
        Ok(self.response(text))
    }

    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        _request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let text = self.answer(&messages, system)?;
        for word in text.split_inclusive(' ') {
            let _ = tx
                .send(UnifiedStreamEvent::TextDelta {
                    content: word.to_string(),
                })
                .await;
        }
        let _ = tx
            .send(UnifiedStreamEvent::Complete {
                stop_reason: Some("end_turn".to_string()),
            })
            .await;
        Ok(self.response(text))
    }

    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Factory that hands out scripted providers by the configured backend.
/// Backends without a registered mock fail as if their key were missing.
pub struct ScriptedBackends {
    providers: HashMap<ProviderType, Arc<MockLlmProvider>>,
    embeddings: bool,
}

impl ScriptedBackends {
    pub fn new(mock: MockLlmProvider) -> Self {
        Self {
            providers: HashMap::new(),
            embeddings: true,
        }
        .with(ProviderType::OpenAI, mock)
    }

    pub fn with(mut self, provider: ProviderType, mock: MockLlmProvider) -> Self {
        self.providers.insert(provider, Arc::new(mock));
        self
    }

    pub fn without_embeddings(mut self) -> Self {
        self.embeddings = false;
        self
    }

    pub fn provider(&self, provider: ProviderType) -> Arc<MockLlmProvider> {
        self.providers[&provider].clone()
    }
}

impl BackendFactory for ScriptedBackends {
    fn resolve(&self, config: &AppConfig) -> AppResult<AnalysisBackend> {
        let mock = self.providers.get(&config.provider).ok_or_else(|| {
            AppError::from(LlmError::MissingCredential {
                provider: config.provider.to_string(),
            })
        })?;
        let llm: Arc<dyn LlmProvider> = mock.clone();
        let embeddings = self
            .embeddings
            .then(|| Arc::new(TfIdfEmbeddingProvider::new()) as Arc<dyn EmbeddingProvider>);
        Ok(AnalysisBackend {
            llm,
            prompts: Arc::new(OperationTags),
            embeddings,
        })
    }
}

/// Pipeline over `backends` with default settings, plus handles to both.
pub fn scripted_pipeline(backends: ScriptedBackends) -> (CodingPipeline, Arc<ScriptedBackends>) {
    scripted_pipeline_with(backends, AppConfig::default())
}

pub fn scripted_pipeline_with(
    backends: ScriptedBackends,
    config: AppConfig,
) -> (CodingPipeline, Arc<ScriptedBackends>) {
    let backends = Arc::new(backends);
    let factory: Arc<dyn BackendFactory> = backends.clone();
    (CodingPipeline::new(SettingsStore::new(config), factory), backends)
}

pub fn network_error() -> LlmError {
    LlmError::NetworkError {
        message: "connection reset".to_string(),
    }
}
