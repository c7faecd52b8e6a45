//! Inference providers and routing
//!
//! A provider turns a prompt into text. Provider failures never escape as
//! errors: they come back as an `[Error] ...` payload and are handled by the
//! pipeline like any other generated text.
//!
//! Backend choice is a pure mapping from task type to route. The route only
//! names the variable holding the credential; the secret itself is resolved
//! through `SecretResolver` when the client is built.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiCompatClient;

/// Prefix of every error-shaped payload a provider returns
pub const ERROR_PREFIX: &str = "[Error]";

#[async_trait]
pub trait InferenceClient: Send + Sync {
    fn name(&self) -> &str;

    /// Final assembled text, or an `[Error] ...` payload
    async fn generate(&self, prompt: &str, system_instruction: Option<&str>) -> String;
}

pub fn is_error_payload(text: &str) -> bool {
    text.trim_start().starts_with(ERROR_PREFIX)
}

//
// ================= Routing =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DetailedReport,
    QuickSummary,
}

impl TaskType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "detailed_report" | "detailed-report" => Some(TaskType::DetailedReport),
            "quick_summary" | "quick-summary" => Some(TaskType::QuickSummary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// `/chat/completions` with SSE streaming
    OpenAiCompatible,
    Gemini,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRoute {
    pub backend: BackendKind,
    pub endpoint: String,
    pub model: String,
    /// Name of the secret holding the API key
    pub credential_env: String,
}

const SILICONFLOW_ENDPOINT: &str = "https://api.siliconflow.cn/v1";
const SILICONFLOW_CREDENTIAL: &str = "SILICONFLOW_API_KEY";

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_CREDENTIAL: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRoutes {
    detailed_report: ProviderRoute,
    quick_summary: ProviderRoute,
}

impl InferenceRoutes {
    pub fn new(detailed_report: ProviderRoute, quick_summary: ProviderRoute) -> Self {
        Self {
            detailed_report,
            quick_summary,
        }
    }

    pub fn resolve(&self, task: TaskType) -> &ProviderRoute {
        match task {
            TaskType::DetailedReport => &self.detailed_report,
            TaskType::QuickSummary => &self.quick_summary,
        }
    }

    /// Gemini `generateContent` for every task
    pub fn gemini() -> Self {
        let route = |model: &str| ProviderRoute {
            backend: BackendKind::Gemini,
            endpoint: GEMINI_ENDPOINT.to_string(),
            model: model.to_string(),
            credential_env: GEMINI_CREDENTIAL.to_string(),
        };
        Self::new(route("gemini-2.0-flash"), route("gemini-2.0-flash-lite"))
    }

    /// Same routes, every one pointed at `backend`
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.detailed_report.backend = backend;
        self.quick_summary.backend = backend;
        self
    }
}

impl Default for InferenceRoutes {
    fn default() -> Self {
        Self {
            detailed_report: ProviderRoute {
                backend: BackendKind::OpenAiCompatible,
                endpoint: SILICONFLOW_ENDPOINT.to_string(),
                model: "Pro/zai-org/GLM-4.7".to_string(),
                credential_env: SILICONFLOW_CREDENTIAL.to_string(),
            },
            quick_summary: ProviderRoute {
                backend: BackendKind::OpenAiCompatible,
                endpoint: SILICONFLOW_ENDPOINT.to_string(),
                model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
                credential_env: SILICONFLOW_CREDENTIAL.to_string(),
            },
        }
    }
}

/// Boundary through which credentials enter the process
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Reads secrets from the process environment
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Build the client a route points at. Never fails: a missing credential or
/// an unbuildable HTTP client becomes a client that answers with an error
/// payload.
pub fn build_client(route: &ProviderRoute, secrets: &dyn SecretResolver) -> Arc<dyn InferenceClient> {
    match route.backend {
        BackendKind::Mock => Arc::new(MockInferenceClient::new(format!("mock/{}", route.model))),
        BackendKind::OpenAiCompatible => with_credential(route, secrets, |key| {
            OpenAiCompatClient::new(&route.endpoint, &route.model, key)
                .map(|c| Arc::new(c) as Arc<dyn InferenceClient>)
        }),
        BackendKind::Gemini => with_credential(route, secrets, |key| {
            GeminiClient::new(&route.endpoint, &route.model, key)
                .map(|c| Arc::new(c) as Arc<dyn InferenceClient>)
        }),
    }
}

fn with_credential<F>(
    route: &ProviderRoute,
    secrets: &dyn SecretResolver,
    build: F,
) -> Arc<dyn InferenceClient>
where
    F: FnOnce(String) -> crate::Result<Arc<dyn InferenceClient>>,
{
    let Some(api_key) = secrets.resolve(&route.credential_env) else {
        warn!(
            model = %route.model,
            credential = %route.credential_env,
            "Inference credential not found"
        );
        return Arc::new(UnavailableClient::new(
            route.model.clone(),
            format!(
                "{} API Key not found. Please set {} environment variable.",
                ERROR_PREFIX, route.credential_env
            ),
        ));
    };

    match build(api_key) {
        Ok(client) => {
            info!(backend = ?route.backend, model = %route.model, "Inference client ready");
            client
        }
        Err(e) => Arc::new(UnavailableClient::new(
            route.model.clone(),
            format!("{} Could not initialize client: {}", ERROR_PREFIX, e),
        )),
    }
}

//
// ========== Fixed-answer clients ==========
//

/// Answers every request with the same error payload
pub struct UnavailableClient {
    name: String,
    message: String,
}

impl UnavailableClient {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl InferenceClient for UnavailableClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _prompt: &str, _system_instruction: Option<&str>) -> String {
        self.message.clone()
    }
}

const CANNED_NARRATIVE: &str = r#"
**PnL overview**
The account is in profit overall, driven mainly by the largest positions.

**Attribution**
- 0700.HK: quarterly results beat expectations and game licensing normalized, lifting the share price.
- BABA: restructuring news landed and sentiment recovered.

**Risk**
Technology names make up a large share of the portfolio; watch for a sector pullback.

**Suggested actions**
Keep holding; consider low-valuation dividend names to balance risk.
"#;

/// Mock provider for development & testing
/// Keeps the pipeline runnable without a model endpoint
pub struct MockInferenceClient {
    name: String,
    response: Option<String>,
}

impl MockInferenceClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: None,
        }
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            response: Some(response.into()),
        }
    }
}

impl Default for MockInferenceClient {
    fn default() -> Self {
        Self::new("mock")
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _prompt: &str, _system_instruction: Option<&str>) -> String {
        match &self.response {
            Some(text) => text.clone(),
            None => format!("(Mock response from {})\n{}", self.name, CANNED_NARRATIVE),
        }
    }
}
