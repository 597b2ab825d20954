#[cfg(test)]
mod tests;

use std::cell::OnceCell;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::{Embedder, TaskType, TextGenerator};
use crate::{Result, StudyError};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_GENERATIVE_MODEL: &str = "models/gemini-1.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";

/// Title attached to document embeddings, as the indexing task permits.
const EMBED_TITLE: &str = "Study Material";
const GENERATION_TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Retry behavior for rate-limited embedding calls: up to `max_attempts`
/// tries, waiting `backoff_base * attempt_number` between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_secs: 20,
        }
    }
}

impl RetryPolicy {
    /// Escalating wait after the given 1-based failed attempt.
    #[inline]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base_secs * u64::from(attempt))
    }
}

/// Outcome classification for a single HTTP request.
#[derive(Debug)]
enum RequestError {
    /// The service signalled "too many requests"; eligible for backoff.
    RateLimited(String),
    /// Anything else; the current unit of work is abandoned immediately.
    Other(anyhow::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: RequestContent,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    #[inline]
    pub fn supports(&self, method: &str) -> bool {
        self.supported_generation_methods.iter().any(|m| m == method)
    }
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Blocking client for the Gemini REST API, covering embedding, generation
/// and model discovery.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    pinned_generative: Option<String>,
    pinned_embedding: Option<String>,
    resolved_generative: OnceCell<String>,
    resolved_embedding: OnceCell<String>,
    agent: ureq::Agent,
    retry: RetryPolicy,
    sleep: Arc<dyn Fn(Duration) + Send + Sync>,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("pinned_generative", &self.pinned_generative)
            .field("pinned_embedding", &self.pinned_embedding)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            StudyError::Config(format!("{API_KEY_ENV} environment variable is not set"))
        })?;
        Self::new_with_key(config, api_key)
    }

    /// Build a client with an explicit API key instead of reading the
    /// environment.
    #[inline]
    pub fn new_with_key(config: &Config, api_key: String) -> Result<Self> {
        let base_url = config
            .gemini
            .endpoint_url()
            .context("Failed to parse Gemini endpoint from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.gemini.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            pinned_generative: config.gemini.generative_model.clone(),
            pinned_embedding: config.gemini.embedding_model.clone(),
            resolved_generative: OnceCell::new(),
            resolved_embedding: OnceCell::new(),
            agent,
            retry: config.retry.clone(),
            sleep: Arc::new(|duration| std::thread::sleep(duration)),
        })
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the backoff sleep. Tests substitute a recorder so retry
    /// timing is observable without waiting.
    #[inline]
    pub fn with_sleep_fn(mut self, sleep: Arc<dyn Fn(Duration) + Send + Sync>) -> Self {
        self.sleep = sleep;
        self
    }

    /// The generative model in use: the pinned one, otherwise discovered
    /// once per client from the model listing.
    #[inline]
    pub fn generative_model(&self) -> String {
        self.resolved_generative
            .get_or_init(|| {
                if let Some(model) = &self.pinned_generative {
                    return qualify_model_name(model);
                }
                match self.list_models() {
                    Ok(models) => pick_generative_model(&models)
                        .unwrap_or_else(|| DEFAULT_GENERATIVE_MODEL.to_string()),
                    Err(e) => {
                        warn!("Model discovery failed ({e}), using {DEFAULT_GENERATIVE_MODEL}");
                        DEFAULT_GENERATIVE_MODEL.to_string()
                    }
                }
            })
            .clone()
    }

    /// The embedding model in use, resolved like [`Self::generative_model`].
    #[inline]
    pub fn embedding_model(&self) -> String {
        self.resolved_embedding
            .get_or_init(|| {
                if let Some(model) = &self.pinned_embedding {
                    return qualify_model_name(model);
                }
                match self.list_models() {
                    Ok(models) => pick_embedding_model(&models)
                        .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                    Err(e) => {
                        warn!("Model discovery failed ({e}), using {DEFAULT_EMBEDDING_MODEL}");
                        DEFAULT_EMBEDDING_MODEL.to_string()
                    }
                }
            })
            .clone()
    }

    /// List the models the API offers.
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.api_url("models", &[("pageSize", "200")])?;

        debug!("Fetching available models");

        let response_text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| StudyError::Embedding(format!("model listing failed: {e}")))?;

        let models: ModelsResponse = serde_json::from_str(&response_text)
            .context("Failed to parse model listing response")?;

        debug!("Found {} models", models.models.len());
        Ok(models.models)
    }

    fn embed_content(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        let model = self.embedding_model();
        let url = self.model_url(&model, "embedContent")?;
        let request = embed_request(&model, text, task);
        let body =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self.request_with_backoff(|| self.post_json(&url, &body))?;
        let parsed: EmbedContentResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        debug!(
            "Embedded text ({} chars) into {} dimensions",
            text.chars().count(),
            parsed.embedding.values.len()
        );

        Ok(parsed.embedding.values)
    }

    fn generate_content(&self, prompt: &str) -> Result<String> {
        let model = self.generative_model();
        let url = self.model_url(&model, "generateContent")?;
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: GENERATION_TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };
        let body =
            serde_json::to_string(&request).context("Failed to serialize generation request")?;

        info!("Requesting generation from {model}");

        // Generation is a single shot: any failure abandons this request,
        // the session itself continues.
        let response_text = self.post_json(&url, &body).map_err(|e| match e {
            RequestError::RateLimited(detail) => {
                StudyError::Generation(format!("rate limited: {detail}"))
            }
            RequestError::Other(e) => StudyError::Generation(e.to_string()),
        })?;

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
            .context("Failed to parse generation response")?;

        let text: String = parsed
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(StudyError::Generation(
                "model returned no candidates".to_string(),
            ));
        }

        Ok(text)
    }

    /// Run a request, backing off and retrying on rate-limit signals up to
    /// the policy's attempt budget. Any other error aborts immediately.
    fn request_with_backoff<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, RequestError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(RequestError::RateLimited(detail)) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Rate limit, attempt {}/{}: waiting {:?}",
                        attempt, self.retry.max_attempts, delay
                    );
                    (self.sleep)(delay);

                    if attempt >= self.retry.max_attempts {
                        return Err(StudyError::Embedding(format!(
                            "rate limited after {attempt} attempts: {detail}"
                        )));
                    }
                }
                Err(RequestError::Other(e)) => {
                    return Err(StudyError::Embedding(e.to_string()));
                }
            }
        }
    }

    fn post_json(&self, url: &Url, body: &str) -> std::result::Result<String, RequestError> {
        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(classify_error)
    }

    fn model_url(&self, model: &str, verb: &str) -> Result<Url> {
        self.api_url(&format!("{model}:{verb}"), &[])
    }

    fn api_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("/v1beta/{path}"))
            .with_context(|| format!("Failed to build API URL for {path}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", &self.api_key);
            for (name, value) in params {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

impl Embedder for GeminiClient {
    #[inline]
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        self.embed_content(text, task)
    }
}

impl TextGenerator for GeminiClient {
    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_content(prompt)
    }
}

fn embed_request(model: &str, text: &str, task: TaskType) -> EmbedContentRequest {
    EmbedContentRequest {
        model: model.to_string(),
        content: RequestContent {
            parts: vec![Part {
                text: text.to_string(),
            }],
        },
        task_type: task.as_api_str(),
        title: (task == TaskType::RetrievalDocument).then_some(EMBED_TITLE),
    }
}

fn classify_error(error: ureq::Error) -> RequestError {
    match error {
        ureq::Error::StatusCode(429) => RequestError::RateLimited("HTTP 429".to_string()),
        ureq::Error::StatusCode(status) => RequestError::Other(anyhow!("HTTP {status}")),
        other => RequestError::Other(anyhow!("transport error: {other}")),
    }
}

/// Resolve a configured model name to the API's `models/...` form.
fn qualify_model_name(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Preference order for answering/generation, most reliable quota first.
fn pick_generative_model(models: &[ModelInfo]) -> Option<String> {
    let generative: Vec<&ModelInfo> = models
        .iter()
        .filter(|m| m.supports("generateContent"))
        .collect();

    let preference: [fn(&str) -> bool; 4] = [
        |name| name.contains("gemini-1.5-flash") && name.contains("001"),
        |name| name.contains("gemini-1.5-flash"),
        |name| name.contains("gemini-1.5-pro"),
        |name| name.contains("flash"),
    ];

    for matches in preference {
        if let Some(model) = generative.iter().find(|m| matches(&m.name)) {
            return Some(model.name.clone());
        }
    }

    generative.first().map(|m| m.name.clone())
}

/// First model that supports embedding.
fn pick_embedding_model(models: &[ModelInfo]) -> Option<String> {
    models
        .iter()
        .find(|m| m.supports("embedContent"))
        .map(|m| m.name.clone())
}
