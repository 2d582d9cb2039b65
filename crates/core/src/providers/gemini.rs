//! Google Generative Language API client for embeddings and chat completion.

use crate::embeddings::Embedder;
use crate::error::ServiceError;
use crate::generation::ChatModel;
use crate::models::PipelineConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::time::Duration;
use tracing::debug;
use url::Url;

const SERVICE: &str = "gemini";
const API_VERSION: &str = "v1beta";
const MAX_EMBED_BATCH: usize = 100;
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    embedding_model: String,
    chat_model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_base", &self.api_base)
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// The key is only checked when a request is made, so a session can be
    /// set up before the user has entered one.
    pub fn new(api_key: impl Into<String>, config: &PipelineConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into().trim().to_string(),
            api_base: config.api_base.clone(),
            embedding_model: model_path(&config.embedding_model),
            chat_model: model_path(&config.chat_model),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url, ServiceError> {
        let mut base = self.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Url::parse(&base)?.join(&format!("{API_VERSION}/{model}:{method}"))?)
    }

    fn require_key(&self, purpose: &str) -> Result<&str, ServiceError> {
        if self.api_key.is_empty() {
            return Err(ServiceError::MissingApiKey(purpose.to_string()));
        }
        Ok(&self.api_key)
    }

    async fn post<B, R>(&self, url: Url, key: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|error| malformed(format!("could not decode response: {error}")))
    }

    async fn embed_chunk_batch(
        &self,
        key: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest::new(&self.embedding_model, text, TaskType::RetrievalDocument))
                .collect(),
        };

        let url = self.endpoint(&self.embedding_model, "batchEmbedContents")?;
        let response: BatchEmbedResponse = self.post(url, key, &request).await?;
        batch_vectors(response, texts.len())
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn malformed(details: String) -> ServiceError {
    ServiceError::MalformedResponse {
        service: SERVICE.to_string(),
        details,
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: Option<TaskType>,
}

impl<'a> EmbedRequest<'a> {
    fn new(model: &'a str, text: &'a str, task_type: TaskType) -> Self {
        Self {
            model,
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type: Some(task_type),
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn batch_vectors(response: BatchEmbedResponse, expected: usize) -> Result<Vec<Vec<f32>>, ServiceError> {
    if response.embeddings.len() != expected {
        return Err(malformed(format!(
            "asked for {expected} embeddings, got {}",
            response.embeddings.len()
        )));
    }

    response
        .embeddings
        .into_iter()
        .map(|embedding| {
            if embedding.values.is_empty() {
                Err(malformed("embedding had no values".to_string()))
            } else {
                Ok(embedding.values)
            }
        })
        .collect()
}

fn answer_text(response: GenerateResponse) -> Result<String, ServiceError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(malformed(format!("prompt was blocked: {reason}")));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| malformed("no candidates in response".to_string()))?;

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(malformed(format!(
            "candidate had no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let key = self.require_key("embedding")?;
        let url = self.endpoint(&self.embedding_model, "embedContent")?;
        let request = EmbedRequest::new(&self.embedding_model, text, TaskType::RetrievalQuery);

        let response: EmbedResponse = self.post(url, key, &request).await?;
        response
            .embedding
            .map(|embedding| embedding.values)
            .filter(|values| !values.is_empty())
            .ok_or_else(|| malformed("embedding had no values".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let key = self.require_key("embedding")?;

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_EMBED_BATCH) {
            debug!(model = %self.embedding_model, batch = batch.len(), "embedding chunks");
            vectors.extend(self.embed_chunk_batch(key, batch).await?);
        }
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.embedding_model
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, ServiceError> {
        let key = self.require_key("chat completion")?;
        let url = self.endpoint(&self.chat_model, "generateContent")?;
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: Some(temperature),
            },
        };

        let response: GenerateResponse = self.post(url, key, &request).await?;
        answer_text(response)
    }

    fn model(&self) -> &str {
        &self.chat_model
    }
}
