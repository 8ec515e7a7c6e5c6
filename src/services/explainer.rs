use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::core::explain::{fallback_explanation, summarize_brief, summarize_venue};
use crate::models::{EventBrief, ExplanationSource, RankedVenue, ScoreBreakdown};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_EXPLANATION_CHARS: usize = 1200;

/// Errors that can occur when asking the backend for an explanation
#[derive(Debug, Error)]
pub enum ExplainerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend response contained no text")]
    EmptyResponse,

    #[error("Explanation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid explainer configuration: {0}")]
    Config(String),
}

/// Everything the backend is told about one ranked venue
#[derive(Debug, Clone)]
pub struct ExplanationRequest {
    pub venue_name: String,
    pub brief_summary: Arc<str>,
    pub venue_summary: String,
    pub breakdown: ScoreBreakdown,
    pub score: f64,
}

/// Text-generation collaborator
#[async_trait]
pub trait ExplanationBackend: Send + Sync {
    async fn explain(&self, request: &ExplanationRequest) -> Result<String, ExplainerError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client
#[derive(Clone)]
pub struct HttpExplanationBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl HttpExplanationBackend {
    pub fn new(
        api_base: &str,
        api_key: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
        request_timeout: Duration,
    ) -> Result<Self, ExplainerError> {
        if api_key.trim().is_empty() {
            return Err(ExplainerError::Config("API key cannot be empty".to_string()));
        }

        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", api_base.trim_end_matches('/')),
            api_key,
            model,
            max_tokens,
            temperature,
        })
    }
}

#[async_trait]
impl ExplanationBackend for HttpExplanationBackend {
    async fn explain(&self, request: &ExplanationRequest) -> Result<String, ExplainerError> {
        let prompt = build_prompt(request);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExplainerError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or(ExplainerError::EmptyResponse)
    }
}

/// Prompt asking for a short bullet-point rationale grounded in the given facts
pub fn build_prompt(request: &ExplanationRequest) -> String {
    let b = &request.breakdown;
    format!(
        "You are a venue matching expert. Explain in 3-5 concise bullet points why this venue \
         was ranked for this event.\n\n\
         EVENT:\n{brief}\n\n\
         VENUE:\n{venue}\n\n\
         MATCH SCORE: {score:.1}/100\n\
         - Capacity fit: {capacity:.1}/100\n\
         - Price fit: {price:.1}/100\n\
         - Location fit: {location:.1}/100\n\
         - Amenity fit: {amenity:.1}/100\n\n\
         Lead with the strongest factors. If a factor scored low, say so plainly. \
         Only state facts listed above. Use markdown bullets, one sentence each, no heading.",
        brief = request.brief_summary,
        venue = request.venue_summary,
        score = request.score,
        capacity = b.capacity,
        price = b.price,
        location = b.location,
        amenity = b.amenity,
    )
}

/// Bounds on the explanation phase
#[derive(Debug, Clone, Copy)]
pub struct ExplainerLimits {
    pub call_timeout: Duration,
    pub phase_timeout: Duration,
    pub concurrency: usize,
    pub max_chars: usize,
}

impl Default for ExplainerLimits {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(8),
            phase_timeout: Duration::from_secs(20),
            concurrency: 4,
            max_chars: DEFAULT_MAX_EXPLANATION_CHARS,
        }
    }
}

/// Explanation attached to a ranked venue
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub text: String,
    pub source: ExplanationSource,
}

/// Runs the explanation phase for a ranked list
///
/// Every venue starts with its templated fallback; generated text replaces it
/// only when the backend answers in time with something non-blank. Output is
/// index-aligned with the input, so completion order never affects rank.
pub struct Explainer {
    backend: Option<Arc<dyn ExplanationBackend>>,
    limits: ExplainerLimits,
}

impl Explainer {
    pub fn new(backend: Arc<dyn ExplanationBackend>, limits: ExplainerLimits) -> Self {
        Self {
            backend: Some(backend),
            limits,
        }
    }

    pub fn fallback_only(limits: ExplainerLimits) -> Self {
        Self {
            backend: None,
            limits,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn explain_all(&self, brief: &EventBrief, ranked: &[RankedVenue]) -> Vec<Explanation> {
        let mut explanations: Vec<Explanation> = ranked
            .iter()
            .map(|r| Explanation {
                text: fallback_explanation(&r.venue, brief, &r.breakdown),
                source: ExplanationSource::Fallback,
            })
            .collect();

        let Some(backend) = &self.backend else {
            return explanations;
        };
        if ranked.is_empty() {
            return explanations;
        }

        let brief_summary: Arc<str> = summarize_brief(brief).into();
        let semaphore = Arc::new(Semaphore::new(self.limits.concurrency.max(1)));
        let call_timeout = self.limits.call_timeout;
        let mut tasks = JoinSet::new();

        for (index, r) in ranked.iter().enumerate() {
            let request = ExplanationRequest {
                venue_name: r.venue.name.clone(),
                brief_summary: Arc::clone(&brief_summary),
                venue_summary: summarize_venue(&r.venue),
                breakdown: r.breakdown,
                score: r.score,
            };
            let backend = Arc::clone(backend);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = match tokio::time::timeout(call_timeout, backend.explain(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ExplainerError::Timeout(call_timeout)),
                };
                (index, request.venue_name, result)
            });
        }

        let deadline = Instant::now() + self.limits.phase_timeout;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, venue_name, Ok(text))))) => {
                    match clean_explanation(&text, self.limits.max_chars) {
                        Some(text) => {
                            explanations[index] = Explanation {
                                text,
                                source: ExplanationSource::Generated,
                            };
                        }
                        None => tracing::debug!("Blank explanation for {}, using fallback", venue_name),
                    }
                }
                Ok(Some(Ok((_, venue_name, Err(e))))) => {
                    tracing::warn!("Explanation failed for {}, using fallback: {}", venue_name, e);
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!("Explanation task failed: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Explanation phase hit its {:?} deadline with {} calls outstanding",
                        self.limits.phase_timeout,
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        explanations
    }
}

/// Trim and cap generated text; `None` when nothing usable remains
pub fn clean_explanation(text: &str, max_chars: usize) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().count() <= max_chars {
        return Some(trimmed.to_string());
    }

    let capped: String = trimmed.chars().take(max_chars).collect();
    Some(capped.trim_end().to_string())
}
