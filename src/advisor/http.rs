//! HTTP boundary advisor implementation
//!
//! Implements `BoundaryAdvisor` over any OpenAI-compatible
//! `/v1/chat/completions` endpoint (Ollama, OpenAI, LiteLLM, vLLM, ...).
//! The model is asked for a JSON object; token usage is taken from the
//! response's `usage` block or estimated when the endpoint omits it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::{
    BoundaryAdvisor, Classification, ClusterSummary, EntityDescription, EntityProfile, TokenCounts,
};
use crate::accounting::estimate_tokens;
use crate::AdvisorConfig;

const SYSTEM_PROMPT: &str = "You are a software architect decomposing a monolith into \
microservices using domain-driven design. Answer with a single JSON object only.";

/// HTTP-based advisor using the OpenAI chat completions API format.
///
/// Cheaply cloneable (shares the reqwest client internally).
#[derive(Clone)]
pub struct HttpBoundaryAdvisor {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// OpenAI-compatible error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ClassifyAnswer {
    name: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct DescribeAnswer {
    description: String,
}

impl HttpBoundaryAdvisor {
    /// Create an advisor with explicit configuration.
    ///
    /// * `url` - full chat completions endpoint
    /// * `model` - model name sent with every request
    /// * `api_key` - optional bearer token
    /// * `timeout` - per-request HTTP timeout
    pub fn new(url: String, model: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            url,
            model,
            api_key,
        }
    }

    /// Build from the `advisor` config section.
    ///
    /// Returns `None` if the URL is empty or "disabled".
    pub fn from_config(config: &AdvisorConfig) -> Option<Self> {
        if !config.is_enabled() {
            return None;
        }
        Some(Self::new(
            config.url.clone(),
            config.model.clone(),
            config.api_key.clone().filter(|k| !k.is_empty()),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    /// Send one prompt and return `(content, usage)`.
    async fn complete(&self, prompt: &str) -> Result<(String, TokenCounts)> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                r#type: "json_object",
            },
            temperature: 0.0,
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to connect to advisor API at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                if let Some(detail) = err.error {
                    anyhow::bail!("Advisor API error ({}): {}", status.as_u16(), detail.message);
                }
            }
            anyhow::bail!("Advisor API returned {}: {}", status.as_u16(), body);
        }

        let resp: ChatResponse = response
            .json()
            .await
            .context("Failed to parse advisor API response")?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Advisor API returned no choices")?;

        let usage = match resp.usage {
            Some(u) => TokenCounts::new(u.prompt_tokens, u.completion_tokens),
            None => TokenCounts::new(
                estimate_tokens(SYSTEM_PROMPT) + estimate_tokens(prompt),
                estimate_tokens(&content),
            ),
        };

        Ok((content, usage))
    }
}

fn classify_prompt(cluster: &ClusterSummary) -> String {
    let mut prompt = String::from(
        "The following entities were grouped by coupling strength into one candidate service.\n",
    );
    for (i, name) in cluster.entity_names.iter().enumerate() {
        match cluster.descriptions.get(i).filter(|d| !d.is_empty()) {
            Some(desc) => prompt.push_str(&format!("- {}: {}\n", name, desc)),
            None => prompt.push_str(&format!("- {}\n", name)),
        }
    }
    prompt.push_str(&format!(
        "Internal coupling weight: {}. External coupling weight: {}.\n",
        cluster.internal_weight, cluster.external_weight
    ));
    prompt.push_str(
        "Is this a cohesive bounded context? Reply as \
         {\"name\": \"<PascalCase service name>\", \"confidence\": <0.0-1.0>}",
    );
    prompt
}

fn describe_prompt(entity: &EntityProfile) -> String {
    let mut prompt = format!("Entity `{}`", entity.name);
    if let Some(ref path) = entity.source_path {
        prompt.push_str(&format!(" (declared in {})", path));
    }
    prompt.push_str(".\nAttributes:\n");
    for attr in &entity.attributes {
        prompt.push_str(&format!("- {}\n", attr));
    }
    if !entity.related.is_empty() {
        prompt.push_str(&format!("Related entities: {}\n", entity.related.join(", ")));
    }
    prompt.push_str(
        "Describe its business responsibility in one sentence. \
         Reply as {\"description\": \"...\"}",
    );
    prompt
}

#[async_trait]
impl BoundaryAdvisor for HttpBoundaryAdvisor {
    async fn classify(&self, cluster: &ClusterSummary) -> Result<Classification> {
        let (content, usage) = self.complete(&classify_prompt(cluster)).await?;
        let answer: ClassifyAnswer = serde_json::from_str(content.trim())
            .with_context(|| format!("Advisor returned malformed classification: {}", content))?;
        if answer.name.trim().is_empty() {
            anyhow::bail!("Advisor returned an empty service name");
        }
        Ok(Classification {
            suggested_name: answer.name.trim().to_string(),
            confidence: answer.confidence.clamp(0.0, 1.0),
            usage,
        })
    }

    async fn describe(&self, entity: &EntityProfile) -> Result<EntityDescription> {
        let (content, usage) = self.complete(&describe_prompt(entity)).await?;
        // Some local models ignore response_format; keep plain text answers.
        let description = serde_json::from_str::<DescribeAnswer>(content.trim())
            .map(|a| a.description)
            .unwrap_or_else(|_| content.trim().to_string());
        Ok(EntityDescription { description, usage })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
