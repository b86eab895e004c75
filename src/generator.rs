//! Content generation strategies: template and external
//!
//! The strategy is selected once at engine construction. Template mode is
//! the guaranteed fallback: pure, deterministic, no external dependencies.
//! External mode delegates to an OpenAI-compatible chat completions
//! endpoint and fails with a `GenerationError` the dispatcher downgrades
//! to the template for that recipient.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::{CampaignConfig, GeneratorConfig};
use crate::error::{CampaignError, Result};
use crate::models::{GeneratedContent, Recipient};

/// Placeholder the generators leave in the body; the dispatcher substitutes
/// the configured sender name after generation.
pub const FROM_NAME_PLACEHOLDER: &str = "{FROM_NAME}";

/// Replace the sender-name placeholder in a generated body
pub fn fill_sender_name(body: &str, sender_name: &str) -> String {
    body.replace(FROM_NAME_PLACEHOLDER, sender_name)
}

/// Produces subject and body for one recipient
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        recipient: &Recipient,
        campaign: &CampaignConfig,
    ) -> Result<GeneratedContent>;
}

/// Deterministic template strategy. Never fails: empty fields are replaced
/// with neutral defaults.
#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    /// Pure render, usable synchronously as the fallback path
    pub fn render(recipient: &Recipient, campaign: &CampaignConfig) -> GeneratedContent {
        let company = non_empty(&recipient.company, "your company");
        let service = non_empty(&campaign.service_name, "our service");
        let notes = non_empty(&recipient.notes, "possible room for optimization");

        let subject = format!("{} x {}?", company, service);

        let greeting = if recipient.contact_name.trim().is_empty() {
            "Hi,".to_string()
        } else {
            format!("Hi {},", recipient.contact_name.trim())
        };

        let body = format!(
            "{greeting}\n\n\
             I work on {service_lower} for small businesses. {value_prop}\n\n\
             For {company} I noticed: {notes}. \
             Would it be interesting to talk this over briefly? {cta}\n\n\
             Best,\n\
             {placeholder}",
            greeting = greeting,
            service_lower = service.to_lowercase(),
            value_prop = campaign.value_prop.trim(),
            company = company,
            notes = notes,
            cta = campaign.cta.trim(),
            placeholder = FROM_NAME_PLACEHOLDER,
        );

        GeneratedContent { subject, body }
    }
}

fn non_empty<'a>(value: &'a str, default: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(
        &self,
        recipient: &Recipient,
        campaign: &CampaignConfig,
    ) -> Result<GeneratedContent> {
        Ok(Self::render(recipient, campaign))
    }
}

/// Chat completions request format (OpenAI-compatible)
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat completions response format
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// The JSON payload the model is asked to return
#[derive(Debug, Deserialize)]
struct GeneratedPayload {
    subject: Option<String>,
    body: Option<String>,
}

/// External strategy over an OpenAI-compatible chat completions endpoint
///
/// Works with api.openai.com and any compatible endpoint via `base_url`.
/// One network call per recipient. Any provider error, timeout or
/// unparseable reply surfaces as `GenerationError`.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                CampaignError::GenerationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    fn build_request(&self, recipient: &Recipient, campaign: &CampaignConfig) -> ChatRequest {
        let system = "You are a sales copywriter. Write short, polite cold emails \
                      (at most 120 words) with a clear value proposition and one \
                      concrete question. Use plain language and no buzzwords."
            .to_string();

        let user = format!(
            "Goal: cold email for the service '{}'.\n\
             Value proposition: {}.\n\
             Call to action: {}.\n\
             Prospect: company='{}', contact='{}', notes='{}'.\n\
             Return JSON with fields subject and body. Use {} as a placeholder \
             for the sender name.",
            campaign.service_name,
            campaign.value_prop,
            campaign.cta,
            recipient.company,
            recipient.contact_name,
            recipient.notes,
            FROM_NAME_PLACEHOLDER,
        );

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.7,
        }
    }

    /// Parse the model reply, tolerating Markdown code fences around the JSON
    fn parse_payload(
        content: &str,
        recipient: &Recipient,
        campaign: &CampaignConfig,
    ) -> Result<GeneratedContent> {
        let stripped = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let payload: GeneratedPayload = serde_json::from_str(stripped).map_err(|e| {
            CampaignError::GenerationError(format!("Unparseable generator reply: {}", e))
        })?;

        let body = match payload.body {
            Some(body) if !body.trim().is_empty() => body,
            _ => {
                return Err(CampaignError::GenerationError(
                    "Generator reply has no body".to_string(),
                ))
            }
        };

        // A missing subject is recoverable: the template subject pattern
        // still fits the generated body
        let subject = payload
            .subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| TemplateGenerator::render(recipient, campaign).subject);

        Ok(GeneratedContent { subject, body })
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        recipient: &Recipient,
        campaign: &CampaignConfig,
    ) -> Result<GeneratedContent> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(recipient, campaign);

        debug!("Requesting generated content for {}", recipient.email);
        let response = self
            .client
            .post(&url)
            .headers(self.build_headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                CampaignError::GenerationError(format!("Generator request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(CampaignError::GenerationError(format!(
                "Generator returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            CampaignError::GenerationError(format!("Invalid generator response: {}", e))
        })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                CampaignError::GenerationError("Generator response has no choices".to_string())
            })?;

        Self::parse_payload(&content, recipient, campaign)
    }
}
