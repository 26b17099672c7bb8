//! OpenAI-compatible chat gateway for Optisynth collaborators.
//!
//! [`ChatGateway`] implements [`Collaborator`] by sending each prompt to
//! `POST {base_url}/chat/completions` with the role's system prompt and
//! temperature from [`GatewayConfig`]. Transport failures surface as
//! [`CollaboratorError::Unreachable`]; the orchestrator turns those into a
//! failed round.

pub mod error;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use optisynth_core::{Collaborator, CollaboratorError, CollaboratorRole, GatewayConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use error::{GatewayError, Result};

/// Longest error body kept in a [`GatewayError::Status`].
const MAX_ERROR_BODY: usize = 2000;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// HTTP collaborator backed by a chat completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatGateway {
    http: reqwest::Client,
    config: GatewayConfig,
    api_key: Option<String>,
}

impl ChatGateway {
    /// Build a gateway; the bearer token is read from `config.api_key_env`
    /// when that variable is set. Local endpoints may run without one.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            debug!(env = %config.api_key_env, "no api key configured; sending unauthenticated requests");
        }
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    /// Override the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Send one prompt for `role` and return the first choice's text.
    pub async fn complete(&self, role: CollaboratorRole, prompt: &str) -> Result<String> {
        let profile = self.config.profile(role);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &profile.system_prompt,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: profile.temperature,
        };

        let start = Instant::now();
        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(%role, status = status.as_u16(), "chat completion rejected");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)?;
        let choice = parsed.choices.into_iter().next().ok_or(GatewayError::NoChoices)?;
        let (tokens_in, tokens_out) = parsed
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));
        debug!(
            %role,
            model = %self.config.model,
            tokens_in,
            tokens_out,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "chat completion received"
        );
        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl Collaborator for ChatGateway {
    async fn call(&self, role: CollaboratorRole, prompt: &str) -> std::result::Result<String, CollaboratorError> {
        let text = self
            .complete(role, prompt)
            .await
            .map_err(|e| CollaboratorError::Unreachable {
                role,
                reason: e.to_string(),
            })?;
        if text.trim().is_empty() {
            return Err(CollaboratorError::EmptyReply { role });
        }
        Ok(text)
    }
}
