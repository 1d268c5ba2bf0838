//! Generic OpenAI-compatible provider.
//! Speaks `POST {base}/chat/completions`, which most hosted LLM APIs accept.

use super::scrub::api_error;
use super::traits::{Provider, ProviderCapabilities};
use super::types::{Completion, CompletionRequest, FinishReason, MessageRole};
use crate::error::ProviderError;
use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    default_model: String,
    /// Pre-computed chat completions URL (avoids `format!` per request).
    cached_chat_url: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: Option<&str>) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(120))
    }

    pub fn with_timeout(
        name: &str,
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let cached_chat_url = if base_url.contains("chat/completions") {
            base_url.clone()
        } else {
            format!("{base_url}/chat/completions")
        };
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|error| {
                tracing::warn!(%error, "failed to build tuned HTTP client, using defaults");
                Client::new()
            });

        Self {
            name: name.to_string(),
            base_url,
            api_key: api_key.map(ToString::to_string),
            default_model: DEFAULT_MODEL.to_string(),
            cached_chat_url,
            client,
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    fn chat_completions_url(&self) -> &str {
        &self.cached_chat_url
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.contexts.len() + 2);
        if let Some(system) = request.system_prompt.as_deref()
            && !system.is_empty()
        {
            messages.push(Message {
                role: MessageRole::System.as_str(),
                content: MessageContent::Text(system),
            });
        }
        for turn in &request.contexts {
            messages.push(Message {
                role: turn.role.as_str(),
                content: MessageContent::Text(&turn.content),
            });
        }

        let prompt_content = if request.image_refs.is_empty() {
            MessageContent::Text(&request.prompt)
        } else {
            let mut parts = vec![ContentPart::Text {
                text: &request.prompt,
            }];
            parts.extend(request.image_refs.iter().map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            }));
            MessageContent::Parts(parts)
        };
        messages.push(Message {
            role: MessageRole::User.as_str(),
            content: prompt_content,
        });

        ChatRequest {
            model: request
                .params
                .model
                .as_deref()
                .unwrap_or(&self.default_model),
            messages,
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            tools: request.tool_spec.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<serde_json::Value>,
}

impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            tool_calling: true,
            vision: true,
        }
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Completion>> + Send + 'a>> {
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| ProviderError::NotConfigured {
                    provider: self.name.clone(),
                    message: "API key not set. Set COGITO_API_KEY or [provider].api_key.".into(),
                })?;

            let body = self.build_request(request);
            let response = self
                .client
                .post(self.chat_completions_url())
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("{} request failed", self.name))?;

            if !response.status().is_success() {
                return Err(api_error(&self.name, response).await);
            }

            let chat: ChatResponse = response
                .json()
                .await
                .with_context(|| format!("{} returned an unreadable body", self.name))?;

            let Some(choice) = chat.choices.into_iter().next() else {
                anyhow::bail!("{} returned no choices", self.name);
            };

            let mut finish_reason = choice.finish_reason.as_deref().map(FinishReason::from_wire);
            if choice.message.tool_calls.is_some() && finish_reason.is_none() {
                finish_reason = Some(FinishReason::ToolCalls);
            }

            Ok(Completion {
                text: choice.message.content.unwrap_or_default(),
                finish_reason,
                raw_metadata: serde_json::json!({
                    "model": chat.model,
                    "usage": chat.usage,
                    "tool_calls": choice.message.tool_calls,
                }),
            })
        })
    }

    fn warmup(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            // Any response (even 404) proves the TLS session is established.
            let _ = self.client.get(&self.base_url).send().await?;
            Ok(())
        })
    }
}
