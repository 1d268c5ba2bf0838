use super::parser::{LogCommand, parse_command};
use crate::config::{Config, SummaryConfig};
use crate::error::{CogitoError, CommandError, ProviderError};
use crate::llm::scrub::sanitize_api_error;
use crate::llm::traits::Provider;
use crate::llm::types::CompletionRequest;
use crate::thoughts::hot::HotEntry;
use crate::thoughts::{HybridLogStore, NO_THOUGHT};
use std::sync::Arc;
use std::time::Duration;

/// Fetch and summarize entries of a session's hot log.
pub struct LogCommands {
    store: Arc<HybridLogStore>,
    provider: Arc<dyn Provider>,
    summary: SummaryConfig,
    no_thought_notice: String,
}

impl LogCommands {
    pub fn new(store: Arc<HybridLogStore>, provider: Arc<dyn Provider>, config: &Config) -> Self {
        Self {
            store,
            provider,
            summary: config.summary.clone(),
            no_thought_notice: config.thought_log.no_thought_notice.clone(),
        }
    }

    /// Entry `index` places back, with the no-thought sentinel replaced by
    /// the configured notice.
    pub async fn fetch(&self, session_id: &str, index: usize) -> Result<HotEntry, CogitoError> {
        let mut entry = self
            .store
            .read(session_id, index)
            .await?
            .ok_or(CommandError::NotFound { index })?;
        if entry.content == NO_THOUGHT {
            entry.content.clone_from(&self.no_thought_notice);
        }
        Ok(entry)
    }

    pub async fn summarize(&self, session_id: &str, index: usize) -> Result<String, CogitoError> {
        let entry = self
            .store
            .read(session_id, index)
            .await?
            .ok_or(CommandError::NotFound { index })?;
        if entry.content == NO_THOUGHT {
            return Ok(self.no_thought_notice.clone());
        }

        let request =
            CompletionRequest::prompt_only(self.summary.prompt_template.replace("{log}", &entry.content));
        let per_call = Duration::from_secs(self.summary.timeout_secs);
        let attempts = self.summary.max_retries;

        for attempt in 1..=attempts {
            match tokio::time::timeout(per_call, self.provider.complete(&request)).await {
                Ok(Ok(completion)) if !completion.text.trim().is_empty() => {
                    return Ok(completion.text.trim().to_string());
                }
                Ok(Ok(_)) => {
                    tracing::warn!(session = %session_id, attempt, "summary came back blank");
                }
                Ok(Err(error)) => {
                    let message = sanitize_api_error(&format!("{error:#}"));
                    tracing::warn!(session = %session_id, attempt, error = %message, "summary call failed");
                }
                Err(_) => {
                    let error = ProviderError::Timeout {
                        provider: self.provider.name().to_string(),
                        timeout_secs: per_call.as_secs(),
                    };
                    tracing::warn!(session = %session_id, attempt, %error, "summary call timed out");
                }
            }
        }
        Err(CommandError::SummaryFailed { attempts }.into())
    }

    /// Run `input` if it is a log command and render the answer for the
    /// user. `None` means the input is not ours.
    pub async fn handle(&self, session_id: &str, input: &str) -> Option<String> {
        let command = parse_command(input)?;
        let result = match command {
            LogCommand::Fetch { index } => self
                .fetch(session_id, index)
                .await
                .map(|entry| format!("[{}]\n{}", entry.time, entry.content)),
            LogCommand::Summarize { index } => self.summarize(session_id, index).await,
        };
        Some(result.unwrap_or_else(|error| {
            tracing::debug!(session = %session_id, index = command.index(), %error, "log command failed");
            match error {
                CogitoError::Command(inner) => inner.to_string(),
                other => format!("Could not read the reasoning log: {other}"),
            }
        }))
    }
}
