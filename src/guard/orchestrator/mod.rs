//! Retry orchestration.
//!
//! Per request key: `Idle -> Triggered -> Attempting(n) -> Succeeded | Exhausted`.
//! The trigger is claimed atomically on the [`PendingStore`], so a key runs
//! at most one retry sequence no matter how many stages observe the failure.

pub mod policy;
mod sequential;
mod speculative;

use crate::config::Config;
use crate::error::ConfigError;
use crate::guard::history::{ConversationStore, splice_corrective_turns};
use crate::guard::recorder::{PendingStore, RequestContext, RequestKey};
use crate::guard::transformer::ResponseTransformer;
use crate::guard::validator::{ResponseInspector, RetryReason, Verdict};
use crate::llm::scrub::sanitize_api_error;
use crate::llm::traits::Provider;
use crate::llm::types::{Completion, CompletionRequest};
use policy::{BatchPolicy, RetryPolicy};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Zero-width space; transports drop byte-identical consecutive messages.
const INVISIBLE_SUFFIX: char = '\u{200b}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No snapshot for the key: whitelisted input, swept, or already finished.
    Untracked,
    ToolInvocation,
    /// Host-formatted error; the pre-delivery interceptor owns it.
    HostError,
    /// The model deliberately said nothing.
    Silent,
    /// Another stage already claimed the retry.
    Guarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// First response was fine.
    Accepted { visible: String },
    Recovered { visible: String, attempts: u32 },
    /// `None` clears the outbound message.
    Exhausted {
        visible: Option<String>,
        attempts: u32,
    },
    /// Leave the outbound message untouched.
    Skipped(SkipReason),
}

impl Outcome {
    /// Replacement text for the outbound message, if the outcome rewrites it.
    pub fn visible(&self) -> Option<&str> {
        match self {
            Self::Accepted { visible } | Self::Recovered { visible, .. } => Some(visible),
            Self::Exhausted { visible, .. } => visible.as_deref(),
            Self::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
    /// Discarded after another attempt in the same batch won.
    Cancelled,
}

/// One re-issued provider call, kept only for the run's trace.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub index: u32,
    pub delay_before: Duration,
    pub outcome: AttemptOutcome,
}

#[derive(Debug)]
pub(crate) enum AttemptResult {
    Accepted {
        thought: Option<String>,
        reply: String,
    },
    Failed(String),
    Terminal(String),
}

/// Where a strategy left the run.
#[derive(Debug)]
pub(crate) enum Phase {
    Accepted {
        attempt: u32,
        thought: Option<String>,
        reply: String,
    },
    Terminal {
        attempt: u32,
        reason: String,
    },
    Continue,
}

/// Everything one attempt needs, cheap to clone into batch tasks.
#[derive(Clone)]
pub(crate) struct Attempter {
    provider: Arc<dyn Provider>,
    inspector: Arc<ResponseInspector>,
    request: Arc<CompletionRequest>,
    key: RequestKey,
}

impl Attempter {
    /// Every attempt works on its own copy of the snapshot.
    pub(crate) async fn attempt(&self, index: u32) -> AttemptResult {
        let request = CompletionRequest::clone(&self.request);
        match self.provider.complete(&request).await {
            Err(error) => {
                let message = sanitize_api_error(&format!("{error:#}"));
                tracing::warn!(request_key = %self.key, attempt = index, error = %message, "retry attempt failed");
                AttemptResult::Failed(message)
            }
            Ok(completion) if completion.is_tool_invocation() => {
                tracing::warn!(request_key = %self.key, attempt = index, "retry returned a tool invocation");
                AttemptResult::Failed("tool invocation during retry".into())
            }
            Ok(completion) => match self.inspector.inspect(&completion.text) {
                Verdict::Accept { thought, reply } => AttemptResult::Accepted { thought, reply },
                Verdict::Retry { reason } => {
                    tracing::warn!(request_key = %self.key, attempt = index, %reason, "retry attempt rejected");
                    AttemptResult::Failed(reason.to_string())
                }
                Verdict::Terminal { reason } => {
                    tracing::warn!(request_key = %self.key, attempt = index, %reason, "retry attempt hit a terminal error");
                    AttemptResult::Terminal(reason.to_string())
                }
            },
        }
    }
}

pub struct RetryOrchestrator {
    provider: Arc<dyn Provider>,
    inspector: Arc<ResponseInspector>,
    store: Arc<PendingStore>,
    transformer: ResponseTransformer,
    history: Option<Arc<dyn ConversationStore>>,
    retry: RetryPolicy,
    batch: BatchPolicy,
    fallback_reply: Option<String>,
    silent_marker: String,
}

impl RetryOrchestrator {
    pub fn new(
        config: &Config,
        provider: Arc<dyn Provider>,
        store: Arc<PendingStore>,
        transformer: ResponseTransformer,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            provider,
            inspector: Arc::new(ResponseInspector::from_config(config)?),
            store,
            transformer,
            history: None,
            retry: RetryPolicy::from_config(&config.retry),
            batch: BatchPolicy::from_config(&config.concurrent),
            fallback_reply: config
                .retry
                .fallback_reply
                .clone()
                .filter(|reply| !reply.is_empty()),
            silent_marker: config.retry.silent_marker.clone(),
        })
    }

    pub fn with_history(mut self, history: Arc<dyn ConversationStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn inspector(&self) -> &ResponseInspector {
        &self.inspector
    }

    pub fn store(&self) -> &Arc<PendingStore> {
        &self.store
    }

    pub fn transformer(&self) -> &ResponseTransformer {
        &self.transformer
    }

    /// Post-response entry point.
    pub async fn handle_response(&self, ctx: &RequestContext, completion: &Completion) -> Outcome {
        let key = &ctx.key;
        if !self.store.contains(key) {
            return Outcome::Skipped(SkipReason::Untracked);
        }
        if completion.is_tool_invocation() {
            tracing::debug!(request_key = %key, "tool invocation passed through");
            return Outcome::Skipped(SkipReason::ToolInvocation);
        }
        if completion.is_host_error() {
            tracing::debug!(request_key = %key, "host error deferred to delivery stage");
            return Outcome::Skipped(SkipReason::HostError);
        }
        if !self.silent_marker.is_empty() && completion.text.contains(self.silent_marker.as_str()) {
            return Outcome::Skipped(SkipReason::Silent);
        }
        if self.store.is_guarded(key) {
            return Outcome::Skipped(SkipReason::Guarded);
        }

        let (reason, terminal) = match self.inspector.inspect(&completion.text) {
            Verdict::Accept { thought, reply } => {
                let visible = self
                    .transformer
                    .finalize(&ctx.session_id, thought.as_deref(), &reply)
                    .await;
                ctx.mark_finalized();
                self.store.remove(key);
                return Outcome::Accepted { visible };
            }
            Verdict::Retry { reason } => (reason, false),
            Verdict::Terminal { reason } => (reason, true),
        };

        if !self.store.try_claim(key) {
            return Outcome::Skipped(SkipReason::Guarded);
        }
        self.run_claimed(ctx, &reason, terminal).await
    }

    /// Pre-delivery entry point for error text that reached the outbound
    /// message without passing the post-response stage. `None` when there is
    /// nothing to do.
    pub async fn intercept_error(&self, ctx: &RequestContext, text: &str) -> Option<Outcome> {
        if !self.store.contains(&ctx.key) || self.store.is_guarded(&ctx.key) {
            return None;
        }
        let signature = self.inspector.signatures().detect(text)?;
        if !self.store.try_claim(&ctx.key) {
            return None;
        }
        tracing::warn!(request_key = %ctx.key, %signature, "error text intercepted before delivery");
        let terminal = signature.is_terminal();
        let reason = RetryReason::ErrorSignature { signature };
        Some(self.run_claimed(ctx, &reason, terminal).await)
    }

    async fn run_claimed(&self, ctx: &RequestContext, reason: &RetryReason, terminal: bool) -> Outcome {
        let key = &ctx.key;
        let Some(request) = self.store.snapshot(key) else {
            tracing::warn!(request_key = %key, "snapshot vanished before retry");
            return self.exhaust(key, 0);
        };
        if terminal {
            tracing::warn!(request_key = %key, %reason, "non-retryable failure, skipping retries");
            return self.exhaust(key, 0);
        }
        tracing::info!(
            request_key = %key,
            session = %ctx.session_id,
            %reason,
            max_attempts = self.retry.max_attempts,
            "retry triggered"
        );

        let attempter = Attempter {
            provider: Arc::clone(&self.provider),
            inspector: Arc::clone(&self.inspector),
            request: Arc::new(request),
            key: key.clone(),
        };
        let max = self.retry.max_attempts;
        let sequential_last = self.batch.sequential_budget(max);
        let mut trace = Vec::with_capacity(max as usize);

        let mut phase = sequential::run(&attempter, &self.retry, 1, sequential_last, &mut trace).await;
        if matches!(phase, Phase::Continue) && sequential_last < max {
            phase = speculative::run(&attempter, &self.batch, sequential_last + 1, max, &mut trace)
                .await;
        }
        tracing::debug!(request_key = %key, ?trace, "retry trace");

        match phase {
            Phase::Accepted {
                attempt,
                thought,
                reply,
            } => {
                let visible = self
                    .transformer
                    .finalize(&ctx.session_id, thought.as_deref(), &reply)
                    .await;
                ctx.mark_finalized();
                self.splice_history(ctx, &attempter.request, &reply).await;
                self.store.remove(key);
                tracing::info!(request_key = %key, attempts = attempt, "recovered after retries");
                Outcome::Recovered {
                    visible,
                    attempts: attempt,
                }
            }
            Phase::Terminal { attempt, reason } => {
                tracing::warn!(request_key = %key, attempt, %reason, "retry stopped on terminal error");
                self.exhaust(key, attempt)
            }
            Phase::Continue => self.exhaust(key, max),
        }
    }

    fn exhaust(&self, key: &RequestKey, attempts: u32) -> Outcome {
        self.store.remove(key);
        let visible = self.fallback();
        tracing::warn!(
            request_key = %key,
            attempts,
            fallback = visible.is_some(),
            "retries exhausted"
        );
        Outcome::Exhausted { visible, attempts }
    }

    /// Fallback text with 1-3 zero-width spaces appended, or `None`.
    pub fn fallback(&self) -> Option<String> {
        self.fallback_reply.as_ref().map(|reply| {
            let count = rand::rng().random_range(1..=3);
            let mut text = reply.clone();
            text.extend(std::iter::repeat_n(INVISIBLE_SUFFIX, count));
            text
        })
    }

    async fn splice_history(&self, ctx: &RequestContext, request: &CompletionRequest, reply: &str) {
        let (Some(history), Some(conversation_id)) =
            (self.history.as_deref(), request.conversation_id.as_deref())
        else {
            return;
        };
        let reply = self.transformer.filter_reply(reply);
        if let Err(error) = splice_corrective_turns(
            history,
            &ctx.session_id,
            conversation_id,
            &request.prompt,
            &reply,
        )
        .await
        {
            tracing::warn!(request_key = %ctx.key, %error, "failed to splice corrective history");
        }
    }
}
