//! The reliability layer as a host sees it: one object that installs the
//! recorder, the retry orchestrator and the delivery-stage interceptors on
//! an [`InterceptorChain`] and owns the pending-request sweeper.

use super::chain::InterceptorChain;
use super::dispatch::{CommandDispatcher, CommandSink};
use super::hooks::{OutboundMessage, PostResponseHook, PreDeliveryHook, PreRequestHook};
use crate::config::Config;
use crate::error::ConfigError;
use crate::guard::history::ConversationStore;
use crate::guard::orchestrator::{Outcome, RetryOrchestrator};
use crate::guard::recorder::{PendingStore, RequestContext, RequestRecorder, spawn_sweeper};
use crate::guard::transformer::ResponseTransformer;
use crate::guard::validator::ValidationResult;
use crate::llm::traits::Provider;
use crate::llm::types::{Completion, CompletionRequest};
use crate::thoughts::HybridLogStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const API_ERROR_PRIORITY: i32 = 20;
pub const FINAL_STRIP_PRIORITY: i32 = 5;
pub const NEWLINE_COLLAPSE_PRIORITY: i32 = -999;

fn apply_outcome(outcome: &Outcome, text: &mut String) {
    match outcome {
        Outcome::Skipped(_) => {}
        _ => match outcome.visible() {
            Some(visible) => *text = visible.to_string(),
            None => text.clear(),
        },
    }
}

// ── Hooks ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct RecordRequest {
    recorder: RequestRecorder,
}

impl PreRequestHook for RecordRequest {
    fn name(&self) -> &str {
        "record_request"
    }

    fn on_request<'a>(
        &'a self,
        ctx: &'a RequestContext,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.recorder.record(ctx, request);
        })
    }
}

struct RetryOnResponse {
    orchestrator: Arc<RetryOrchestrator>,
}

impl std::fmt::Debug for RetryOnResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOnResponse").finish_non_exhaustive()
    }
}

impl PostResponseHook for RetryOnResponse {
    fn name(&self) -> &str {
        "retry_on_response"
    }

    fn on_response<'a>(
        &'a self,
        ctx: &'a RequestContext,
        completion: &'a mut Completion,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let outcome = self.orchestrator.handle_response(ctx, completion).await;
            apply_outcome(&outcome, &mut completion.text);
        })
    }
}

/// Host-formatted errors that skipped the post-response stage.
struct InterceptApiError {
    orchestrator: Arc<RetryOrchestrator>,
}

impl std::fmt::Debug for InterceptApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptApiError").finish_non_exhaustive()
    }
}

impl PreDeliveryHook for InterceptApiError {
    fn name(&self) -> &str {
        "intercept_api_error"
    }

    fn priority(&self) -> i32 {
        API_ERROR_PRIORITY
    }

    fn on_delivery<'a>(
        &'a self,
        ctx: &'a RequestContext,
        message: &'a mut OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if message.is_empty() {
                return;
            }
            if let Some(outcome) = self.orchestrator.intercept_error(ctx, &message.text).await {
                apply_outcome(&outcome, &mut message.text);
                message.from_llm = true;
            }
        })
    }
}

/// Last-chance validation for text that reached delivery unfinalized.
struct StripEnvelope {
    orchestrator: Arc<RetryOrchestrator>,
    force_structure: bool,
}

impl std::fmt::Debug for StripEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripEnvelope").finish_non_exhaustive()
    }
}

impl PreDeliveryHook for StripEnvelope {
    fn name(&self) -> &str {
        "strip_envelope"
    }

    fn priority(&self) -> i32 {
        FINAL_STRIP_PRIORITY
    }

    fn on_delivery<'a>(
        &'a self,
        ctx: &'a RequestContext,
        message: &'a mut OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if !message.from_llm || message.is_empty() || ctx.is_finalized() {
                return;
            }
            let structure = self.orchestrator.inspector().structure();
            if !structure.has_structure(&message.text) {
                return;
            }
            match structure.validate(&message.text) {
                ValidationResult::ThoughtAndReply { thought, reply } => {
                    message.text = self
                        .orchestrator
                        .transformer()
                        .finalize(&ctx.session_id, Some(&thought), &reply)
                        .await;
                    ctx.mark_finalized();
                }
                ValidationResult::Rejected { reason } if !self.force_structure => {
                    tracing::debug!(request_key = %ctx.key, %reason, "salvaging structure at delivery");
                    message.text = structure.salvage(&message.text);
                    ctx.mark_finalized();
                }
                ValidationResult::Rejected { reason } => {
                    tracing::warn!(request_key = %ctx.key, %reason, "untrusted structure reached delivery");
                    match self.orchestrator.fallback() {
                        Some(fallback) => message.text = fallback,
                        None => message.clear(),
                    }
                }
                ValidationResult::ReplyOnly { .. } => {}
            }
        })
    }
}

#[derive(Debug)]
struct CollapseNewlines;

impl PreDeliveryHook for CollapseNewlines {
    fn name(&self) -> &str {
        "collapse_newlines"
    }

    fn priority(&self) -> i32 {
        NEWLINE_COLLAPSE_PRIORITY
    }

    fn on_delivery<'a>(
        &'a self,
        ctx: &'a RequestContext,
        message: &'a mut OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if ctx.collapse_newlines && message.from_llm {
                let collapsed: String = message
                    .text
                    .chars()
                    .filter(|c| !matches!(c, '\r' | '\n'))
                    .collect();
                message.text = collapsed.trim().to_string();
            }
        })
    }
}

// ── Facade ───────────────────────────────────────────────────────────────────

pub struct ReliabilityLayerBuilder {
    config: Config,
    provider: Arc<dyn Provider>,
    history: Option<Arc<dyn ConversationStore>>,
    command_sink: Option<Arc<dyn CommandSink>>,
}

impl ReliabilityLayerBuilder {
    pub fn history(mut self, history: Arc<dyn ConversationStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn command_sink(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.command_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ReliabilityLayer, ConfigError> {
        let config = self.config;
        config.validate()?;

        let store = Arc::new(PendingStore::new());
        let logs = Arc::new(HybridLogStore::from_config(&config));
        let transformer = ResponseTransformer::new(Arc::clone(&logs), &config.display);
        let mut orchestrator =
            RetryOrchestrator::new(&config, self.provider, Arc::clone(&store), transformer)?;
        if let Some(history) = self.history {
            orchestrator = orchestrator.with_history(history);
        }
        let orchestrator = Arc::new(orchestrator);

        let mut chain = InterceptorChain::new();
        chain.add_pre_request(Arc::new(RecordRequest {
            recorder: RequestRecorder::new(Arc::clone(&store), &config.recorder.excluded_prefixes),
        }));
        chain.add_post_response(Arc::new(RetryOnResponse {
            orchestrator: Arc::clone(&orchestrator),
        }));
        chain.add_pre_delivery(Arc::new(InterceptApiError {
            orchestrator: Arc::clone(&orchestrator),
        }));
        chain.add_pre_delivery(Arc::new(StripEnvelope {
            orchestrator: Arc::clone(&orchestrator),
            force_structure: config.envelope.force_structure,
        }));
        if let (Some(sink), Some(tag)) = (self.command_sink, config.envelope.command_tag.as_deref()) {
            chain.add_pre_delivery(Arc::new(CommandDispatcher::new(
                tag,
                sink,
                config.envelope.command_failure_reply.clone(),
            )?));
        }
        if config.display.collapse_newlines {
            chain.add_pre_delivery(Arc::new(CollapseNewlines));
        }

        Ok(ReliabilityLayer {
            orchestrator,
            logs,
            store,
            chain,
            sweep_every: Duration::from_secs(config.recorder.sweep_interval_secs.max(1)),
            ttl: Duration::from_secs(config.recorder.ttl_secs),
            sweeper: Mutex::new(None),
        })
    }
}

pub struct ReliabilityLayer {
    orchestrator: Arc<RetryOrchestrator>,
    logs: Arc<HybridLogStore>,
    store: Arc<PendingStore>,
    chain: InterceptorChain,
    sweep_every: Duration,
    ttl: Duration,
    sweeper: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl ReliabilityLayer {
    pub fn builder(config: &Config, provider: Arc<dyn Provider>) -> ReliabilityLayerBuilder {
        ReliabilityLayerBuilder {
            config: config.clone(),
            provider,
            history: None,
            command_sink: None,
        }
    }

    pub fn orchestrator(&self) -> &Arc<RetryOrchestrator> {
        &self.orchestrator
    }

    pub fn log_store(&self) -> &Arc<HybridLogStore> {
        &self.logs
    }

    pub fn pending(&self) -> &Arc<PendingStore> {
        &self.store
    }

    /// Hosts may add their own hooks next to the built-in ones.
    pub fn chain_mut(&mut self) -> &mut InterceptorChain {
        &mut self.chain
    }

    pub async fn before_request(&self, ctx: &RequestContext, request: &CompletionRequest) {
        self.chain.run_pre_request(ctx, request).await;
    }

    pub async fn after_response(&self, ctx: &RequestContext, completion: &mut Completion) {
        self.chain.run_post_response(ctx, completion).await;
    }

    pub async fn before_delivery(&self, ctx: &RequestContext, message: &mut OutboundMessage) {
        self.chain.run_pre_delivery(ctx, message).await;
    }

    /// Start the periodic sweep of abandoned requests. Calling it again while
    /// running is a no-op. Needs a Tokio runtime.
    pub fn start_sweeper(&self) {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            Arc::clone(&self.store),
            self.sweep_every,
            self.ttl,
            cancel.clone(),
        );
        *slot = Some((handle, cancel));
    }

    pub async fn shutdown(&self) {
        let running = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((handle, cancel)) = running {
            cancel.cancel();
            if let Err(error) = handle.await {
                tracing::warn!(%error, "pending-request sweeper ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dispatch::ChannelCommandSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        reply: String,
    }

    impl Provider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn complete<'a>(
            &'a self,
            _request: &'a CompletionRequest,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Completion>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(Completion::text_only(self.reply.clone()))
            })
        }
    }

    fn config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = tmp.path().display().to_string();
        config.retry.delay_ms = 1;
        config
    }

    fn layer(config: &Config, reply: &str) -> (ReliabilityLayer, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            reply: reply.into(),
        });
        let layer = ReliabilityLayer::builder(config, Arc::clone(&provider) as Arc<dyn Provider>)
            .build()
            .unwrap();
        (layer, provider)
    }

    #[tokio::test]
    async fn full_pass_finalizes_and_delivery_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (layer, provider) = layer(&config(&tmp), "unused");
        let ctx = RequestContext::new("s", "hello");
        let request = CompletionRequest::prompt_only("hello");

        layer.before_request(&ctx, &request).await;
        let mut completion = Completion::text_only("<THINK>why</THINK>Final answer: Hi!");
        layer.after_response(&ctx, &mut completion).await;
        assert_eq!(completion.text, "Hi!");

        let mut message = OutboundMessage::from_llm(completion.text);
        layer.before_delivery(&ctx, &mut message).await;
        layer.before_delivery(&ctx, &mut message).await;
        assert_eq!(message.text, "Hi!");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(layer.log_store().entries("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn untracked_delivery_still_strips_envelopes() {
        let tmp = TempDir::new().unwrap();
        let (layer, _) = layer(&config(&tmp), "unused");
        let ctx = RequestContext::new("s", "tool continuation");
        let mut message = OutboundMessage::from_llm("<THINK>t</THINK>Final answer: done");
        layer.before_delivery(&ctx, &mut message).await;
        assert_eq!(message.text, "done");

        let mut leaked = OutboundMessage::from_llm("<THINK>half");
        let ctx = RequestContext::new("s", "again");
        layer.before_delivery(&ctx, &mut leaked).await;
        assert!(leaked.text.starts_with("Sorry, the service is busy"));
    }

    #[tokio::test]
    async fn api_error_text_is_retried_at_delivery() {
        let tmp = TempDir::new().unwrap();
        let (layer, provider) = layer(&config(&tmp), "Final answer: back online");
        let ctx = RequestContext::new("s", "hello");
        layer
            .before_request(&ctx, &CompletionRequest::prompt_only("hello"))
            .await;

        let mut completion = Completion::text_only("Request failed: Error code: 502")
            .with_finish_reason(crate::llm::types::FinishReason::Error);
        layer.after_response(&ctx, &mut completion).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let mut message = OutboundMessage::from_host(completion.text);
        layer.before_delivery(&ctx, &mut message).await;
        assert_eq!(message.text, "back online");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn commands_and_newlines_are_handled_at_delivery() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp);
        config.display.collapse_newlines = true;
        let (sink, mut rx) = ChannelCommandSink::new(2);
        let layer = ReliabilityLayer::builder(&config, Arc::new(CountingProvider::default()))
            .command_sink(Arc::new(sink))
            .build()
            .unwrap();

        let ctx = RequestContext::new("s", "hello").with_collapse_newlines(true);
        let mut message = OutboundMessage::from_llm("line one\nline two<COMMAND>/ping</COMMAND>");
        layer.before_delivery(&ctx, &mut message).await;
        assert_eq!(message.text, "line oneline two");
        assert_eq!(rx.recv().await.unwrap().command, "/ping");
    }

    #[tokio::test]
    async fn sweeper_starts_once_and_shuts_down() {
        let tmp = TempDir::new().unwrap();
        let (layer, _) = layer(&config(&tmp), "unused");
        layer.start_sweeper();
        layer.start_sweeper();
        layer.shutdown().await;
        layer.shutdown().await;
    }
}
