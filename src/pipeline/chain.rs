use super::hooks::{OutboundMessage, PostResponseHook, PreDeliveryHook, PreRequestHook};
use crate::guard::recorder::RequestContext;
use crate::llm::types::{Completion, CompletionRequest};
use std::sync::Arc;

/// Hooks per stage, each list kept sorted by descending priority. Equal
/// priorities keep registration order.
#[derive(Debug, Default, Clone)]
pub struct InterceptorChain {
    pre_request: Vec<Arc<dyn PreRequestHook>>,
    post_response: Vec<Arc<dyn PostResponseHook>>,
    pre_delivery: Vec<Arc<dyn PreDeliveryHook>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre_request(&mut self, hook: Arc<dyn PreRequestHook>) {
        self.pre_request.push(hook);
        self.pre_request
            .sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub fn add_post_response(&mut self, hook: Arc<dyn PostResponseHook>) {
        self.post_response.push(hook);
        self.post_response
            .sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub fn add_pre_delivery(&mut self, hook: Arc<dyn PreDeliveryHook>) {
        self.pre_delivery.push(hook);
        self.pre_delivery
            .sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub async fn run_pre_request(&self, ctx: &RequestContext, request: &CompletionRequest) {
        for hook in &self.pre_request {
            hook.on_request(ctx, request).await;
        }
    }

    pub async fn run_post_response(&self, ctx: &RequestContext, completion: &mut Completion) {
        for hook in &self.post_response {
            hook.on_response(ctx, completion).await;
        }
    }

    pub async fn run_pre_delivery(&self, ctx: &RequestContext, message: &mut OutboundMessage) {
        for hook in &self.pre_delivery {
            tracing::trace!(hook = hook.name(), priority = hook.priority(), "pre-delivery hook");
            hook.on_delivery(ctx, message).await;
        }
    }

    pub fn pre_delivery_names(&self) -> Vec<&str> {
        self.pre_delivery.iter().map(|h| h.name()).collect()
    }
}
