use crate::guard::recorder::RequestContext;
use crate::llm::types::{Completion, CompletionRequest};
use std::future::Future;
use std::pin::Pin;

/// Text about to leave the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    /// Produced by the model rather than by a command or the host.
    pub from_llm: bool,
}

impl OutboundMessage {
    pub fn from_llm(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            from_llm: true,
        }
    }

    pub fn from_host(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            from_llm: false,
        }
    }

    /// An empty message is not delivered.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// Runs before the provider call.
pub trait PreRequestHook: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn on_request<'a>(
        &'a self,
        ctx: &'a RequestContext,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Runs on the provider's completion before the host turns it into a message.
pub trait PostResponseHook: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    fn on_response<'a>(
        &'a self,
        ctx: &'a RequestContext,
        completion: &'a mut Completion,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Last stage before delivery. Must be idempotent: the host may run the
/// chain more than once over the same message.
pub trait PreDeliveryHook: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    fn on_delivery<'a>(
        &'a self,
        ctx: &'a RequestContext,
        message: &'a mut OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}
