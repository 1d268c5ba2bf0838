use super::types::{Completion, CompletionRequest};
use std::future::Future;
use std::pin::Pin;

/// Provider capabilities reported at runtime.
#[derive(Debug, Clone, Default)]
pub struct ProviderCapabilities {
    pub tool_calling: bool,
    pub vision: bool,
}

/// The text-generation boundary the reliability layer drives.
///
/// Implementations may fail freely; the retry orchestrator converts every
/// error into a failed attempt instead of propagating it.
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. "openai").
    fn name(&self) -> &str;

    /// Runtime capability flags.
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Completion>> + Send + 'a>>;

    /// Warm up the HTTP connection pool.
    fn warmup(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }
}
