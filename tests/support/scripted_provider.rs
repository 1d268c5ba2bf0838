use cogito::llm::{Completion, CompletionRequest, Provider};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Replays scripted completions in call order, repeating the last one.
pub struct ScriptedProvider {
    calls: AtomicUsize,
    script: Vec<Completion>,
    latency: Duration,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: &[&str]) -> Self {
        Self::from_completions(script.iter().map(|text| Completion::text_only(*text)).collect())
    }

    pub fn from_completions(script: Vec<Completion>) -> Self {
        assert!(!script.is_empty(), "script needs at least one completion");
        Self {
            calls: AtomicUsize::new(0),
            script,
            latency: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Completion>> + Send + 'a>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            Ok(self.script.get(n).unwrap_or(&self.script[self.script.len() - 1]).clone())
        })
    }
}
