//! Request snapshots kept for replay.
//!
//! The host threads a [`RequestContext`] through every hook instead of
//! tagging its own request objects; the recorder stores a deep copy of the
//! outbound [`CompletionRequest`] under the context's key so the orchestrator
//! can re-issue it later.

use crate::llm::types::CompletionRequest;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identity of one logical request, stable across every hook it passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `{session}_{8 hex chars}`.
    pub fn generate(session_id: &str) -> Self {
        let trace = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{session_id}_{}", &trace[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request values the transport supplies and every hook receives.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub key: RequestKey,
    pub session_id: String,
    /// Raw user input, used to skip command-like messages.
    pub message_text: String,
    /// The transport wants replies on one line.
    pub collapse_newlines: bool,
    /// Shared across clones; set once the reply has been finalized.
    finalized: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new(session_id: impl Into<String>, message_text: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            key: RequestKey::generate(&session_id),
            session_id,
            message_text: message_text.into(),
            collapse_newlines: false,
            finalized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_collapse_newlines(mut self, collapse: bool) -> Self {
        self.collapse_newlines = collapse;
        self
    }

    pub fn mark_finalized(&self) {
        self.finalized.store(true, Ordering::Release);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub key: RequestKey,
    pub session_id: String,
    pub request: CompletionRequest,
    pub created_at: DateTime<Utc>,
    created: Instant,
    /// Set once a retry sequence has been claimed for this request.
    pub guard: bool,
}

impl PendingRequest {
    pub fn new(key: RequestKey, session_id: impl Into<String>, request: CompletionRequest) -> Self {
        Self {
            key,
            session_id: session_id.into(),
            request,
            created_at: Utc::now(),
            created: Instant::now(),
            guard: false,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created)
    }
}

/// Outstanding requests, at most one per key.
#[derive(Debug, Default)]
pub struct PendingStore {
    entries: Mutex<HashMap<RequestKey, PendingRequest>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestKey, PendingRequest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the entry for `pending.key`.
    pub fn insert(&self, pending: PendingRequest) {
        self.lock().insert(pending.key.clone(), pending);
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Deep copy of the stored request, safe to hand to one attempt.
    pub fn snapshot(&self, key: &RequestKey) -> Option<CompletionRequest> {
        self.lock().get(key).map(|pending| pending.request.clone())
    }

    pub fn session_of(&self, key: &RequestKey) -> Option<String> {
        self.lock().get(key).map(|pending| pending.session_id.clone())
    }

    pub fn is_guarded(&self, key: &RequestKey) -> bool {
        self.lock().get(key).is_some_and(|pending| pending.guard)
    }

    /// Set the guard if the entry exists and is unguarded. Exactly one caller
    /// per key ever gets `true`.
    pub fn try_claim(&self, key: &RequestKey) -> bool {
        match self.lock().get_mut(key) {
            Some(pending) if !pending.guard => {
                pending.guard = true;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, key: &RequestKey) -> Option<PendingRequest> {
        self.lock().remove(key)
    }

    /// Drop entries older than `ttl`; returns how many were removed.
    pub fn sweep_older_than(&self, ttl: Duration, now: Instant) -> usize {
        let mut entries = self.lock();
        let expired: Vec<RequestKey> = entries
            .iter()
            .filter(|(_, pending)| pending.age(now) > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Pre-request side: snapshot outbound calls unless they look like commands.
#[derive(Debug, Clone)]
pub struct RequestRecorder {
    store: Arc<PendingStore>,
    excluded_prefixes: Vec<String>,
}

impl RequestRecorder {
    pub fn new(store: Arc<PendingStore>, excluded_prefixes: &[String]) -> Self {
        Self {
            store,
            excluded_prefixes: excluded_prefixes
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, message_text: &str) -> bool {
        let lowered = message_text.trim().to_lowercase();
        self.excluded_prefixes
            .iter()
            .any(|prefix| lowered.starts_with(prefix.as_str()))
    }

    /// Returns whether the request is now tracked.
    pub fn record(&self, ctx: &RequestContext, request: &CompletionRequest) -> bool {
        if self.is_excluded(&ctx.message_text) {
            tracing::debug!(request_key = %ctx.key, "command-like input, not tracked");
            return false;
        }
        self.store.insert(PendingRequest::new(
            ctx.key.clone(),
            ctx.session_id.clone(),
            request.clone(),
        ));
        tracing::debug!(
            request_key = %ctx.key,
            session = %ctx.session_id,
            contexts = request.contexts.len(),
            "request snapshot stored"
        );
        true
    }
}

/// Periodically drop entries whose response never arrived.
pub fn spawn_sweeper(
    store: Arc<PendingStore>,
    every: Duration,
    ttl: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = store.sweep_older_than(ttl, Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = store.len(), "swept expired pending requests");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ContextTurn;

    fn recorder(store: &Arc<PendingStore>) -> RequestRecorder {
        RequestRecorder::new(
            Arc::clone(store),
            &["/thought".to_string(), "reset".to_string()],
        )
    }

    #[test]
    fn generated_keys_are_unique_and_prefixed() {
        let a = RequestKey::generate("qq:group:1");
        let b = RequestKey::generate("qq:group:1");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("qq:group:1_"));
        assert_eq!(a.as_str().len(), "qq:group:1_".len() + 8);
    }

    #[test]
    fn records_requests_and_skips_commands() {
        let store = Arc::new(PendingStore::new());
        let recorder = recorder(&store);

        let ctx = RequestContext::new("s1", "what's the weather");
        assert!(recorder.record(&ctx, &CompletionRequest::prompt_only("what's the weather")));
        assert!(store.contains(&ctx.key));

        let cmd = RequestContext::new("s1", "  /Thought 2");
        assert!(!recorder.record(&cmd, &CompletionRequest::prompt_only("/thought 2")));
        assert!(!store.contains(&cmd.key));
        assert!(recorder.is_excluded("RESET please"));
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let store = Arc::new(PendingStore::new());
        let ctx = RequestContext::new("s1", "hi");
        let request = CompletionRequest {
            prompt: "hi".into(),
            contexts: vec![ContextTurn::user("earlier")],
            ..CompletionRequest::default()
        };
        recorder(&store).record(&ctx, &request);

        let mut first = store.snapshot(&ctx.key).unwrap();
        first.contexts.push(ContextTurn::assistant("mutated"));
        first.prompt.push_str(" again");

        let second = store.snapshot(&ctx.key).unwrap();
        assert_eq!(second.contexts.len(), 1);
        assert_eq!(second.prompt, "hi");
    }

    #[test]
    fn claim_succeeds_exactly_once() {
        let store = PendingStore::new();
        let key = RequestKey::new("k");
        assert!(!store.try_claim(&key));
        store.insert(PendingRequest::new(key.clone(), "s", CompletionRequest::default()));
        assert!(!store.is_guarded(&key));
        assert!(store.try_claim(&key));
        assert!(!store.try_claim(&key));
        assert!(store.is_guarded(&key));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let store = PendingStore::new();
        store.insert(PendingRequest::new(RequestKey::new("k"), "s", CompletionRequest::default()));

        assert_eq!(store.sweep_older_than(Duration::from_secs(300), Instant::now()), 0);
        assert_eq!(store.len(), 1);

        let later = Instant::now() + Duration::from_secs(301);
        assert_eq!(store.sweep_older_than(Duration::from_secs(300), later), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sweeper_clears_expired_entries_until_cancelled() {
        let store = Arc::new(PendingStore::new());
        store.insert(PendingRequest::new(RequestKey::new("k"), "s", CompletionRequest::default()));
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            Arc::clone(&store),
            Duration::from_millis(10),
            Duration::ZERO,
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
