use crate::config::DisplayConfig;
use crate::thoughts::{HybridLogStore, NO_THOUGHT};
use std::sync::Arc;

/// Turns an accepted `(thought, reply)` pair into what the user sees and
/// records the thought.
#[derive(Debug, Clone)]
pub struct ResponseTransformer {
    store: Arc<HybridLogStore>,
    filtered_keywords: Vec<String>,
    show_thought: bool,
    thought_header: String,
}

impl ResponseTransformer {
    pub fn new(store: Arc<HybridLogStore>, display: &DisplayConfig) -> Self {
        Self {
            store,
            filtered_keywords: display
                .filtered_keywords
                .iter()
                .filter(|k| !k.is_empty())
                .cloned()
                .collect(),
            show_thought: display.show_thought,
            thought_header: display.thought_header.clone(),
        }
    }

    pub fn store(&self) -> &Arc<HybridLogStore> {
        &self.store
    }

    /// Remove every occurrence of each filtered keyword, in configured order.
    pub fn filter_reply(&self, reply: &str) -> String {
        let mut out = reply.to_string();
        for keyword in &self.filtered_keywords {
            if out.contains(keyword.as_str()) {
                out = out.replace(keyword.as_str(), "");
            }
        }
        out.trim().to_string()
    }

    pub async fn finalize(&self, session_id: &str, thought: Option<&str>, reply: &str) -> String {
        let thought = thought.map(str::trim).filter(|t| !t.is_empty());
        let logged = thought.unwrap_or(NO_THOUGHT);
        if let Err(error) = self.store.append(session_id, logged).await {
            tracing::warn!(session = %session_id, %error, "failed to record thought");
        }

        let reply = self.filter_reply(reply);
        match thought {
            Some(thought) if self.show_thought => {
                format!("{}\n{thought}\n\n---\n\n{reply}", self.thought_header)
            }
            _ => reply,
        }
    }
}
