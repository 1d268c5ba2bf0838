//! Conversation-history boundary.
//!
//! After a recovered retry the host's stored history holds the failed
//! exchange's gap; splicing the user prompt and the recovered reply back in
//! keeps the next turn from seeing assistant-after-assistant.

use crate::llm::types::{ContextTurn, MessageRole};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

pub trait ConversationStore: Send + Sync {
    fn get_conversation<'a>(
        &'a self,
        session_id: &'a str,
        conversation_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Vec<ContextTurn>>>> + Send + 'a>>;

    fn update_history<'a>(
        &'a self,
        session_id: &'a str,
        conversation_id: &'a str,
        turns: Vec<ContextTurn>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// Process-local history, for hosts without their own store and for tests.
#[derive(Debug, Default)]
pub struct InMemoryConversations {
    conversations: Mutex<HashMap<(String, String), Vec<ContextTurn>>>,
}

impl InMemoryConversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: &str, conversation_id: &str, turns: Vec<ContextTurn>) {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((session_id.to_string(), conversation_id.to_string()), turns);
    }

    pub fn turns(&self, session_id: &str, conversation_id: &str) -> Option<Vec<ContextTurn>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(session_id.to_string(), conversation_id.to_string()))
            .cloned()
    }
}

impl ConversationStore for InMemoryConversations {
    fn get_conversation<'a>(
        &'a self,
        session_id: &'a str,
        conversation_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Vec<ContextTurn>>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.turns(session_id, conversation_id)) })
    }

    fn update_history<'a>(
        &'a self,
        session_id: &'a str,
        conversation_id: &'a str,
        turns: Vec<ContextTurn>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.insert(session_id, conversation_id, turns);
            Ok(())
        })
    }
}

/// Append the prompt (unless it is already the last turn) and the reply.
/// Returns `false` when the conversation does not exist.
pub async fn splice_corrective_turns(
    store: &dyn ConversationStore,
    session_id: &str,
    conversation_id: &str,
    prompt: &str,
    reply: &str,
) -> anyhow::Result<bool> {
    let Some(mut turns) = store.get_conversation(session_id, conversation_id).await? else {
        return Ok(false);
    };
    if prompt.is_empty() {
        return Ok(false);
    }

    let prompt_present = turns
        .last()
        .is_some_and(|turn| turn.role == MessageRole::User && turn.content == prompt);
    if !prompt_present {
        turns.push(ContextTurn::user(prompt));
    }
    if !reply.is_empty() {
        turns.push(ContextTurn::assistant(reply));
    }
    store
        .update_history(session_id, conversation_id, turns)
        .await?;
    tracing::debug!(session = %session_id, conversation = %conversation_id, "corrective turns spliced");
    Ok(true)
}
