use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One prior turn of the conversation sent along with a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ContextTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Who sent the message that produced the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub user_id: Option<String>,
    pub nickname: Option<String>,
    pub group_id: Option<String>,
    pub platform: Option<String>,
}

/// Sampling parameters forwarded verbatim to the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Everything needed to issue (or re-issue) a provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default)]
    pub contexts: Vec<ContextTurn>,
    #[serde(default)]
    pub image_refs: Vec<String>,
    pub system_prompt: Option<String>,
    /// Tool definitions in the provider's native JSON shape.
    pub tool_spec: Option<serde_json::Value>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub sender: SenderInfo,
    #[serde(default)]
    pub params: ProviderParams,
}

impl CompletionRequest {
    pub fn prompt_only(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    /// The host already turned a failure into an error message.
    Error,
    Other,
}

impl FinishReason {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

/// A provider's answer to one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub raw_metadata: serde_json::Value,
}

impl Completion {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some(FinishReason::Stop),
            raw_metadata: serde_json::Value::Null,
        }
    }

    pub fn tool_invocation(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some(FinishReason::ToolCalls),
            raw_metadata: serde_json::Value::Null,
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn is_tool_invocation(&self) -> bool {
        self.finish_reason == Some(FinishReason::ToolCalls)
    }

    pub fn is_host_error(&self) -> bool {
        self.finish_reason == Some(FinishReason::Error)
    }
}
