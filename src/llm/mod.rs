pub mod compatible;
pub mod scrub;
pub mod traits;
pub mod types;

pub use compatible::OpenAiCompatibleProvider;
pub use scrub::{api_error, sanitize_api_error, scrub_secret_patterns};
pub use traits::{Provider, ProviderCapabilities};
pub use types::{
    Completion, CompletionRequest, ContextTurn, FinishReason, MessageRole, ProviderParams,
    SenderInfo,
};
