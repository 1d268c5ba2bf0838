pub mod history;
pub mod orchestrator;
pub mod recorder;
pub mod transformer;
pub mod validator;

pub use history::{ConversationStore, InMemoryConversations};
pub use orchestrator::{Outcome, RetryOrchestrator, SkipReason};
pub use recorder::{PendingRequest, PendingStore, RequestContext, RequestKey, RequestRecorder};
pub use transformer::ResponseTransformer;
pub use validator::{
    RejectReason, ResponseInspector, RetryReason, StructuralValidator, ValidationResult, Verdict,
};
