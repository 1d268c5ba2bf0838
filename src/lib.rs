#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod commands;
pub mod config;
pub mod error;
pub mod guard;
pub mod llm;
pub mod pipeline;
pub mod thoughts;

pub use commands::{LogCommand, LogCommands};
pub use config::Config;
pub use error::{CogitoError, Result};
pub use guard::{Outcome, RequestContext, RetryOrchestrator};
pub use pipeline::{OutboundMessage, ReliabilityLayer};
pub use thoughts::HybridLogStore;
