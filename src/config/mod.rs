mod env_overrides;
mod loader;
pub mod schema;

pub use schema::{
    ConcurrentRetryConfig, Config, DelayMode, DetectionMode, DisplayConfig, EnvelopeConfig,
    ProviderConfig, RecorderConfig, RetryConfig, SummaryConfig, ThoughtLogConfig,
    TruncationConfig,
};
