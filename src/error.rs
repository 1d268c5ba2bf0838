use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `cogito`.
///
/// Hosts embedding the reliability layer match on these to decide how to
/// react; internal plumbing keeps using `anyhow::Result` for context chains.
#[derive(Debug, Error)]
pub enum CogitoError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Provider boundary ───────────────────────────────────────────────
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    // ── Thought log ─────────────────────────────────────────────────────
    #[error("thought log: {0}")]
    Store(#[from] StoreError),

    // ── Command surface ─────────────────────────────────────────────────
    #[error("command: {0}")]
    Command(#[from] CommandError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Provider errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },

    #[error("provider {provider} is not configured: {message}")]
    NotConfigured { provider: String, message: String },
}

// ─── Thought log errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt hot log {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("background write task failed: {0}")]
    Join(String),
}

// ─── Command errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no log entry at index {index}")]
    NotFound { index: usize },

    #[error("summary failed after {attempts} attempt(s)")]
    SummaryFailed { attempts: u32 },
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, CogitoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_correctly() {
        let err = CogitoError::Config(ConfigError::Validation("max_attempts must be >= 1".into()));
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn provider_timeout_displays_seconds() {
        let err = CogitoError::Provider(ProviderError::Timeout {
            provider: "openai".into(),
            timeout_secs: 60,
        });
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let err: CogitoError = anyhow_err.into();
        assert!(err.to_string().contains("something went wrong"));
    }

    #[test]
    fn store_io_error_names_path() {
        let err = CogitoError::Store(StoreError::Io {
            path: "/tmp/x.json".into(),
            source: std::io::Error::other("disk full"),
        });
        assert!(err.to_string().contains("/tmp/x.json"));
    }

    #[test]
    fn command_not_found_displays_index() {
        let err = CogitoError::Command(CommandError::NotFound { index: 7 });
        assert!(err.to_string().contains('7'));
    }
}
