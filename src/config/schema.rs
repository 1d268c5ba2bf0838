use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Root of the thought log (`~` is expanded).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub truncation: TruncationConfig,

    #[serde(default)]
    pub concurrent: ConcurrentRetryConfig,

    #[serde(default)]
    pub envelope: EnvelopeConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub thought_log: ThoughtLogConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_data_dir() -> String {
    "~/.cogito/data".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            data_dir: default_data_dir(),
            retry: RetryConfig::default(),
            truncation: TruncationConfig::default(),
            concurrent: ConcurrentRetryConfig::default(),
            envelope: EnvelopeConfig::default(),
            display: DisplayConfig::default(),
            thought_log: ThoughtLogConfig::default(),
            recorder: RecorderConfig::default(),
            summary: SummaryConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl Config {
    /// `data_dir` with a leading `~` expanded.
    pub fn resolved_data_dir(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.data_dir);
        PathBuf::from(expanded.as_ref())
    }

    /// Per-session bounded logs.
    pub fn hot_log_dir(&self) -> PathBuf {
        self.resolved_data_dir().join("thoughts").join("sessions")
    }

    /// Per-day append-only archive.
    pub fn cold_log_dir(&self) -> PathBuf {
        self.resolved_data_dir().join("thoughts").join("daily")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.envelope.open_tag.trim().is_empty() || self.envelope.close_tag.trim().is_empty() {
            return Err(ConfigError::Validation(
                "envelope.open_tag and envelope.close_tag must not be empty".into(),
            ));
        }
        if self.envelope.anchor_pattern.trim().is_empty() {
            return Err(ConfigError::Validation(
                "envelope.anchor_pattern must not be empty".into(),
            ));
        }
        regex::RegexBuilder::new(&self.envelope.anchor_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::Pattern {
                pattern: self.envelope.anchor_pattern.clone(),
                message: e.to_string(),
            })?;
        if self.thought_log.history_limit == 0 {
            return Err(ConfigError::Validation(
                "thought_log.history_limit must be at least 1".into(),
            ));
        }
        if self.concurrent.enabled && self.concurrent.base_count == 0 {
            return Err(ConfigError::Validation(
                "concurrent.base_count must be at least 1".into(),
            ));
        }
        if self.summary.max_retries == 0 {
            return Err(ConfigError::Validation(
                "summary.max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ── Retry ────────────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DelayMode {
    Constant,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub delay_mode: DelayMode,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Case-insensitive substrings that mark a completion as a provider error.
    #[serde(default = "default_error_keywords")]
    pub error_keywords: Vec<String>,
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,
    #[serde(default)]
    pub non_retryable_status_codes: Vec<u16>,
    /// Sent when every attempt failed. `None` or an empty string clears the reply instead.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: Option<String>,
    /// A completion containing this literal deliberately says nothing.
    #[serde(default = "default_silent_marker")]
    pub silent_marker: String,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_error_keywords() -> Vec<String> {
    vec![
        "internal server error".into(),
        "upstream error".into(),
        "request failed".into(),
        "service unavailable".into(),
    ]
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![400, 429, 502, 503, 504]
}

fn default_fallback_reply() -> Option<String> {
    Some("Sorry, the service is busy right now. Please try again later.".into())
}

fn default_silent_marker() -> String {
    "<NO_RESPONSE>".into()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            delay_mode: DelayMode::default(),
            max_delay_ms: default_max_delay_ms(),
            error_keywords: default_error_keywords(),
            retryable_status_codes: default_retryable_status_codes(),
            non_retryable_status_codes: Vec::new(),
            fallback_reply: default_fallback_reply(),
            silent_marker: default_silent_marker(),
        }
    }
}

// ── Truncation ───────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectionMode {
    /// Terminal-character check only.
    Minimal,
    /// Terminal OR balance OR content-type checks.
    #[default]
    Combined,
    /// Terminal AND balance checks.
    Conservative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: DetectionMode,
    #[serde(default = "default_truncation_marker")]
    pub marker: String,
    #[serde(default = "default_true")]
    pub check_marker: bool,
    #[serde(default = "default_true")]
    pub check_terminal: bool,
    #[serde(default = "default_true")]
    pub check_balance: bool,
    #[serde(default = "default_true")]
    pub check_content: bool,
}

fn default_truncation_marker() -> String {
    "[TRUNCATED_BY_LENGTH]".into()
}

fn default_true() -> bool {
    true
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: DetectionMode::default(),
            marker: default_truncation_marker(),
            check_marker: true,
            check_terminal: true,
            check_balance: true,
            check_content: true,
        }
    }
}

// ── Speculative retries ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrentRetryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Sequential attempts that must fail before batches start.
    #[serde(default = "default_concurrent_threshold")]
    pub threshold: u32,
    #[serde(default = "default_concurrent_base")]
    pub base_count: u32,
    #[serde(default = "default_concurrent_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub exponential_growth: bool,
    #[serde(default = "default_multiplier_cap")]
    pub multiplier_cap: u32,
    #[serde(default = "default_absolute_cap")]
    pub absolute_cap: u32,
}

fn default_concurrent_threshold() -> u32 {
    1
}

fn default_concurrent_base() -> u32 {
    2
}

fn default_concurrent_timeout_secs() -> u64 {
    30
}

fn default_multiplier_cap() -> u32 {
    4
}

fn default_absolute_cap() -> u32 {
    8
}

impl Default for ConcurrentRetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_concurrent_threshold(),
            base_count: default_concurrent_base(),
            timeout_secs: default_concurrent_timeout_secs(),
            exponential_growth: true,
            multiplier_cap: default_multiplier_cap(),
            absolute_cap: default_absolute_cap(),
        }
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    /// When false, rejected structures are salvaged instead of retried.
    #[serde(default = "default_true")]
    pub force_structure: bool,
    #[serde(default = "default_open_tag")]
    pub open_tag: String,
    #[serde(default = "default_close_tag")]
    pub close_tag: String,
    /// Case-insensitive regex; its last match splits thought from reply.
    #[serde(default = "default_anchor_pattern")]
    pub anchor_pattern: String,
    /// Tags whose regions must be complete wherever they appear.
    #[serde(default = "default_auxiliary_tags")]
    pub auxiliary_tags: Vec<String>,
    /// Tag wrapping commands the reply asks the host to run.
    #[serde(default = "default_command_tag")]
    pub command_tag: Option<String>,
    #[serde(default = "default_command_failure_reply")]
    pub command_failure_reply: Option<String>,
}

fn default_open_tag() -> String {
    "<THINK>".into()
}

fn default_close_tag() -> String {
    "</THINK>".into()
}

fn default_anchor_pattern() -> String {
    r"final answer[:：]?\s*".into()
}

fn default_auxiliary_tags() -> Vec<String> {
    vec!["COMMAND".into(), "DOSSIER_UPDATE".into()]
}

fn default_command_tag() -> Option<String> {
    Some("COMMAND".into())
}

fn default_command_failure_reply() -> Option<String> {
    Some("A requested command could not be started. Please try again later.".into())
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            force_structure: true,
            open_tag: default_open_tag(),
            close_tag: default_close_tag(),
            anchor_pattern: default_anchor_pattern(),
            auxiliary_tags: default_auxiliary_tags(),
            command_tag: default_command_tag(),
            command_failure_reply: default_command_failure_reply(),
        }
    }
}

// ── Display ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Show the reasoning above the reply.
    #[serde(default)]
    pub show_thought: bool,
    #[serde(default = "default_thought_header")]
    pub thought_header: String,
    /// Removed from every reply, each occurrence.
    #[serde(default)]
    pub filtered_keywords: Vec<String>,
    /// Strip line breaks for requests flagged with `collapse_newlines`.
    #[serde(default)]
    pub collapse_newlines: bool,
}

fn default_thought_header() -> String {
    "Thinking:".into()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_thought: false,
            thought_header: default_thought_header(),
            filtered_keywords: Vec::new(),
            collapse_newlines: false,
        }
    }
}

// ── Thought log ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtLogConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_no_thought_notice")]
    pub no_thought_notice: String,
}

fn default_history_limit() -> usize {
    100
}

fn default_no_thought_notice() -> String {
    "No reasoning was recorded for this reply.".into()
}

impl Default for ThoughtLogConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            no_thought_notice: default_no_thought_notice(),
        }
    }
}

// ── Request recorder ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Lowercase prefixes of inputs that are never tracked.
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
    #[serde(default = "default_pending_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_excluded_prefixes() -> Vec<String> {
    vec![
        "/thought".into(),
        "/cogito".into(),
        "reset".into(),
        "new".into(),
    ]
}

fn default_pending_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: default_excluded_prefixes(),
            ttl_secs: default_pending_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

// ── Summaries ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_retries")]
    pub max_retries: u32,
    #[serde(default = "default_summary_timeout_secs")]
    pub timeout_secs: u64,
    /// `{log}` is replaced by the entry being summarized.
    #[serde(default = "default_summary_template")]
    pub prompt_template: String,
}

fn default_summary_retries() -> u32 {
    2
}

fn default_summary_timeout_secs() -> u64 {
    60
}

fn default_summary_template() -> String {
    "Summarize the following reasoning log in a few sentences:\n{log}".into()
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_summary_retries(),
            timeout_secs: default_summary_timeout_secs(),
            prompt_template: default_summary_template(),
        }
    }
}

// ── Provider ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}

fn default_provider_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_provider_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_provider_url(),
            api_key: None,
            model: None,
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}
