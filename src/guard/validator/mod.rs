//! Structural validation of completions.
//!
//! [`StructuralValidator`] splits a completion into reasoning and reply on the
//! last anchor match and rejects envelopes that never reached one. The last
//! anchor is the trust point: stray envelope markers after it are stripped
//! from the reply, not rejected.
//! [`ResponseInspector`] folds that together with the error-signature library
//! and the truncation detector into one retry decision.

pub mod markers;
pub mod signatures;
pub mod truncation;

use crate::config::{Config, EnvelopeConfig};
use crate::error::ConfigError;
use markers::{NormalizedText, TagPattern};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use signatures::{ErrorSignatures, SignatureMatch};
use truncation::{TruncationDetector, TruncationSignal};

pub use markers::remove_ranges;

/// Why a completion's structure is untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("envelope marker without an anchor")]
    UnanchoredEnvelope,
    #[error("incomplete {tag} envelope")]
    IncompleteSubEnvelope { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ValidationResult {
    ReplyOnly { text: String },
    ThoughtAndReply { thought: String, reply: String },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone)]
pub struct StructuralValidator {
    envelope: TagPattern,
    anchor: Regex,
    auxiliary: Vec<TagPattern>,
}

impl StructuralValidator {
    pub fn from_config(config: &EnvelopeConfig) -> Result<Self, ConfigError> {
        let envelope = TagPattern::pair(&config.open_tag, &config.close_tag)?;
        let anchor = RegexBuilder::new(&config.anchor_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::Pattern {
                pattern: config.anchor_pattern.clone(),
                message: e.to_string(),
            })?;
        let auxiliary = config
            .auxiliary_tags
            .iter()
            .map(|tag| TagPattern::new(tag))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            envelope,
            anchor,
            auxiliary,
        })
    }

    pub fn validate(&self, text: &str) -> ValidationResult {
        let normalized = NormalizedText::new(text);
        if let Some(tag) = self
            .auxiliary
            .iter()
            .find(|tag| tag.is_incomplete(&normalized))
        {
            return ValidationResult::Rejected {
                reason: RejectReason::IncompleteSubEnvelope {
                    tag: tag.name().to_string(),
                },
            };
        }

        if let Some(anchor) = self.anchor.find_iter(text).last() {
            let thought = self.envelope.strip_markers(&text[..anchor.start()]);
            let reply = self.envelope.strip_markers(&text[anchor.end()..]);
            return ValidationResult::ThoughtAndReply {
                thought: thought.trim().to_string(),
                reply: reply.trim().to_string(),
            };
        }

        if self.envelope.has_marker(&normalized) {
            return ValidationResult::Rejected {
                reason: RejectReason::UnanchoredEnvelope,
            };
        }
        ValidationResult::ReplyOnly {
            text: text.to_string(),
        }
    }

    /// Best-effort visible text from a rejected completion: envelope regions
    /// and stray markers removed.
    pub fn salvage(&self, text: &str) -> String {
        self.envelope.strip_regions(text).trim().to_string()
    }

    /// Whether `text` carries anything the validator would act on.
    pub fn has_structure(&self, text: &str) -> bool {
        self.envelope.has_marker(&NormalizedText::new(text)) || self.anchor.is_match(text)
    }
}

/// Why a completion needs another attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum RetryReason {
    #[error("blank completion")]
    Blank,
    #[error("{signature}")]
    ErrorSignature { signature: SignatureMatch },
    #[error("{reason}")]
    Structure { reason: RejectReason },
    #[error("truncated: {signal}")]
    Truncated { signal: TruncationSignal },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accept {
        thought: Option<String>,
        reply: String,
    },
    Retry {
        reason: RetryReason,
    },
    /// Retrying cannot help; go straight to the fallback.
    Terminal {
        reason: RetryReason,
    },
}

impl Verdict {
    pub fn needs_retry(&self) -> bool {
        !matches!(self, Self::Accept { .. })
    }
}

/// Everything the inspector saw, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct InspectionReport {
    pub validation: ValidationResult,
    pub signature: Option<SignatureMatch>,
    pub truncation: Option<TruncationSignal>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone)]
pub struct ResponseInspector {
    structure: StructuralValidator,
    signatures: ErrorSignatures,
    truncation: Option<TruncationDetector>,
    force_structure: bool,
}

impl ResponseInspector {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            structure: StructuralValidator::from_config(&config.envelope)?,
            signatures: ErrorSignatures::from_config(&config.retry),
            truncation: config
                .truncation
                .enabled
                .then(|| TruncationDetector::from_config(&config.truncation)),
            force_structure: config.envelope.force_structure,
        })
    }

    pub fn structure(&self) -> &StructuralValidator {
        &self.structure
    }

    pub fn signatures(&self) -> &ErrorSignatures {
        &self.signatures
    }

    /// Decide whether `text` can be delivered.
    ///
    /// Precedence of the recorded reason: blank, non-retryable status, error
    /// signature, structural rejection, truncation. Signatures and truncation
    /// are checked on the reply segment when the completion has one.
    pub fn inspect(&self, text: &str) -> Verdict {
        if text.trim().is_empty() {
            return Verdict::Retry {
                reason: RetryReason::Blank,
            };
        }
        let validation = self.structure.validate(text);
        let visible = match &validation {
            ValidationResult::ThoughtAndReply { reply, .. } => reply.as_str(),
            _ => text,
        };
        if let Some(signature) = self.signatures.detect(visible) {
            let terminal = signature.is_terminal();
            let reason = RetryReason::ErrorSignature { signature };
            return if terminal {
                Verdict::Terminal { reason }
            } else {
                Verdict::Retry { reason }
            };
        }

        let (thought, reply) = match validation {
            ValidationResult::ReplyOnly { text } => (None, text),
            ValidationResult::ThoughtAndReply { thought, reply } => (Some(thought), reply),
            ValidationResult::Rejected { reason } if self.force_structure => {
                return Verdict::Retry {
                    reason: RetryReason::Structure { reason },
                };
            }
            ValidationResult::Rejected { reason } => {
                tracing::debug!(%reason, "structure not enforced, salvaging rejected completion");
                (None, self.structure.salvage(text))
            }
        };

        if let Some(detector) = &self.truncation
            && let Some(signal) = detector.detect(&reply)
        {
            return Verdict::Retry {
                reason: RetryReason::Truncated { signal },
            };
        }
        if reply.trim().is_empty() {
            return Verdict::Retry {
                reason: RetryReason::Blank,
            };
        }
        Verdict::Accept { thought, reply }
    }

    pub fn report(&self, text: &str) -> InspectionReport {
        let validation = self.structure.validate(text);
        let visible = match &validation {
            ValidationResult::ThoughtAndReply { reply, .. } => reply.as_str(),
            _ => text,
        };
        InspectionReport {
            signature: self.signatures.detect(visible),
            truncation: self
                .truncation
                .as_ref()
                .and_then(|detector| detector.detect(visible)),
            verdict: self.inspect(text),
            validation,
        }
    }
}
