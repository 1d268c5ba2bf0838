use crate::config::RetryConfig;
use regex::{Regex, RegexSet, RegexSetBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Phrases upstream gateways and SDKs leave in the completion text when the
/// call failed, paired with a short name for logs.
const BUILTIN_SIGNATURES: &[(&str, &str)] = &[
    ("http_5xx", r"error\s*code:\s*5\d{2}"),
    ("api_timeout", r"apitimeouterror"),
    ("request_timed_out", r"request\s*timed\s*out"),
    ("internal_server_error", r"internalservererror"),
    ("count_token_failed", r"count_token_failed"),
    ("bad_status", r"bad_response_status_code"),
    ("connection_error", r"connection\s*error"),
    ("connection_reset", r"connection\s*(?:was\s*)?reset|econnreset"),
    ("remote_disconnected", r"remote\s*disconnected"),
    ("read_timeout", r"read\s*timeout"),
    ("connect_timeout", r"connect\s*timeout"),
    ("rate_limited", r"rate\s*limit(?:ed|\s*exceeded)|too\s*many\s*requests"),
];

static BUILTIN_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSetBuilder::new(BUILTIN_SIGNATURES.iter().map(|(_, pattern)| *pattern))
        .case_insensitive(true)
        .build()
        .expect("builtin error signatures are valid regexes")
});

/// Only error-shaped prefixes carry a code: `Error code: 503`,
/// `status_code=429`. Prose such as "HTTP 400 means..." never does.
static STATUS_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:error[\s_]*code|status[\s_]*code)\s*[:=]\s*(\d{3})\b")
        .expect("status code pattern is a valid regex")
});

/// What made a completion look like a provider-side failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureMatch {
    /// Terminal: retrying cannot help.
    NonRetryableStatus { code: u16 },
    RetryableStatus { code: u16 },
    Builtin { name: &'static str },
    Keyword { keyword: String },
}

impl SignatureMatch {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NonRetryableStatus { .. })
    }
}

impl std::fmt::Display for SignatureMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonRetryableStatus { code } => write!(f, "non-retryable status {code}"),
            Self::RetryableStatus { code } => write!(f, "retryable status {code}"),
            Self::Builtin { name } => write!(f, "error signature {name}"),
            Self::Keyword { keyword } => write!(f, "error keyword {keyword:?}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorSignatures {
    keywords: Vec<String>,
    retryable: HashSet<u16>,
    non_retryable: HashSet<u16>,
}

impl ErrorSignatures {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            keywords: config
                .error_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            retryable: config.retryable_status_codes.iter().copied().collect(),
            non_retryable: config.non_retryable_status_codes.iter().copied().collect(),
        }
    }

    /// Status codes win over phrases; a non-retryable code wins over everything.
    pub fn detect(&self, text: &str) -> Option<SignatureMatch> {
        let codes: Vec<u16> = STATUS_CODE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
            .collect();
        if let Some(&code) = codes.iter().find(|c| self.non_retryable.contains(c)) {
            return Some(SignatureMatch::NonRetryableStatus { code });
        }
        if let Some(&code) = codes.iter().find(|c| self.retryable.contains(c)) {
            return Some(SignatureMatch::RetryableStatus { code });
        }

        if let Some(index) = BUILTIN_SET.matches(text).into_iter().next() {
            return Some(SignatureMatch::Builtin {
                name: BUILTIN_SIGNATURES[index].0,
            });
        }

        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| lowered.contains(k.as_str()))
            .map(|k| SignatureMatch::Keyword { keyword: k.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signatures(non_retryable: Vec<u16>) -> ErrorSignatures {
        ErrorSignatures::from_config(&RetryConfig {
            non_retryable_status_codes: non_retryable,
            ..RetryConfig::default()
        })
    }

    #[test]
    fn plain_replies_have_no_signature() {
        let s = signatures(vec![]);
        assert_eq!(s.detect("Here is the recipe you asked for."), None);
        assert_eq!(s.detect("It returned status 200 as expected."), None);
    }

    #[test]
    fn codes_in_prose_are_not_statuses() {
        let s = signatures(vec![401]);
        for text in [
            "HTTP 400 means the request was malformed.",
            "A status 429 asks the client to back off.",
            "Servers answer HTTP/1.1 503 during maintenance.",
            "Status 401 is what you get without a token.",
        ] {
            assert_eq!(s.detect(text), None, "{text}");
        }
    }

    #[test]
    fn builtin_library_matches_gateway_errors() {
        let s = signatures(vec![]);
        assert_eq!(
            s.detect("openai.APITimeoutError: Request timed out."),
            Some(SignatureMatch::Builtin {
                name: "api_timeout"
            })
        );
        assert_eq!(
            s.detect("Error code: 500 - upstream exploded"),
            Some(SignatureMatch::Builtin { name: "http_5xx" })
        );
        assert_eq!(
            s.detect("Rate limit exceeded, slow down"),
            Some(SignatureMatch::Builtin {
                name: "rate_limited"
            })
        );
        assert_eq!(
            s.detect("ECONNRESET while reading body"),
            Some(SignatureMatch::Builtin {
                name: "connection_reset"
            })
        );
    }

    #[test]
    fn status_codes_are_classified_by_configured_sets() {
        let s = signatures(vec![401]);
        assert_eq!(
            s.detect("Error code: 503 service unavailable"),
            Some(SignatureMatch::RetryableStatus { code: 503 })
        );
        assert_eq!(
            s.detect("openai.BadRequestError: status_code=429"),
            Some(SignatureMatch::RetryableStatus { code: 429 })
        );
        assert_eq!(
            s.detect("HTTP/1.1 429 Too Many Requests"),
            Some(SignatureMatch::Builtin {
                name: "rate_limited"
            })
        );
        let terminal = s.detect("Status code: 401 unauthorized").unwrap();
        assert_eq!(terminal, SignatureMatch::NonRetryableStatus { code: 401 });
        assert!(terminal.is_terminal());
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let s = signatures(vec![]);
        assert_eq!(
            s.detect("Upstream Error: try later"),
            Some(SignatureMatch::Keyword {
                keyword: "upstream error".into()
            })
        );
    }
}
