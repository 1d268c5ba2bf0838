use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

const MAX_API_ERROR_CHARS: usize = 200;

/// Prefix tokens (`sk-...`, `ghp_...`) and key/value markers (`api_key=...`,
/// `"token":"..."`, `Bearer ...`) whose value must never reach a log line.
static SECRET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        (?P<prefix>
            \b(?:sk-|ghp_|gho_|ghu_|ghs_|github_pat_|hf_|glpat-|xox[bpsa]-|xapp-|AKIA|ASIA|AIza|ya29\.|eyJ)
        )[A-Za-z0-9._:+/=-]{8,}
        |
        (?P<marker>
            (?i:authorization:\s*bearer\s+|bearer\s+)
            | (?i:api_key|access_token|refresh_token|id_token|password|secret)=
            | "(?i:api_key|access_token|refresh_token|token|secret|password|client_secret)"\s*:\s*"
        )[A-Za-z0-9._:+/=-]+
        "#,
    )
    .expect("secret pattern is a valid regex")
});

/// Redact secret-looking tokens from provider error text.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    SECRET_PATTERN.replace_all(input, |caps: &regex::Captures<'_>| {
        if let Some(marker) = caps.name("marker") {
            format!("{}[REDACTED]", marker.as_str())
        } else {
            "[REDACTED]".to_string()
        }
    })
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    truncate_chars(&scrubbed, MAX_API_ERROR_CHARS)
}

/// Cut `input` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((byte_end, _)) => format!("{}...", &input[..byte_end]),
        None => input.to_string(),
    }
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}
