//! Heuristics for completions that stopped mid-sentence.
//!
//! Layers:
//! 1. an explicit truncation marker,
//! 2. the last non-blank line ends on a character no finished text ends on,
//! 3. brackets, quotes or code fences left open,
//! 4. a content-type specific "ended mid-unit" check.
//!
//! The marker layer always applies when enabled; [`DetectionMode`] decides how
//! layers 2-4 combine.

use crate::config::{DetectionMode, TruncationConfig};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

const FILE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "go", "java", "c", "h", "cpp", "md", "txt", "json", "toml",
    "yaml", "yml", "html", "css", "sh", "png", "jpg", "jpeg", "gif", "pdf", "zip",
];

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+•]|\d+[.)])(?:\s|$)").expect("list item pattern is a valid regex")
});

static BARE_LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s*$").expect("bare list pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Code,
    List,
    Table,
    Json,
    Prose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Imbalance {
    Bracket,
    Quote,
    CodeFence,
}

/// Why a completion looks cut off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum TruncationSignal {
    Marker,
    DanglingTail { last_char: char },
    Unbalanced { kind: Imbalance },
    MidUnit { kind: ContentKind },
}

impl std::fmt::Display for TruncationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Marker => write!(f, "explicit truncation marker"),
            Self::DanglingTail { last_char } => write!(f, "ends on {last_char:?}"),
            Self::Unbalanced { kind } => write!(f, "unbalanced {kind:?}"),
            Self::MidUnit { kind } => write!(f, "{kind:?} ends mid-unit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TruncationDetector {
    mode: DetectionMode,
    marker: Option<String>,
    check_terminal: bool,
    check_balance: bool,
    check_content: bool,
}

impl TruncationDetector {
    pub fn from_config(config: &TruncationConfig) -> Self {
        Self {
            mode: config.mode,
            marker: (config.check_marker && !config.marker.is_empty())
                .then(|| config.marker.clone()),
            check_terminal: config.check_terminal,
            check_balance: config.check_balance,
            check_content: config.check_content,
        }
    }

    pub fn detect(&self, text: &str) -> Option<TruncationSignal> {
        if let Some(marker) = &self.marker
            && text.contains(marker.as_str())
        {
            return Some(TruncationSignal::Marker);
        }
        let last_line = last_non_blank_line(text)?;

        let terminal = || {
            self.check_terminal
                .then(|| dangling_tail(last_line))
                .flatten()
        };
        let balance = || self.check_balance.then(|| imbalance(text)).flatten();
        let content = || self.check_content.then(|| mid_unit(text)).flatten();

        match self.mode {
            DetectionMode::Minimal => terminal(),
            DetectionMode::Combined => terminal().or_else(balance).or_else(content),
            DetectionMode::Conservative => match (terminal(), balance()) {
                (Some(signal), Some(_)) => Some(signal),
                _ => None,
            },
        }
    }
}

fn last_non_blank_line(text: &str) -> Option<&str> {
    text.lines()
        .rev()
        .map(str::trim_end)
        .find(|line| !line.trim().is_empty())
}

// ── Layer 2: terminal character ─────────────────────────────────────────────

fn is_terminal_char(c: char) -> bool {
    if c.is_alphanumeric() {
        return true;
    }
    if matches!(
        c,
        '.' | '!' | '?' | '%' | '"' | '\'' | '`' | '*' | '_' | '~' | '|' | ')' | ']' | '}' | '>'
    ) {
        return true;
    }
    if c.is_ascii() {
        return false;
    }
    // Non-ASCII: CJK sentence enders, closing brackets, emoji are fine;
    // separators and opening brackets are not.
    !matches!(
        c,
        '，' | '、' | '：' | '；' | '（' | '【' | '《' | '「' | '『' | '〈' | '—' | '–' | '·'
    )
}

fn ends_with_url_or_file(line: &str) -> bool {
    let Some(token) = line.split_whitespace().last() else {
        return false;
    };
    if let Ok(url) = url::Url::parse(token)
        && matches!(url.scheme(), "http" | "https")
    {
        return true;
    }
    token
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && FILE_EXTENSIONS.contains(&ext))
}

fn dangling_tail(last_line: &str) -> Option<TruncationSignal> {
    let last_char = last_line.chars().last()?;
    if is_terminal_char(last_char) || ends_with_url_or_file(last_line) {
        return None;
    }
    Some(TruncationSignal::DanglingTail { last_char })
}

// ── Layer 3: structural balance ─────────────────────────────────────────────

fn imbalance(text: &str) -> Option<TruncationSignal> {
    let fences = text
        .lines()
        .filter(|line| line.trim_start().starts_with("```"))
        .count();
    if fences % 2 == 1 {
        return Some(TruncationSignal::Unbalanced {
            kind: Imbalance::CodeFence,
        });
    }

    const PAIRS: [(char, char); 6] = [
        ('(', ')'),
        ('[', ']'),
        ('{', '}'),
        ('（', '）'),
        ('【', '】'),
        ('「', '」'),
    ];
    // Only unclosed openers count: a stray closer is usually a smiley or "1)".
    for (open, close) in PAIRS {
        let opens = text.chars().filter(|&c| c == open).count();
        let closes = text.chars().filter(|&c| c == close).count();
        if opens > closes {
            return Some(TruncationSignal::Unbalanced {
                kind: Imbalance::Bracket,
            });
        }
    }

    let straight = text.chars().filter(|&c| c == '"').count();
    let curly_open = text.chars().filter(|&c| c == '“').count();
    let curly_close = text.chars().filter(|&c| c == '”').count();
    if straight % 2 == 1 || curly_open > curly_close {
        return Some(TruncationSignal::Unbalanced {
            kind: Imbalance::Quote,
        });
    }
    None
}

// ── Layer 4: content-type checks ────────────────────────────────────────────

pub fn classify(text: &str) -> ContentKind {
    let trimmed = text.trim();
    if trimmed.starts_with('{')
        || (trimmed.starts_with('[')
            && trimmed[1..]
                .trim_start()
                .starts_with(|c: char| matches!(c, '{' | '[' | '"' | ']' | '-') || c.is_ascii_digit()))
    {
        return ContentKind::Json;
    }
    let last = last_non_blank_line(text).unwrap_or_default();
    if last.trim_start().starts_with('|') {
        return ContentKind::Table;
    }
    if text.contains("```") {
        return ContentKind::Code;
    }
    if LIST_ITEM.is_match(last) {
        return ContentKind::List;
    }
    ContentKind::Prose
}

fn mid_unit(text: &str) -> Option<TruncationSignal> {
    let kind = classify(text);
    let last = last_non_blank_line(text).unwrap_or_default();
    let cut = match kind {
        ContentKind::Json => serde_json::from_str::<serde_json::Value>(text.trim()).is_err(),
        ContentKind::Table => !last.ends_with('|'),
        ContentKind::List => BARE_LIST_MARKER.is_match(last),
        ContentKind::Code => {
            let fences = text
                .lines()
                .filter(|line| line.trim_start().starts_with("```"))
                .count();
            fences % 2 == 1 || last.ends_with('\\')
        }
        ContentKind::Prose => false,
    };
    cut.then_some(TruncationSignal::MidUnit { kind })
}
