//! Bracket normalization and tag matching.
//!
//! Models emit envelope tags in several angle-bracket styles: `<THINK>`,
//! `＜THINK＞`, `《THINK》`, `〈/THINK〉`. Instead of one pattern per style,
//! text is first mapped onto a canonical form where every angle bracket is
//! `<` or `>` and every slash is `/`. Round and square brackets stay as they
//! are, since prose like "I (think) so" must never read as a tag. Tag analysis runs on the canonical text; matched spans are mapped
//! back to byte ranges of the original so callers can slice or strip it.

use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};
use std::ops::Range;

fn canonical_char(c: char) -> char {
    match c {
        '＜' | '《' | '〈' => '<',
        '＞' | '》' | '〉' => '>',
        '／' | '\\' | '＼' => '/',
        other => other,
    }
}

/// Text mapped onto canonical brackets, with an offset table back to the source.
#[derive(Debug)]
pub struct NormalizedText<'a> {
    original: &'a str,
    canonical: String,
    /// `origin[i]` is the byte offset in `original` of canonical byte `i`;
    /// one trailing entry maps the end of the text.
    origin: Vec<usize>,
}

impl<'a> NormalizedText<'a> {
    pub fn new(original: &'a str) -> Self {
        let mut canonical = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len() + 1);
        for (offset, c) in original.char_indices() {
            let before = canonical.len();
            canonical.push(canonical_char(c));
            origin.extend(std::iter::repeat_n(offset, canonical.len() - before));
        }
        origin.push(original.len());
        Self {
            original,
            canonical,
            origin,
        }
    }

    pub fn original(&self) -> &'a str {
        self.original
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Map a canonical byte range onto the original text.
    pub fn original_range(&self, range: Range<usize>) -> Range<usize> {
        self.origin[range.start]..self.origin[range.end]
    }
}

/// Strip every bracket, slash and surrounding whitespace: `</THINK>` -> `THINK`.
pub fn tag_core(tag: &str) -> String {
    tag.chars()
        .map(canonical_char)
        .collect::<String>()
        .trim_matches(|c: char| matches!(c, '<' | '>' | '/') || c.is_whitespace())
        .to_string()
}

fn build(pattern: &str, tag: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| ConfigError::Pattern {
            pattern: tag.to_string(),
            message: e.to_string(),
        })
}

/// Matcher for one open/close tag pair, tolerant of bracket style, case and
/// inner whitespace.
#[derive(Debug, Clone)]
pub struct TagPattern {
    name: String,
    open: Regex,
    close: Regex,
    any: Regex,
    region: Regex,
}

impl TagPattern {
    /// A tag whose open and close forms share one core, e.g. `COMMAND`.
    pub fn new(tag: &str) -> Result<Self, ConfigError> {
        Self::pair(tag, tag)
    }

    pub fn pair(open_tag: &str, close_tag: &str) -> Result<Self, ConfigError> {
        let open_core = tag_core(open_tag);
        let close_core = tag_core(close_tag);
        if open_core.is_empty() || close_core.is_empty() {
            return Err(ConfigError::Validation(format!(
                "tag {open_tag:?}/{close_tag:?} has no name between its brackets"
            )));
        }
        let open_core_re = regex::escape(&open_core);
        let close_core_re = regex::escape(&close_core);

        let open = build(&format!(r"<\s*{open_core_re}\s*>"), open_tag)?;
        let close = build(&format!(r"<\s*/\s*{close_core_re}\s*>"), close_tag)?;
        let any = build(
            &format!(r"<\s*(?:{open_core_re}|/\s*{close_core_re})\s*>"),
            open_tag,
        )?;
        let region = build(
            &format!(r"<\s*{open_core_re}\s*>(?P<content>.*?)<\s*/\s*{close_core_re}\s*>"),
            open_tag,
        )?;

        Ok(Self {
            name: open_core,
            open,
            close,
            any,
            region,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_marker(&self, text: &NormalizedText<'_>) -> bool {
        self.any.is_match(text.canonical())
    }

    /// `(opening markers, closing markers)`.
    pub fn counts(&self, text: &NormalizedText<'_>) -> (usize, usize) {
        (
            self.open.find_iter(text.canonical()).count(),
            self.close.find_iter(text.canonical()).count(),
        )
    }

    /// Markers present but the regions they delimit are not all complete.
    pub fn is_incomplete(&self, text: &NormalizedText<'_>) -> bool {
        let (opens, closes) = self.counts(text);
        if opens == 0 && closes == 0 {
            return false;
        }
        if !self.region.is_match(text.canonical()) {
            return true;
        }
        opens != closes
    }

    /// Original-text byte ranges of every marker, in order.
    pub fn marker_spans(&self, text: &NormalizedText<'_>) -> Vec<Range<usize>> {
        self.any
            .find_iter(text.canonical())
            .map(|m| text.original_range(m.range()))
            .collect()
    }

    /// Complete regions as `(whole region, inner content)` original-text ranges.
    pub fn regions(&self, text: &NormalizedText<'_>) -> Vec<(Range<usize>, Range<usize>)> {
        self.region
            .captures_iter(text.canonical())
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let content = caps.name("content")?;
                Some((
                    text.original_range(whole.range()),
                    text.original_range(content.range()),
                ))
            })
            .collect()
    }

    /// Remove every marker, keeping the text between them.
    pub fn strip_markers(&self, original: &str) -> String {
        let normalized = NormalizedText::new(original);
        remove_ranges(original, &self.marker_spans(&normalized))
    }

    /// Remove complete regions and any stray marker left over.
    pub fn strip_regions(&self, original: &str) -> String {
        let normalized = NormalizedText::new(original);
        let regions: Vec<Range<usize>> = self
            .regions(&normalized)
            .into_iter()
            .map(|(whole, _)| whole)
            .collect();
        let without_regions = remove_ranges(original, &regions);
        self.strip_markers(&without_regions)
    }
}

/// Remove non-overlapping, ascending byte ranges from `text`.
pub fn remove_ranges(text: &str, ranges: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for range in ranges {
        if range.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..range.start]);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_unifies_bracket_families() {
        let text = NormalizedText::new("＜THINK＞a《/THINK》〈x〉(y)[z]");
        assert_eq!(text.canonical(), "<THINK>a</THINK><x>(y)[z]");
    }

    #[test]
    fn original_range_maps_multibyte_offsets() {
        let text = NormalizedText::new("前＜T＞");
        let start = text.canonical().find('<').unwrap();
        let range = text.original_range(start..start + 1);
        assert_eq!(&text.original()[range], "＜");
    }

    #[test]
    fn tag_core_strips_brackets_and_slash() {
        assert_eq!(tag_core("</THINK>"), "THINK");
        assert_eq!(tag_core("＜ROSAOS＞"), "ROSAOS");
        assert_eq!(tag_core(" COMMAND "), "COMMAND");
    }

    #[test]
    fn detects_markers_in_any_bracket_style_and_case() {
        let tag = TagPattern::pair("<THINK>", "</THINK>").unwrap();
        for text in ["<think>", "＜ THINK ＞", "《/Think》", "〈THINK〉"] {
            assert!(tag.has_marker(&NormalizedText::new(text)), "{text}");
        }
        assert!(!tag.has_marker(&NormalizedText::new("I think so")));
    }

    #[test]
    fn round_and_square_brackets_are_not_markers() {
        let tag = TagPattern::pair("<THINK>", "</THINK>").unwrap();
        for text in ["I (think) so", "[think]", "[/THINK]", "（THINK）", "【THINK】"] {
            assert!(!tag.has_marker(&NormalizedText::new(text)), "{text}");
        }
        let command = TagPattern::new("COMMAND").unwrap();
        assert!(!command.is_incomplete(&NormalizedText::new("usage: git [command] [args]")));
    }

    #[test]
    fn counts_open_and_close_separately() {
        let tag = TagPattern::new("COMMAND").unwrap();
        let text = NormalizedText::new("<COMMAND>a</COMMAND><COMMAND>b");
        assert_eq!(tag.counts(&text), (2, 1));
        assert!(tag.is_incomplete(&text));
    }

    #[test]
    fn complete_regions_are_not_incomplete() {
        let tag = TagPattern::new("DOSSIER_UPDATE").unwrap();
        assert!(!tag.is_incomplete(&NormalizedText::new(
            "x ＜DOSSIER_UPDATE＞note＜/DOSSIER_UPDATE＞ y"
        )));
        assert!(tag.is_incomplete(&NormalizedText::new("</DOSSIER_UPDATE> only")));
        assert!(!tag.is_incomplete(&NormalizedText::new("no tags")));
    }

    #[test]
    fn regions_map_back_to_original_text() {
        let tag = TagPattern::new("COMMAND").unwrap();
        let source = "hi ＜COMMAND＞ /weather  tokyo ＜／COMMAND＞ bye";
        let text = NormalizedText::new(source);
        let regions = tag.regions(&text);
        assert_eq!(regions.len(), 1);
        assert_eq!(source[regions[0].1.clone()].trim(), "/weather  tokyo");
    }

    #[test]
    fn strip_markers_keeps_inner_text() {
        let tag = TagPattern::pair("<THINK>", "</THINK>").unwrap();
        assert_eq!(tag.strip_markers("<THINK>plan</THINK>"), "plan");
        assert_eq!(tag.strip_markers("＜think＞plan"), "plan");
    }

    #[test]
    fn strip_regions_drops_inner_text() {
        let tag = TagPattern::pair("<THINK>", "</THINK>").unwrap();
        assert_eq!(tag.strip_regions("a<THINK>plan</THINK>b<THINK>c"), "abc");
    }

    #[test]
    fn rejects_tag_without_name() {
        assert!(TagPattern::new("<>").is_err());
    }
}
