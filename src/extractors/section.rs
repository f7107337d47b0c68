// src/extractors/section.rs

// --- Imports ---
use std::fmt;
use std::path::Path;

use crate::utils::error::{AppError, ExtractError};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

// --- Constants ---
/// Key used when no heading of any kind is found.
pub const FULL_REPORT_SECTION: &str = "Full Report";

/// Headings of the engineering-report template, in template order.
pub const DEFAULT_HEADINGS: &[&str] = &[
    "Transmittal Letter",
    "Title Page",
    "Abstract",
    "Executive Summary",
    "Table of Contents",
    "List of Figures",
    "List of Tables",
    "Introduction",
    "Location",
    "Cable-stayed Technology",
    "Main Hall Acoustics",
    "Materials",
    "Design Considerations",
    "Floor Plans",
    "Conclusion",
    "References",
    "Appendices",
    "Acknowledgments",
];

// --- Regex Patterns (Lazy Static) ---
// A line made only of uppercase letters, spaces and ampersands, optionally
// closed by a colon. Callers keep only lines with a line break on both sides.
static UPPERCASE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([A-Z][A-Z &]+):?\r?$").expect("Failed to compile UPPERCASE_LINE_RE")
});

// --- Configuration ---
/// What to do when the same heading name occurs more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DuplicatePolicy {
    /// The later body replaces the earlier one; the key keeps its first position.
    #[default]
    Overwrite,
    /// Bodies are joined with a blank line under the first key.
    Append,
    /// Later occurrences get their own key: "Name (2)", "Name (3)", ...
    Number,
}

/// When the uppercase-line heuristic is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FallbackMode {
    /// Only when no known heading matched anywhere in the document.
    #[default]
    Document,
    /// Additionally inside every known section, splitting off unrecognized
    /// uppercase headings.
    PerGap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmenterConfig {
    pub headings: Vec<String>,
    pub duplicates: DuplicatePolicy,
    pub fallback: FallbackMode,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            headings: DEFAULT_HEADINGS.iter().map(|h| h.to_string()).collect(),
            duplicates: DuplicatePolicy::default(),
            fallback: FallbackMode::default(),
        }
    }
}

impl SegmenterConfig {
    /// Reads a heading vocabulary file: one heading per line, blank lines and
    /// `#` comments ignored.
    pub fn load_headings<P: AsRef<Path>>(path: P) -> Result<Vec<String>, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let headings = parse_heading_list(&raw);
        tracing::info!("Loaded {} headings from {}", headings.len(), path.display());
        if headings.is_empty() {
            return Err(AppError::Config(format!("Heading file {} contains no headings", path.display())));
        }
        Ok(headings)
    }
}

fn parse_heading_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

// --- Data Structures ---
/// How a heading occurrence was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingSource {
    Vocabulary,
    UppercaseLine,
}

impl fmt::Display for HeadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadingSource::Vocabulary => write!(f, "vocabulary"),
            HeadingSource::UppercaseLine => write!(f, "uppercase"),
        }
    }
}

/// One heading occurrence. `start..end` spans the whole match including the
/// trailing colon/line break; the section body begins at `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingMatch {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub source: HeadingSource,
}

// --- Main Segmenter Structure ---
pub struct SectionSegmenter {
    known_heading_re: Regex,
    duplicates: DuplicatePolicy,
    fallback: FallbackMode,
}

impl SectionSegmenter {
    /// Compiles the vocabulary into a single case-insensitive alternation.
    pub fn new(config: &SegmenterConfig) -> Result<Self, ExtractError> {
        let alternatives: Vec<String> = config
            .headings
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(|h| {
                // `\b` only anchors before a word character.
                let boundary = if h.starts_with(|c: char| c.is_alphanumeric() || c == '_') { r"\b" } else { "" };
                format!("{}{}", boundary, regex::escape(h))
            })
            .collect();
        if alternatives.is_empty() {
            return Err(ExtractError::EmptyVocabulary);
        }

        // Heading must be followed (after optional whitespace) by a colon or a line break.
        let pattern = format!(r"(?i)(?P<heading>{})\s*[:\n]", alternatives.join("|"));
        let known_heading_re = Regex::new(&pattern)?;
        tracing::debug!("Compiled heading matcher over {} headings", alternatives.len());

        Ok(Self { known_heading_re, duplicates: config.duplicates, fallback: config.fallback })
    }

    /// Heading occurrences in document order, after applying the fallback policy.
    pub fn find_headings(&self, text: &str) -> Vec<HeadingMatch> {
        let mut matches: Vec<HeadingMatch> = self
            .known_heading_re
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let heading = caps.name("heading")?;
                Some(HeadingMatch {
                    name: heading.as_str().trim().to_string(),
                    start: whole.start(),
                    end: whole.end(),
                    source: HeadingSource::Vocabulary,
                })
            })
            .collect();

        if matches.is_empty() {
            tracing::debug!("No known headings found; trying uppercase-line fallback");
            return uppercase_headings(text);
        }

        if self.fallback == FallbackMode::PerGap {
            let body_start = matches[0].end;
            let extra: Vec<HeadingMatch> = uppercase_headings(text)
                .into_iter()
                .filter(|m| m.start >= body_start)
                .filter(|m| !matches.iter().any(|k| m.start < k.end && k.start < m.end))
                .collect();
            if !extra.is_empty() {
                tracing::debug!("Per-gap fallback added {} uppercase headings", extra.len());
                matches.extend(extra);
                matches.sort_by_key(|m| m.start);
            }
        }

        matches
    }

    /// Splits `text` into named sections. Never returns an empty map.
    pub fn segment(&self, text: &str) -> IndexMap<String, String> {
        let headings = self.find_headings(text);
        let mut sections: IndexMap<String, String> = IndexMap::new();

        if headings.is_empty() {
            tracing::info!("No headings found; storing whole text as '{}'", FULL_REPORT_SECTION);
            sections.insert(FULL_REPORT_SECTION.to_string(), text.to_string());
            return sections;
        }

        for (i, heading) in headings.iter().enumerate() {
            let end = headings.get(i + 1).map_or(text.len(), |next| next.start);
            let body = text[heading.end..end].trim().to_string();
            tracing::trace!("Section '{}' ({}): {} chars", heading.name, heading.source, body.len());
            self.insert_section(&mut sections, heading.name.clone(), body);
        }

        tracing::info!("Segmented text into {} sections", sections.len());
        sections
    }

    fn insert_section(&self, sections: &mut IndexMap<String, String>, name: String, body: String) {
        if !sections.contains_key(&name) {
            sections.insert(name, body);
            return;
        }

        match self.duplicates {
            DuplicatePolicy::Overwrite => {
                tracing::debug!("Heading '{}' repeated; later body replaces earlier", name);
                sections.insert(name, body);
            }
            DuplicatePolicy::Append => {
                if let Some(existing) = sections.get_mut(&name) {
                    if existing.is_empty() {
                        *existing = body;
                    } else if !body.is_empty() {
                        existing.push_str("\n\n");
                        existing.push_str(&body);
                    }
                }
            }
            DuplicatePolicy::Number => {
                let key = (2..)
                    .map(|n| format!("{} ({})", name, n))
                    .find(|candidate| !sections.contains_key(candidate))
                    .unwrap_or_else(|| name.clone());
                sections.insert(key, body);
            }
        }
    }
}

/// Lines of uppercase letters, spaces and ampersands, in document order.
/// The first and last line of the text never count: a heading needs a line
/// break before and after it.
fn uppercase_headings(text: &str) -> Vec<HeadingMatch> {
    UPPERCASE_LINE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if whole.start() == 0 || whole.end() >= text.len() {
                return None;
            }
            let heading = caps.get(1)?;
            Some(HeadingMatch {
                name: heading.as_str().trim().to_string(),
                start: whole.start(),
                end: whole.end(),
                source: HeadingSource::UppercaseLine,
            })
        })
        .collect()
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> SectionSegmenter {
        SectionSegmenter::new(&SegmenterConfig::default()).unwrap()
    }

    fn segmenter_with(headings: &[&str], duplicates: DuplicatePolicy, fallback: FallbackMode) -> SectionSegmenter {
        SectionSegmenter::new(&SegmenterConfig {
            headings: headings.iter().map(|h| h.to_string()).collect(),
            duplicates,
            fallback,
        })
        .unwrap()
    }

    #[test]
    fn test_known_headings_split_text() {
        let text = "Client: Acme Corp\nIntroduction:\nHello world\nConclusion:\nThe end\n";
        let sections = segmenter_with(&["Introduction", "Conclusion"], DuplicatePolicy::Overwrite, FallbackMode::Document)
            .segment(text);

        let pairs: Vec<(&str, &str)> = sections.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, vec![("Introduction", "Hello world"), ("Conclusion", "The end")]);
    }

    #[test]
    fn test_heading_requires_colon_or_line_break() {
        let text = "Introduction\nThe introduction covers the scope.\nConclusion: fine";
        let sections = segmenter().segment(text);

        let keys: Vec<&str> = sections.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Introduction", "Conclusion"]);
        assert_eq!(sections["Introduction"], "The introduction covers the scope.");
        assert_eq!(sections["Conclusion"], "fine");
    }

    #[test]
    fn test_heading_inside_a_word_is_not_matched() {
        let text = "Relocation:\nmoved\nConclusion:\ndone";
        let sections = segmenter().segment(text);
        assert!(!sections.contains_key("Location"));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections["Conclusion"], "done");
    }

    #[test]
    fn test_matching_is_case_insensitive_but_keys_keep_matched_casing() {
        let lower = segmenter().segment("introduction:\nbody text\n");
        let upper = segmenter().segment("INTRODUCTION:\nbody text\n");

        assert_eq!(lower.get("introduction").map(String::as_str), Some("body text"));
        assert_eq!(upper.get("INTRODUCTION").map(String::as_str), Some("body text"));
        assert_eq!(lower.values().collect::<Vec<_>>(), upper.values().collect::<Vec<_>>());
    }

    #[test]
    fn test_adjacent_headings_produce_empty_body() {
        let sections = segmenter().segment("Abstract:\nConclusion:\nDone\n");
        assert_eq!(sections["Abstract"], "");
        assert_eq!(sections["Conclusion"], "Done");
    }

    #[test]
    fn test_text_before_first_heading_is_not_a_section() {
        let sections = segmenter().segment("Preamble line\nAbstract:\nShort\n");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections["Abstract"], "Short");
    }

    #[test]
    fn test_uppercase_fallback_when_no_known_heading() {
        let text = "Cover page\nSCOPE OF WORK\nInspect tubes.\nFINDINGS & RESULTS:\nCorrosion found.\n";
        let sections = segmenter().segment(text);

        let pairs: Vec<(&str, &str)> = sections.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, vec![("SCOPE OF WORK", "Inspect tubes."), ("FINDINGS & RESULTS", "Corrosion found.")]);
    }

    #[test]
    fn test_consecutive_uppercase_lines_are_each_headings() {
        let sections = segmenter().segment("\nPART ONE\nSUMMARY\nbody\n");
        assert_eq!(sections["PART ONE"], "");
        assert_eq!(sections["SUMMARY"], "body");
    }

    #[test]
    fn test_uppercase_first_line_is_not_a_heading() {
        let text = "MEE REPORT\nthe boiler tube failed due to corrosion\n";
        let sections = segmenter().segment(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[FULL_REPORT_SECTION], text);
    }

    #[test]
    fn test_uppercase_last_line_without_line_break_is_not_a_heading() {
        let text = "body text\nFINAL NOTES";
        let sections = segmenter().segment(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[FULL_REPORT_SECTION], text);
    }

    #[test]
    fn test_fallback_is_all_or_nothing_in_document_mode() {
        let text = "Introduction:\nintro text\nSCOPE OF WORK\nmore text\n";
        let sections = segmenter().segment(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections["Introduction"], "intro text\nSCOPE OF WORK\nmore text");
    }

    #[test]
    fn test_per_gap_fallback_splits_unknown_uppercase_headings() {
        let text = "Introduction:\nintro text\nSCOPE OF WORK\nmore text\nConclusion:\nend\n";
        let sections = segmenter_with(DEFAULT_HEADINGS, DuplicatePolicy::Overwrite, FallbackMode::PerGap).segment(text);

        let pairs: Vec<(&str, &str)> = sections.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![("Introduction", "intro text"), ("SCOPE OF WORK", "more text"), ("Conclusion", "end")]
        );
    }

    #[test]
    fn test_per_gap_fallback_does_not_double_count_known_uppercase_headings() {
        let text = "INTRODUCTION:\nintro\nCONCLUSION:\nend\n";
        let sections = segmenter_with(DEFAULT_HEADINGS, DuplicatePolicy::Overwrite, FallbackMode::PerGap).segment(text);
        let keys: Vec<&str> = sections.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["INTRODUCTION", "CONCLUSION"]);
    }

    #[test]
    fn test_no_headings_yields_full_report() {
        let text = "just some lowercase prose\nwith no headings at all";
        let sections = segmenter().segment(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[FULL_REPORT_SECTION], text);
    }

    #[test]
    fn test_empty_text_yields_empty_full_report() {
        let sections = segmenter().segment("");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[FULL_REPORT_SECTION], "");
    }

    #[test]
    fn test_duplicate_overwrite_keeps_first_position_and_last_body() {
        let text = "References:\nfirst\nAbstract:\nsummary\nReferences:\nsecond\n";
        let sections = segmenter().segment(text);

        let pairs: Vec<(&str, &str)> = sections.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, vec![("References", "second"), ("Abstract", "summary")]);
    }

    #[test]
    fn test_duplicate_append_joins_bodies() {
        let text = "References:\nfirst\nReferences:\nsecond\n";
        let sections = segmenter_with(DEFAULT_HEADINGS, DuplicatePolicy::Append, FallbackMode::Document).segment(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections["References"], "first\n\nsecond");
    }

    #[test]
    fn test_duplicate_number_disambiguates_keys() {
        let text = "References:\nfirst\nReferences:\nsecond\nReferences:\nthird\n";
        let sections = segmenter_with(DEFAULT_HEADINGS, DuplicatePolicy::Number, FallbackMode::Document).segment(text);

        let pairs: Vec<(&str, &str)> = sections.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![("References", "first"), ("References (2)", "second"), ("References (3)", "third")]
        );
    }

    #[test]
    fn test_bodies_and_headings_reconstruct_text() {
        let text = "Abstract:\n  a  \nIntroduction:\nb\nConclusion:\nc";
        let seg = segmenter();
        let headings = seg.find_headings(text);
        let sections = seg.segment(text);

        let mut rebuilt = String::new();
        for (heading, body) in headings.iter().zip(sections.values()) {
            rebuilt.push_str(&text[heading.start..heading.end]);
            rebuilt.push('\n');
            rebuilt.push_str(body);
            rebuilt.push('\n');
        }
        let squash = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(squash(&rebuilt), squash(text));
    }

    #[test]
    fn test_empty_vocabulary_is_rejected() {
        let config = SegmenterConfig { headings: vec!["  ".to_string()], ..SegmenterConfig::default() };
        assert!(matches!(SectionSegmenter::new(&config), Err(ExtractError::EmptyVocabulary)));
    }

    #[test]
    fn test_custom_vocabulary_with_regex_metacharacters() {
        let sections = segmenter_with(&["Q&A (Part 1)"], DuplicatePolicy::Overwrite, FallbackMode::Document)
            .segment("Q&A (Part 1):\nanswers\n");
        assert_eq!(sections["Q&A (Part 1)"], "answers");
    }

    #[test]
    fn test_heading_starting_with_punctuation_is_matched() {
        let sections = segmenter_with(&["(Appendix)"], DuplicatePolicy::Overwrite, FallbackMode::Document)
            .segment("(Appendix):\nx");
        let pairs: Vec<(&str, &str)> = sections.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, vec![("(Appendix)", "x")]);
    }

    #[test]
    fn test_load_headings_reads_file_and_rejects_empty_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headings.txt");
        std::fs::write(&path, "Scope\n# skipped\nFindings\n").unwrap();
        assert_eq!(SegmenterConfig::load_headings(&path).unwrap(), vec!["Scope".to_string(), "Findings".to_string()]);

        std::fs::write(&path, "# nothing here\n").unwrap();
        assert!(matches!(SegmenterConfig::load_headings(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_parse_heading_list_skips_comments_and_blanks() {
        let parsed = parse_heading_list("# template v2\nScope\n\n  Findings  \n#Draft\n");
        assert_eq!(parsed, vec!["Scope".to_string(), "Findings".to_string()]);
    }
}
