//! Finding extraction from free-form analysis text.
//!
//! The extractor is an ordered, first-match-wins pipeline:
//!
//! 1. bullet lines (`•`, `-`, `*`), up to [`MAX_FINDINGS`];
//! 2. numbered lines (`1. `) topping up a short bullet list;
//! 3. long sentences, only when steps 1 and 2 found nothing;
//! 4. a single default entry.

use std::sync::LazyLock;

use regex::Regex;

/// Upper bound on the number of findings returned.
pub const MAX_FINDINGS: usize = 5;

/// How many sentences the sentence fallback keeps.
pub const MAX_SENTENCE_FINDINGS: usize = 4;

/// Sentences must be longer than this (in characters) to count as findings.
pub const MIN_SENTENCE_CHARS: usize = 20;

/// Entry returned when nothing could be extracted.
pub const DEFAULT_FINDING: &str = "AI analysis completed";

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[•\-*]\s*(.+)$").expect("valid regex"));

static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s+(.+)$").expect("valid regex"));

/// Extract up to [`MAX_FINDINGS`] findings from `text`.
///
/// Never returns an empty list.
pub fn extract_findings(text: &str) -> Vec<String> {
    let mut findings = capture_lines(text, &BULLET_RE, MAX_FINDINGS);

    if findings.len() < MAX_FINDINGS {
        let room = MAX_FINDINGS - findings.len();
        findings.extend(capture_lines(text, &NUMBERED_RE, room));
    }

    if findings.is_empty() {
        findings = sentence_findings(text);
    }

    if findings.is_empty() {
        findings.push(DEFAULT_FINDING.to_string());
    }

    findings
}

/// Collect the trimmed capture of every matching line, up to `limit`.
fn capture_lines(text: &str, re: &Regex, limit: usize) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            re.captures(line.trim())
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .take(limit)
        .collect()
}

fn sentence_findings(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .take(MAX_SENTENCE_FINDINGS)
        .map(str::to_string)
        .collect()
}
