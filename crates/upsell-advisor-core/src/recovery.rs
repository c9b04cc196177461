//! LLM response recovery pipeline.
//!
//! Model output is nominally JSON but routinely arrives wrapped in code
//! fences, quotes, or prose, or with small syntax slips. Each completion
//! attempt walks a fixed chain of strategies and stops at the first one
//! that yields a value of the required [`Shape`]:
//!
//! ```text
//! RAW ──strip──▶ STRIPPED ──parse──────────────▶ PARSED
//!                   │
//!                   ├──extract {…}/[…] + parse──▶ EXTRACTED
//!                   │
//!                   ├──repair + parse/extract───▶ REPAIRED
//!                   │
//!                   └───────────────────────────▶ FAILED
//! ```
//!
//! Every step is a total function; none panics on arbitrary input.
//! Text that parses as JSON of the wrong shape ends the attempt; it is never
//! mined for an inner value or wrapped into a synthetic array or object. [`RecoveryPipeline`] re-invokes the
//! completion client with the unchanged prompt up to [`MAX_ATTEMPTS`] times
//! and then fails with [`AnalysisError::RecoveryExhausted`]; there is no
//! placeholder result.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::completion::CompletionClient;
use crate::error::{AnalysisError, AttemptFailure};
use crate::models::{Recovered, Shape, Strategy};

/// Completion attempts per prompt.
pub const MAX_ATTEMPTS: usize = 3;

const FENCE: &str = "```";

fn object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

fn array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").unwrap())
}

// ═══════════════════════════════════════════════════════════════════════
// Strategies
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of a strict parse against a required shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Parse {
    Ok(Value),
    /// Valid JSON, but not the required shape. Carries the found type name.
    WrongShape(&'static str),
    Invalid,
}

/// Remove surrounding whitespace, code fences, quotes, and backticks.
///
/// Repeats until nothing changes, so nested wrappers such as a quoted
/// fenced block are peeled completely.
pub fn strip_wrapping(raw: &str) -> &str {
    let mut text = raw.trim();
    loop {
        let before = text.len();
        text = strip_fences(text).trim();
        text = strip_enclosing(text).trim();
        if text.len() == before {
            return text;
        }
    }
}

fn strip_fences(text: &str) -> &str {
    let mut text = text;
    if let Some(after) = text.strip_prefix(FENCE) {
        text = match after.find('\n') {
            // "```json\n..." or "```\n...": drop the whole fence line
            Some(nl) if is_language_tag(&after[..nl]) => &after[nl + 1..],
            Some(_) => after,
            // single-line "```json{...}```"
            None => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(before) = text.trim_end().strip_suffix(FENCE) {
        text = before;
    }
    text
}

fn is_language_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn strip_enclosing(text: &str) -> &str {
    let mut chars = text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if first == last && matches!(first, '"' | '\'' | '`') => {
            &text[first.len_utf8()..text.len() - last.len_utf8()]
        }
        _ => text,
    }
}

/// Strict JSON parse, checked against `shape`.
pub fn parse_strict(text: &str, shape: Shape) -> Parse {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if shape.matches(&value) => Parse::Ok(value),
        Ok(value) => Parse::WrongShape(Shape::of(&value)),
        Err(_) => Parse::Invalid,
    }
}

fn delimiters(shape: Shape) -> (char, char) {
    match shape {
        Shape::Object => ('{', '}'),
        Shape::Array => ('[', ']'),
    }
}

/// The span from the first opener to the last closer of `shape`, if any.
pub fn extract_candidate(text: &str, shape: Shape) -> Option<&str> {
    let re = match shape {
        Shape::Object => object_re(),
        Shape::Array => array_re(),
    };
    re.find(text).map(|m| m.as_str())
}

/// Every balanced `{…}` / `[…]` span of `shape`, longest first.
///
/// Each opener is scanned forward until its depth returns to zero; brackets
/// inside string literals are ignored. Ties keep their order in `text`.
pub fn balanced_candidates(text: &str, shape: Shape) -> Vec<&str> {
    let (open, close) = delimiters(shape);
    let mut spans: Vec<&str> = text
        .char_indices()
        .filter(|&(_, c)| c == open)
        .filter_map(|(start, _)| balanced_span(text, start, open, close))
        .collect();
    spans.sort_by(|a, b| b.len().cmp(&a.len()));
    spans
}

fn balanced_span(text: &str, start: usize, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + offset + c.len_utf8()]);
            }
        }
    }
    None
}

/// Apply the fixed textual repairs: drop trailing commas before `}` / `]`
/// and quote bare object keys.
///
/// Text inside double-quoted strings is copied through untouched.
pub fn repair(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    let mut escaped = false;
    // last non-whitespace character outside a string
    let mut previous: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    in_string = false;
                    previous = Some(c);
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            ',' => {
                let next = skip_whitespace(&chars, i + 1);
                if matches!(chars.get(next), Some('}') | Some(']')) {
                    i = next;
                } else {
                    out.push(c);
                    previous = Some(c);
                    i += 1;
                }
            }
            _ if is_key_start(c) && matches!(previous, Some('{') | Some(',')) => {
                let end = key_end(&chars, i);
                let bare_key = chars.get(skip_whitespace(&chars, end)) == Some(&':');
                if bare_key {
                    out.push('"');
                }
                out.extend(&chars[i..end]);
                if bare_key {
                    out.push('"');
                }
                previous = Some(chars[end - 1]);
                i = end;
            }
            _ => {
                out.push(c);
                if !c.is_whitespace() {
                    previous = Some(c);
                }
                i += 1;
            }
        }
    }
    out
}

fn is_key_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn key_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
        end += 1;
    }
    end
}

fn skip_whitespace(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Run the strategy chain on one raw response.
///
/// Text that is already valid JSON of the wrong shape ends the attempt
/// with [`AttemptFailure::ShapeMismatch`]; nothing is extracted from it.
pub fn recover_text(raw: &str, shape: Shape) -> Result<(Value, Strategy), AttemptFailure> {
    let stripped = strip_wrapping(raw);
    let mismatch = |found| AttemptFailure::ShapeMismatch {
        expected: shape,
        found,
    };

    match parse_strict(stripped, shape) {
        Parse::Ok(value) => return Ok((value, Strategy::Direct)),
        Parse::WrongShape(found) => return Err(mismatch(found)),
        Parse::Invalid => {}
    }

    if let Some(value) = extract(stripped, shape) {
        return Ok((value, Strategy::Extracted));
    }

    let repaired = repair(stripped);
    match parse_strict(&repaired, shape) {
        Parse::Ok(value) => return Ok((value, Strategy::Repaired)),
        Parse::WrongShape(found) => return Err(mismatch(found)),
        Parse::Invalid => {}
    }
    if let Some(value) = extract(&repaired, shape) {
        return Ok((value, Strategy::Repaired));
    }

    Err(AttemptFailure::Unparseable)
}

/// Greedy span first, then balanced spans.
fn extract(text: &str, shape: Shape) -> Option<Value> {
    let parsed = |candidate: &str| match parse_strict(candidate, shape) {
        Parse::Ok(value) => Some(value),
        _ => None,
    };
    extract_candidate(text, shape)
        .and_then(parsed)
        .or_else(|| balanced_candidates(text, shape).into_iter().find_map(parsed))
}

// ═══════════════════════════════════════════════════════════════════════
// Retry loop
// ═══════════════════════════════════════════════════════════════════════

/// Completion + recovery with a bounded attempt budget.
pub struct RecoveryPipeline<'a> {
    client: &'a dyn CompletionClient,
}

impl<'a> RecoveryPipeline<'a> {
    pub fn new(client: &'a dyn CompletionClient) -> Self {
        Self { client }
    }

    /// Complete `prompt` and recover a value of `shape`.
    ///
    /// Parse failures and retryable completion errors consume one attempt
    /// each. A non-retryable completion error (a provider 4xx other than
    /// 429) aborts immediately with [`AnalysisError::CompletionFailed`]
    /// instead of spending the remaining attempts: resending the same
    /// request cannot fix a bad key or a rejected model name.
    pub async fn run(&self, prompt: &str, shape: Shape) -> Result<Recovered, AnalysisError> {
        let mut last = AttemptFailure::Unparseable;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.complete(prompt).await {
                Ok(text) => match recover_text(&text, shape) {
                    Ok((value, strategy)) => {
                        debug!(attempt, ?strategy, model = self.client.model_name(), "recovered completion");
                        return Ok(Recovered {
                            value,
                            strategy,
                            attempt,
                        });
                    }
                    Err(failure) => {
                        warn!(attempt, error = %failure, response_len = text.len(), "unusable completion");
                        last = failure;
                    }
                },
                Err(err) if !err.is_retryable() => {
                    return Err(AnalysisError::CompletionFailed(err));
                }
                Err(err) => {
                    warn!(attempt, error = %err, "completion attempt failed");
                    last = AttemptFailure::Completion(err);
                }
            }
        }

        Err(AnalysisError::RecoveryExhausted {
            attempts: MAX_ATTEMPTS,
            last,
        })
    }
}
