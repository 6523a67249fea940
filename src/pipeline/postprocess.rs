//! Post-processing: deterministic cleanup of oracle answers.
//!
//! Models wrap JSON in ```json fences despite being asked not to, pad
//! addresses with line breaks, and shout or whisper names. These pure
//! `&str → String` helpers normalise answers before they are compared or
//! stored.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```\s*$").expect("valid regex"));

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip one outer Markdown code fence, if present.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = FENCE_RE.captures(trimmed) {
        caps[1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Collapse every whitespace run to one space and trim.
pub fn collapse_whitespace(input: &str) -> String {
    WHITESPACE_RE.replace_all(input, " ").trim().to_string()
}

/// Canonical form of a postal address: single-spaced, upper-cased.
pub fn normalise_address(input: &str) -> String {
    collapse_whitespace(input).to_uppercase()
}

/// Title-case a name: a letter is upper-cased when it follows a
/// non-letter, lower-cased otherwise (`o'BRIEN-smith` → `O'Brien-Smith`).
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_is_letter = false;
    for c in collapse_whitespace(input).chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// `"John Smith"` → `"Smith, John"`; `None` for single-word names.
pub fn reversed_name(name: &str) -> Option<String> {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [first, .., last] => Some(format!("{last}, {first}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```json\n[{\"a\": 1}]\n```";
        assert_eq!(strip_code_fences(input), "[{\"a\": 1}]");
    }

    #[test]
    fn test_strip_fences_no_lang() {
        assert_eq!(strip_code_fences("```\n[]\n```\n"), "[]");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fences("  [1, 2] "), "[1, 2]");
    }

    #[test]
    fn test_normalise_address() {
        assert_eq!(
            normalise_address("  12 King St W\n  Toronto,\tON  M5H 1A1 "),
            "12 KING ST W TORONTO, ON M5H 1A1"
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("john smith"), "John Smith");
        assert_eq!(title_case("JOHN  SMITH"), "John Smith");
        assert_eq!(title_case("mary o'brien-jones"), "Mary O'Brien-Jones");
    }

    #[test]
    fn test_reversed_name() {
        assert_eq!(reversed_name("John Smith").as_deref(), Some("Smith, John"));
        assert_eq!(reversed_name("John A. Smith").as_deref(), Some("Smith, John"));
        assert_eq!(reversed_name("Cher"), None);
    }
}
