//! Oracle-independent token estimate shared by every section parser.
//!
//! Window budgets only need a stable, monotonic measure of passage size,
//! not the exact count of any particular model's tokenizer. Using one
//! estimator everywhere keeps window boundaries identical no matter which
//! provider answers the extraction questions.

/// Estimate the token count of `text`.
///
/// ~4 characters per token for Latin and Cyrillic scripts, ~2 for CJK
/// ideographs and kana, ~5 for Arabic.
pub fn count(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    if text.is_ascii() {
        return text.len() / 4;
    }

    let mut chars = 0;
    let mut cjk = 0;
    let mut arabic = 0;

    for c in text.chars() {
        chars += 1;
        if is_cjk(c) {
            cjk += 1;
        } else if is_arabic(c) {
            arabic += 1;
        }
    }

    if cjk > 0 {
        (cjk / 2) + ((chars - cjk) / 4)
    } else if arabic > chars / 2 {
        chars / 5
    } else {
        chars / 4
    }
}

#[inline]
fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3040..=0x309F // Hiragana
        | 0x30A0..=0x30FF // Katakana
        | 0xAC00..=0xD7AF // Hangul
    )
}

#[inline]
fn is_arabic(c: char) -> bool {
    matches!(c as u32,
        0x0600..=0x06FF
        | 0x0750..=0x077F
        | 0x08A0..=0x08FF
        | 0xFB50..=0xFDFF
        | 0xFE70..=0xFEFF
    )
}
