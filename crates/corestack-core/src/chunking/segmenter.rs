//! Sentence splitting.
//!
//! `regex`'s engine has no lookbehind support, so the abbreviation and
//! decimal-number exceptions ("skip single-letter capitalized
//! abbreviations and decimal numbers") are implemented as a manual
//! boundary scan instead of a single lookbehind-based pattern.

/// Split `text` into trimmed, non-empty sentences.
///
/// A `.`/`!`/`?` ends a sentence unless it is immediately preceded by a
/// single uppercase letter (`Dr.`) or immediately surrounded by digits
/// (`3.14`).
pub fn sentence_split(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if matches!(c, '.' | '!' | '?') && !is_suppressed_boundary(&chars, i) {
            let end = i + 1;
            push_trimmed(&chars, start, end, &mut sentences);
            start = end;
        }
        i += 1;
    }
    if start < chars.len() {
        push_trimmed(&chars, start, chars.len(), &mut sentences);
    }
    sentences
}

fn is_suppressed_boundary(chars: &[char], dot_index: usize) -> bool {
    is_abbreviation(chars, dot_index) || is_decimal(chars, dot_index)
}

/// `.` preceded by exactly one uppercase letter that is itself either
/// at the start of the text or preceded by whitespace: `Dr.`, `A.`.
fn is_abbreviation(chars: &[char], dot_index: usize) -> bool {
    if chars[dot_index] != '.' || dot_index == 0 {
        return false;
    }
    let letter = chars[dot_index - 1];
    if !letter.is_ascii_uppercase() {
        return false;
    }
    dot_index < 2 || chars[dot_index - 2].is_whitespace()
}

/// `.` with a digit on both sides: `3.14`.
fn is_decimal(chars: &[char], dot_index: usize) -> bool {
    if chars[dot_index] != '.' {
        return false;
    }
    let before_digit = dot_index > 0 && chars[dot_index - 1].is_ascii_digit();
    let after_digit = dot_index + 1 < chars.len() && chars[dot_index + 1].is_ascii_digit();
    before_digit && after_digit
}

fn push_trimmed(chars: &[char], start: usize, end: usize, out: &mut Vec<String>) {
    let s: String = chars[start..end].iter().collect();
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}
