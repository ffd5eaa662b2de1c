//! Fixed-token windowing over a sentence stream.

/// A contiguous run of whitespace-delimited tokens, with its token
/// offsets into the reconstructed source text.
#[derive(Debug, Clone)]
pub struct Window {
    pub start_token: usize,
    pub end_token: usize,
    pub text: String,
}

/// Tokenize `sentences` (joined with a single space) into whitespace
/// tokens, then slide fixed-size windows over them with `overlap`
/// tokens shared between consecutive windows.
///
/// `overlap` is clamped to `< window_size` to guarantee forward
/// progress. The final window may be shorter than `window_size` if
/// fewer tokens remain.
pub fn windowize(sentences: &[String], window_size: usize, overlap: usize) -> Vec<Window> {
    let joined = sentences.join(" ");
    let tokens: Vec<&str> = joined.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let window_size = window_size.max(1);
    let overlap = overlap.min(window_size.saturating_sub(1));
    let stride = window_size - overlap;

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < tokens.len() {
        let end = (start + window_size).min(tokens.len());
        windows.push(Window {
            start_token: start,
            end_token: end,
            text: tokens[start..end].join(" "),
        });
        if end == tokens.len() {
            break;
        }
        start += stride;
    }
    windows
}

/// Midpoint of the `windowSize/4`-`windowSize/3` overlap range, used
/// when the caller has no punctuation-based overlap to fall back on.
pub fn default_overlap(window_size: usize) -> usize {
    (window_size / 4 + window_size / 3) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("word{i}")).collect()
    }

    #[test]
    fn single_window_when_input_shorter_than_window_size() {
        let windows = windowize(&sentences(5), 200, 50);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_token, 0);
        assert_eq!(windows[0].end_token, 5);
    }

    #[test]
    fn consecutive_windows_overlap_by_requested_amount() {
        let windows = windowize(&sentences(20), 10, 4);
        assert!(windows.len() >= 2);
        assert_eq!(windows[1].start_token, windows[0].end_token - 4);
    }

    #[test]
    fn empty_input_produces_no_windows() {
        assert!(windowize(&[], 200, 50).is_empty());
    }
}
