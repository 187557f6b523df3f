//! Inline citation marker detection.
//!
//! Markers are the literal pattern `[<integer>]`. The generation backend emits
//! them in a controlled format, so no markup parsing is attempted.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static MARKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("marker pattern is valid"));

// Marker plus the horizontal whitespace that precedes it
static STRIP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\[(\d+)\]").expect("strip pattern is valid"));

/// Marker numbers in order of first appearance, without repeats.
pub fn marker_numbers(content: &str) -> Vec<u32> {
    let mut seen = BTreeSet::new();
    MARKER_PATTERN
        .captures_iter(content)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .filter(|n| seen.insert(*n))
        .collect()
}

/// Whether `content` contains a `[number]` marker.
pub fn contains_marker(content: &str, number: u32) -> bool {
    MARKER_PATTERN
        .captures_iter(content)
        .any(|caps| caps[1].parse::<u32>().ok() == Some(number))
}

/// Remove every `[number]` marker from `content`, along with the whitespace
/// directly before it.
pub fn strip_marker(content: &str, number: u32) -> String {
    STRIP_PATTERN
        .replace_all(content, |caps: &regex::Captures<'_>| {
            if caps[1].parse::<u32>().ok() == Some(number) {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_numbers_first_appearance_order() {
        assert_eq!(marker_numbers("See [3], then [1] and [3] again."), vec![3, 1]);
        assert_eq!(marker_numbers("No markers here"), Vec::<u32>::new());
    }

    #[test]
    fn test_ignores_non_numeric_brackets() {
        assert_eq!(marker_numbers("[a] [ 2 ] [2a] [7]"), vec![7]);
    }

    #[test]
    fn test_contains_marker() {
        assert!(contains_marker("See [12].", 12));
        assert!(!contains_marker("See [12].", 1));
    }

    #[test]
    fn test_strip_marker() {
        assert_eq!(strip_marker("See [1] and [3].", 3), "See [1] and.");
        assert_eq!(strip_marker("Claim [2], more.", 2), "Claim, more.");
    }
}
