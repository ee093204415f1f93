use tracing::{debug, info};

/// Normalized edit distance between two strings
///
/// Levenshtein distance (single-character insertions, deletions,
/// substitutions) divided by the length of the longer string, measured in
/// characters. Returns a ratio in `[0.0, 1.0]` where `0.0` means identical.
///
/// Zero-length inputs are handled explicitly: two empty strings are
/// identical (`0.0`), one empty string is a full rewrite (`1.0`).
#[must_use]
#[allow(clippy::cast_precision_loss)] // String lengths are nowhere near 2^52
pub fn normalized_edit_distance(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 0.0;
    }
    strsim::levenshtein(a, b) as f64 / longest as f64
}

/// Merge a model-proposed correction into the original text
///
/// Guards against hallucinated or overreaching corrections: the corrected
/// text is only accepted when its normalized edit distance from the original
/// stays within `max_change_ratio`. The comparison is strict - a ratio
/// exactly equal to the threshold is accepted.
///
/// # Arguments
/// * `original` - Text as transcribed, before correction
/// * `corrected` - Text proposed by the correction model
/// * `max_change_ratio` - Largest accepted edit ratio in `[0.0, 1.0]`
///
/// # Returns
/// The trimmed correction when accepted, otherwise `original` unchanged.
/// An empty (or whitespace-only) correction always yields `original`.
#[must_use]
pub fn safe_merge(original: &str, corrected: &str, max_change_ratio: f64) -> String {
    let trimmed = corrected.trim();
    if trimmed.is_empty() {
        debug!("correction came back empty, keeping original text");
        return original.to_owned();
    }

    let ratio = normalized_edit_distance(original, trimmed);
    if ratio > max_change_ratio {
        info!(
            ratio,
            max_change_ratio, "correction rejected: diverges too far from original"
        );
        return original.to_owned();
    }

    debug!(ratio, "correction accepted");
    trimmed.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identity_is_zero() {
        assert_eq!(normalized_edit_distance("hello world", "hello world"), 0.0);
        assert_eq!(normalized_edit_distance("a", "a"), 0.0);
    }

    #[test]
    fn test_distance_pure_substitutions() {
        // Equal length, k substitutions -> k/n
        assert_eq!(normalized_edit_distance("kitten", "sitten"), 1.0 / 6.0);
        assert_eq!(normalized_edit_distance("abcd", "axcy"), 2.0 / 4.0);
        assert_eq!(normalized_edit_distance("abcd", "wxyz"), 1.0);
    }

    #[test]
    fn test_distance_empty_edge_cases() {
        assert_eq!(normalized_edit_distance("", ""), 0.0);
        assert_eq!(normalized_edit_distance("", "x"), 1.0);
        assert_eq!(normalized_edit_distance("x", ""), 1.0);
        assert_eq!(normalized_edit_distance("", "hello"), 1.0);
    }

    #[test]
    fn test_distance_counts_characters_not_bytes() {
        // One substitution in a four-character word with a multibyte char
        assert_eq!(normalized_edit_distance("café", "cafe"), 1.0 / 4.0);
    }

    #[test]
    fn test_distance_insertion_normalizes_by_longer() {
        // One insertion: distance 1, longer length 6
        assert_eq!(normalized_edit_distance("hello", "hellos"), 1.0 / 6.0);
    }

    #[test]
    fn test_safe_merge_identity_is_idempotent() {
        let original = "the quick brown fox";
        assert_eq!(safe_merge(original, original, 0.3), original);
        assert_eq!(safe_merge(original, original, 0.0), original);
    }

    #[test]
    fn test_safe_merge_zero_ratio_rejects_any_change() {
        assert_eq!(safe_merge("hello", "hallo", 0.0), "hello");
        // ...unless the correction trims down to exactly the original
        assert_eq!(safe_merge("hello", "  hello  ", 0.0), "hello");
    }

    #[test]
    fn test_safe_merge_full_ratio_accepts_anything() {
        assert_eq!(
            safe_merge("hello", "completely different text", 1.0),
            "completely different text"
        );
    }

    #[test]
    fn test_safe_merge_empty_correction_keeps_original() {
        assert_eq!(safe_merge("hello", "", 1.0), "hello");
        assert_eq!(safe_merge("hello", "   \n\t  ", 1.0), "hello");
    }

    #[test]
    fn test_safe_merge_trims_accepted_correction() {
        assert_eq!(safe_merge("helo", "  hello \n", 0.5), "hello");
    }

    #[test]
    fn test_safe_merge_exact_threshold_is_accepted() {
        // "abcd" -> "abcx" is ratio 0.25; strict > rejection only
        assert_eq!(safe_merge("abcd", "abcx", 0.25), "abcx");
    }

    #[test]
    fn test_safe_merge_just_over_threshold_is_rejected() {
        // "abcd" -> "abxy" is ratio 0.5
        assert_eq!(safe_merge("abcd", "abxy", 0.49), "abcd");
    }

    #[test]
    fn test_safe_merge_typical_correction_accepted() {
        let original = "the quik brown fox jumps ovr the lasy dog";
        let corrected = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(safe_merge(original, corrected, 0.5), corrected);
    }

    #[test]
    fn test_safe_merge_hallucination_rejected() {
        let original = "pick up some milk on the way home";
        let corrected = "As an AI model I cannot run errands, but here is a poem about milk.";
        assert_eq!(safe_merge(original, corrected, 0.5), original);
    }
}
