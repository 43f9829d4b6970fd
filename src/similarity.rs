//! Name similarity scoring for duplicate detection.
//!
//! The reference metric is a character-set overlap coefficient: the size of
//! the intersection of the two names' character sets divided by the size of
//! the smaller set. It is symmetric and bounded to [0, 1]; the
//! threshold-based duplicate decision built on top of it is the stable
//! contract, and the metric itself can be swapped for a stronger one
//! without touching callers.

use std::collections::HashSet;

/// Scores the similarity of two normalized names.
///
/// Whitespace is excluded from the character sets. Identical non-empty
/// strings score 1.0; if either side contributes no characters the score
/// is 0.0.
///
/// # Examples
///
/// ```
/// use coalesce::name_similarity;
///
/// assert_eq!(name_similarity("salesforce", "salesforce"), 1.0);
/// assert_eq!(name_similarity("abc", "xyz"), 0.0);
/// let s = name_similarity("salesforce", "salesforce crm");
/// assert!(s > 0.9);
/// ```
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a == b && !a.trim().is_empty() {
        return 1.0;
    }

    let set_a: HashSet<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let set_b: HashSet<char> = b.chars().filter(|c| !c.is_whitespace()).collect();

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let min_len = set_a.len().min(set_b.len());

    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / min_len as f64
    }
}
