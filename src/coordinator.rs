//! Extraction claim coordination.
//!
//! Multiple domain-extraction tasks run concurrently against the same
//! source document and race to register items. The coordinator records,
//! case-insensitively, which extraction domain has claimed which item from
//! which source, so the same real-world fact is never double-counted by
//! two independent extraction passes.
//!
//! The coordinator is an explicit object constructed per analysis run and
//! passed by reference to every extraction task, never a process-wide
//! singleton, so multiple concurrent runs in one process stay isolated.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Claims are keyed by (source document, extraction domain) -> item names.
/// All keys are trimmed and lowercased so lookups are case-insensitive.
#[derive(Debug, Default)]
struct ClaimState {
    by_source: HashMap<String, HashMap<String, HashSet<String>>>,
}

/// Tracks which extraction domain claimed which item from which source.
///
/// Lookups are total over arbitrary strings; there are no failure modes
/// beyond a poisoned lock, which is treated as a programming error.
///
/// # Examples
///
/// ```
/// use coalesce::ExtractionCoordinator;
///
/// let coordinator = ExtractionCoordinator::new();
/// coordinator.mark_claimed("doc-1", "application", "salesforce");
/// assert!(coordinator.is_claimed_by_any("doc-1", "Salesforce"));
/// assert_eq!(
///     coordinator.claiming_domain("doc-1", "Salesforce").as_deref(),
///     Some("application")
/// );
/// ```
#[derive(Debug, Default)]
pub struct ExtractionCoordinator {
    state: RwLock<ClaimState>,
}

fn claim_key(s: &str) -> String {
    s.trim().to_lowercase()
}

impl ExtractionCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `domain` has claimed `item_name` from `source_id`.
    /// Idempotent.
    pub fn mark_claimed(&self, source_id: &str, domain: &str, item_name: &str) {
        let mut state = self.state.write().expect("claim lock poisoned");
        state
            .by_source
            .entry(claim_key(source_id))
            .or_default()
            .entry(claim_key(domain))
            .or_default()
            .insert(claim_key(item_name));
    }

    /// Atomically claims `item_name` for `domain` unless any domain already
    /// holds it for this source.
    ///
    /// Returns true if the claim was newly won. This is the check-and-set
    /// primitive extraction tasks must use: a separate
    /// `is_claimed_by_any` check followed by `mark_claimed` would race
    /// between two concurrent callers.
    pub fn try_claim(&self, source_id: &str, domain: &str, item_name: &str) -> bool {
        let source_key = claim_key(source_id);
        let item_key = claim_key(item_name);

        let mut state = self.state.write().expect("claim lock poisoned");
        let domains = state.by_source.entry(source_key).or_default();

        let already = domains.values().any(|items| items.contains(&item_key));
        if already {
            return false;
        }

        domains.entry(claim_key(domain)).or_default().insert(item_key);
        true
    }

    /// Releases the claim `domain` holds on `item_name` for `source_id`.
    ///
    /// Returns true if the claim existed. Callers roll a claim back with
    /// this when the registration it gated failed, so a later fact for the
    /// same item is not turned away over a record that was never created.
    pub fn release(&self, source_id: &str, domain: &str, item_name: &str) -> bool {
        let mut state = self.state.write().expect("claim lock poisoned");
        state
            .by_source
            .get_mut(&claim_key(source_id))
            .and_then(|domains| domains.get_mut(&claim_key(domain)))
            .is_some_and(|items| items.remove(&claim_key(item_name)))
    }

    /// Returns true if `domain` itself has claimed `item_name` from
    /// `source_id`.
    #[must_use]
    pub fn is_claimed(&self, source_id: &str, domain: &str, item_name: &str) -> bool {
        let state = self.state.read().expect("claim lock poisoned");
        state
            .by_source
            .get(&claim_key(source_id))
            .and_then(|domains| domains.get(&claim_key(domain)))
            .is_some_and(|items| items.contains(&claim_key(item_name)))
    }

    /// Returns true if any domain has claimed `item_name` from `source_id`.
    ///
    /// The core anti-double-counting check. Matches the source id exactly
    /// (after case folding), not by substring containment.
    #[must_use]
    pub fn is_claimed_by_any(&self, source_id: &str, item_name: &str) -> bool {
        let state = self.state.read().expect("claim lock poisoned");
        let item_key = claim_key(item_name);
        state
            .by_source
            .get(&claim_key(source_id))
            .is_some_and(|domains| domains.values().any(|items| items.contains(&item_key)))
    }

    /// Returns the domain that claimed `item_name` from `source_id`, if any.
    #[must_use]
    pub fn claiming_domain(&self, source_id: &str, item_name: &str) -> Option<String> {
        let state = self.state.read().expect("claim lock poisoned");
        let item_key = claim_key(item_name);
        state
            .by_source
            .get(&claim_key(source_id))?
            .iter()
            .find(|(_, items)| items.contains(&item_key))
            .map(|(domain, _)| domain.clone())
    }

    /// Counts claims for a source, optionally narrowed to one domain.
    #[must_use]
    pub fn count(&self, source_id: &str, domain: Option<&str>) -> usize {
        let state = self.state.read().expect("claim lock poisoned");
        let Some(domains) = state.by_source.get(&claim_key(source_id)) else {
            return 0;
        };
        match domain {
            Some(d) => domains.get(&claim_key(d)).map_or(0, HashSet::len),
            None => domains.values().map(HashSet::len).sum(),
        }
    }

    /// Drops all claims for a source. Used on re-ingestion of an updated
    /// source document.
    pub fn clear(&self, source_id: &str) {
        let mut state = self.state.write().expect("claim lock poisoned");
        state.by_source.remove(&claim_key(source_id));
    }
}
