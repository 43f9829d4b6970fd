//! The deduplication engine.
//!
//! A repository owns the index from identifier to aggregate for one domain
//! kind. `find_or_create` is THE deduplication primitive: it computes the
//! deterministic identity of an incoming name and either merges into the
//! existing aggregate or inserts a new one, so repeated extraction of name
//! variants is idempotent onto a single record.
//!
//! All state sits behind one coarse `RwLock` per repository instance;
//! compound operations hold the write guard for their whole duration, so
//! they are atomic from the caller's point of view. None of the operations
//! perform I/O. A poisoned lock means a panic escaped while the guard was
//! held; `find_or_create` surfaces that as [`CoalesceError::LockPoisoned`],
//! and the infallible accessors treat it as a programming error.
//!
//! The in-memory index scans linearly for fuzzy search. That keeps
//! `find_similar` O(n) and a full reconcile pass O(n²) in the worst case,
//! which is why the reconcile circuit breaker exists; a persistent-backed
//! implementation should put a trigram or n-gram index behind the same
//! interface.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::aggregate::{Aggregate, DiscriminatorRule, DomainKind};
use crate::entity::EntityTag;
use crate::error::{CoalesceError, CoalesceResult, ValidationError};
use crate::fingerprint::Identifier;
use crate::normalize::normalize;
use crate::observation::Observation;
use crate::similarity::name_similarity;

/// Largest population `reconcile_duplicates` will attempt.
///
/// Above this the pass returns immediately with zero merges: the pairwise
/// comparison has been measured to take minutes at moderate scale, and a
/// deferred pass is a normal outcome, not a failure.
pub const MAX_RECONCILE_SIZE: usize = 500;

/// Outcome of a [`Repository::reconcile_duplicates`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Aggregates merged away into a surviving record.
    pub merged: usize,
    /// Candidate comparisons actually performed. Zero whenever the circuit
    /// breaker fired.
    pub examined: usize,
    /// True if the population exceeded [`MAX_RECONCILE_SIZE`] and the pass
    /// was skipped. Callers must treat this as "deferred", not "failed".
    pub skipped_oversize: bool,
}

/// The deduplication engine for one aggregate kind.
///
/// # Examples
///
/// ```
/// use coalesce::{ApplicationKind, EntityTag, Repository};
///
/// let repo = Repository::<ApplicationKind>::new();
/// let a = repo.find_or_create("Salesforce", Some("Salesforce"), EntityTag::Target, "deal-123", vec![]).unwrap();
/// let b = repo.find_or_create("Salesforce CRM", Some("Salesforce"), EntityTag::Target, "deal-123", vec![]).unwrap();
/// assert_eq!(a.id, b.id);
/// assert_eq!(repo.len(), 1);
/// ```
#[derive(Debug)]
pub struct Repository<K: DomainKind> {
    index: RwLock<HashMap<Identifier, Aggregate<K>>>,
}

impl<K: DomainKind> Default for Repository<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: DomainKind> Repository<K> {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Exact lookup by identifier.
    #[must_use]
    pub fn find_by_id(&self, id: &Identifier) -> Option<Aggregate<K>> {
        let index = self.index.read().expect("repository lock poisoned");
        index.get(id).cloned()
    }

    /// Finds the aggregate this name resolves to, creating it if absent.
    ///
    /// The display name is normalized under this kind's rules and
    /// fingerprinted together with the discriminator and entity tag. If an
    /// aggregate already exists at that identity, the supplied observations
    /// are merged into it under the priority rules and the existing record
    /// is returned and no new entry is created. Two calls whose inputs
    /// normalize and fingerprint identically always yield the same
    /// aggregate identity, regardless of call order.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the aggregate invariants are
    /// violated: empty name or scope, a discriminator violating this
    /// kind's rule, or an observation whose entity or scope does not match.
    /// Returns [`CoalesceError::LockPoisoned`] if a panic on another thread
    /// poisoned the index lock.
    pub fn find_or_create(
        &self,
        display_name: &str,
        secondary_discriminator: Option<&str>,
        entity: EntityTag,
        scope_id: &str,
        observations: Vec<Observation>,
    ) -> CoalesceResult<Aggregate<K>> {
        // Person identities never carry a discriminator; infrastructure
        // falls back to the discriminator-less form when none is supplied.
        if K::DISCRIMINATOR == DiscriminatorRule::Forbidden && secondary_discriminator.is_some() {
            return Err(ValidationError::DiscriminatorForbidden { kind: K::LABEL }.into());
        }
        let fingerprint_discriminator = match K::DISCRIMINATOR {
            DiscriminatorRule::Forbidden => None,
            DiscriminatorRule::Required | DiscriminatorRule::Optional => secondary_discriminator,
        };

        let normalized = normalize(display_name, K::NAME_KIND);
        let id = Identifier::generate(&normalized, fingerprint_discriminator, entity, K::PREFIX);

        // Observations are validated before any mutation so a failed call
        // leaves the existing aggregate untouched.
        for obs in &observations {
            if obs.entity != entity {
                return Err(ValidationError::EntityMismatch {
                    expected: entity,
                    actual: obs.entity,
                }
                .into());
            }
            if obs.scope_id != scope_id {
                return Err(ValidationError::ScopeMismatch {
                    expected: scope_id.to_string(),
                    actual: obs.scope_id.clone(),
                }
                .into());
            }
        }

        let mut index = self
            .index
            .write()
            .map_err(|_| CoalesceError::lock_poisoned("repository index"))?;

        if let Some(existing) = index.get_mut(&id) {
            // The fingerprint does not encode the scope; a repository is
            // constructed per analysis run, so resolving the same identity
            // under a different scope is a programming error.
            if existing.scope_id != scope_id {
                return Err(ValidationError::ScopeMismatch {
                    expected: existing.scope_id.clone(),
                    actual: scope_id.to_string(),
                }
                .into());
            }
            debug!(id = %id, name = display_name, "merging observations into existing aggregate");
            for obs in observations {
                existing.add_observation(obs)?;
            }
            return Ok(existing.clone());
        }

        let aggregate = Aggregate::<K>::new(
            id.clone(),
            display_name,
            secondary_discriminator,
            entity,
            scope_id,
            observations,
        )?;
        index.insert(id, aggregate.clone());
        Ok(aggregate)
    }

    /// Bounded fuzzy search over the index.
    ///
    /// Scores every aggregate's normalized name against the normalized
    /// query, keeps those at or above `threshold`, and returns at most
    /// `limit` results ordered by descending score.
    #[must_use]
    pub fn find_similar(&self, name: &str, threshold: f64, limit: usize) -> Vec<(Aggregate<K>, f64)> {
        let query = normalize(name, K::NAME_KIND);
        let index = self.index.read().expect("repository lock poisoned");

        let mut scored: Vec<(Aggregate<K>, f64)> = index
            .values()
            .map(|agg| (agg.clone(), name_similarity(&query, &agg.normalized_name)))
            .filter(|(_, score)| *score >= threshold)
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        scored.truncate(limit);
        scored
    }

    /// Batch deduplication pass over the whole index.
    ///
    /// Guarded by a mandatory circuit breaker: a population above
    /// [`MAX_RECONCILE_SIZE`] is skipped outright with a warning and zero
    /// comparisons performed. Below the limit, each aggregate's
    /// similarity candidates are checked with
    /// [`Aggregate::is_duplicate_of`]; confirmed duplicates are merged
    /// into the surviving record and removed from the index.
    ///
    /// The whole pass runs under the write lock, so each merge step is
    /// atomic and abandoning the task mid-pass leaves a consistent index.
    /// Expected to run on a background task, never on a synchronous
    /// request-serving path.
    pub fn reconcile_duplicates(&self, threshold: f64) -> ReconcileReport {
        let mut index = self.index.write().expect("repository lock poisoned");

        let population = index.len();
        if population > MAX_RECONCILE_SIZE {
            warn!(
                population,
                max = MAX_RECONCILE_SIZE,
                "reconcile skipped: population exceeds circuit-breaker limit"
            );
            return ReconcileReport {
                merged: 0,
                examined: 0,
                skipped_oversize: true,
            };
        }

        let mut report = ReconcileReport::default();
        let ids: Vec<Identifier> = index.keys().cloned().collect();

        for id in ids {
            // May have been merged away earlier in this pass.
            let Some(item) = index.get(&id).cloned() else {
                continue;
            };

            let candidates: Vec<Identifier> = index
                .iter()
                .filter(|(cid, _)| **cid != id)
                .filter_map(|(cid, agg)| {
                    report.examined += 1;
                    let score = name_similarity(&item.normalized_name, &agg.normalized_name);
                    (score >= threshold).then(|| cid.clone())
                })
                .collect();

            for cid in candidates {
                let Some(candidate) = index.get(&cid) else {
                    continue;
                };
                if !item.is_duplicate_of(candidate, threshold) {
                    continue;
                }
                let Some(candidate) = index.remove(&cid) else {
                    continue;
                };
                if let Some(primary) = index.get_mut(&id) {
                    if primary.merge(&candidate).is_ok() {
                        debug!(primary = %id, merged = %cid, "reconciled duplicate aggregate");
                        report.merged += 1;
                        continue;
                    }
                }
                // Merge refused (cross entity/scope): put the candidate
                // back untouched.
                index.insert(cid, candidate);
            }
        }

        report
    }

    /// Counts aggregates for an entity, optionally narrowed to one scope.
    #[must_use]
    pub fn count_by_entity(&self, entity: EntityTag, scope_id: Option<&str>) -> usize {
        let index = self.index.read().expect("repository lock poisoned");
        index
            .values()
            .filter(|agg| agg.entity == entity)
            .filter(|agg| scope_id.map_or(true, |s| agg.scope_id == s))
            .count()
    }

    /// Returns all aggregates for an entity, optionally narrowed to one
    /// scope.
    #[must_use]
    pub fn find_by_entity(&self, entity: EntityTag, scope_id: Option<&str>) -> Vec<Aggregate<K>> {
        let index = self.index.read().expect("repository lock poisoned");
        index
            .values()
            .filter(|agg| agg.entity == entity)
            .filter(|agg| scope_id.map_or(true, |s| agg.scope_id == s))
            .cloned()
            .collect()
    }

    /// Administrative delete. Returns true if the aggregate existed.
    pub fn delete_by_id(&self, id: &Identifier) -> bool {
        let mut index = self.index.write().expect("repository lock poisoned");
        index.remove(id).is_some()
    }

    /// Returns every aggregate in the index.
    #[must_use]
    pub fn find_all(&self) -> Vec<Aggregate<K>> {
        let index = self.index.read().expect("repository lock poisoned");
        index.values().cloned().collect()
    }

    /// Returns the number of indexed aggregates.
    #[must_use]
    pub fn len(&self) -> usize {
        let index = self.index.read().expect("repository lock poisoned");
        index.len()
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
