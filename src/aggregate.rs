//! Canonical aggregates: the deduplicated record for one real-world entity.
//!
//! The three aggregate kinds (application, infrastructure item, person) are
//! structurally identical instantiations of one generic pattern. A
//! zero-sized [`DomainKind`] marker supplies the per-kind constants: domain
//! prefix, normalization rules, and the discriminator rule. Shared merge
//! and duplicate-detection behavior lives here once instead of being
//! copied per kind.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityTag;
use crate::error::{CoalesceResult, ValidationError};
use crate::fingerprint::{DomainPrefix, Identifier};
use crate::normalize::NameKind;
use crate::observation::Observation;
use crate::similarity::name_similarity;
use crate::value::FieldValue;

/// Whether a kind carries a secondary discriminator.
///
/// This is a deliberate per-kind rule: applications always have a vendor,
/// infrastructure items sometimes do, people never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscriminatorRule {
    /// Must be present and non-empty.
    Required,
    /// May be present; non-empty when it is.
    Optional,
    /// Must be absent.
    Forbidden,
}

/// Per-kind constants for an aggregate domain.
pub trait DomainKind: fmt::Debug + Clone + Send + Sync + 'static {
    /// Identifier prefix for this kind.
    const PREFIX: DomainPrefix;
    /// Normalization rules for this kind's names.
    const NAME_KIND: NameKind;
    /// Discriminator rule for this kind.
    const DISCRIMINATOR: DiscriminatorRule;
    /// Human-readable kind label, used in error messages.
    const LABEL: &'static str;
}

/// Marker for business-application aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationKind;

impl DomainKind for ApplicationKind {
    const PREFIX: DomainPrefix = DomainPrefix::App;
    const NAME_KIND: NameKind = NameKind::Application;
    const DISCRIMINATOR: DiscriminatorRule = DiscriminatorRule::Required;
    const LABEL: &'static str = "Application";
}

/// Marker for infrastructure-item aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfrastructureKind;

impl DomainKind for InfrastructureKind {
    const PREFIX: DomainPrefix = DomainPrefix::Infra;
    const NAME_KIND: NameKind = NameKind::Infrastructure;
    const DISCRIMINATOR: DiscriminatorRule = DiscriminatorRule::Optional;
    const LABEL: &'static str = "InfrastructureItem";
}

/// Marker for person/team aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonKind;

impl DomainKind for PersonKind {
    const PREFIX: DomainPrefix = DomainPrefix::Org;
    const NAME_KIND: NameKind = NameKind::Organization;
    const DISCRIMINATOR: DiscriminatorRule = DiscriminatorRule::Forbidden;
    const LABEL: &'static str = "Person";
}

/// A business-application aggregate.
pub type Application = Aggregate<ApplicationKind>;
/// An infrastructure-item aggregate.
pub type InfrastructureItem = Aggregate<InfrastructureKind>;
/// A person/team aggregate.
pub type Person = Aggregate<PersonKind>;

/// The canonical, deduplicated record for one real-world entity.
///
/// An aggregate owns its observations exclusively; an observation is never
/// shared between aggregates, entities, or scopes. Mutation happens only
/// through [`Aggregate::add_observation`] (priority merge) and
/// [`Aggregate::merge`].
///
/// # Examples
///
/// ```
/// use coalesce::{Application, DomainPrefix, EntityTag, Identifier};
///
/// let id = Identifier::generate("salesforce", Some("Salesforce"), EntityTag::Target, DomainPrefix::App);
/// let app = Application::new(id, "Salesforce", Some("Salesforce"), EntityTag::Target, "deal-123", vec![]).unwrap();
/// assert!(app.id.as_str().starts_with("APP-TARGET-"));
/// assert_eq!(app.normalized_name, "salesforce");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Aggregate<K: DomainKind> {
    /// Deterministic fingerprint identifier.
    pub id: Identifier,
    /// Display name as first observed.
    pub display_name: String,
    /// Canonical form of the display name under this kind's rules.
    pub normalized_name: String,

    /// Collision-avoidance discriminator, per this kind's rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_discriminator: Option<String>,

    /// Which organization this record belongs to.
    pub entity: EntityTag,
    /// Deal/tenant scope identifier.
    pub scope_id: String,

    /// Owned exclusively by this aggregate.
    pub observations: Vec<Observation>,

    /// When the aggregate was first created.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    _kind: PhantomData<K>,
}

impl<K: DomainKind> Aggregate<K> {
    /// Creates a new aggregate, validating every structural invariant.
    ///
    /// Seed observations are folded in through the priority merge, so a
    /// lower-priority duplicate among them is discarded exactly as it would
    /// be post-construction.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty display name or scope, an
    /// identifier whose prefix or entity does not match, a discriminator
    /// that violates this kind's rule, or a seed observation whose entity
    /// or scope differs from the aggregate's.
    pub fn new(
        id: Identifier,
        display_name: impl Into<String>,
        secondary_discriminator: Option<impl Into<String>>,
        entity: EntityTag,
        scope_id: impl Into<String>,
        observations: Vec<Observation>,
    ) -> Result<Self, ValidationError> {
        let display_name = display_name.into();
        if display_name.trim().is_empty() {
            return Err(ValidationError::EmptyDisplayName);
        }

        let scope_id = scope_id.into();
        if scope_id.trim().is_empty() {
            return Err(ValidationError::EmptyScopeId);
        }

        if id.prefix() != K::PREFIX {
            return Err(ValidationError::IdPrefixMismatch {
                expected: K::PREFIX,
                actual: id.prefix(),
            });
        }

        if id.entity() != entity {
            return Err(ValidationError::EntityMismatch {
                expected: entity,
                actual: id.entity(),
            });
        }

        let secondary_discriminator = secondary_discriminator.map(Into::into);
        check_discriminator::<K>(secondary_discriminator.as_deref())?;

        let now = Utc::now();
        let mut aggregate = Self {
            normalized_name: crate::normalize::normalize(&display_name, K::NAME_KIND),
            id,
            display_name,
            secondary_discriminator,
            entity,
            scope_id,
            observations: Vec::new(),
            created_at: now,
            updated_at: now,
            _kind: PhantomData,
        };

        for obs in observations {
            aggregate.add_observation(obs)?;
        }

        Ok(aggregate)
    }

    /// Merges one observation in under the priority rules.
    ///
    /// If any existing observation strictly outranks the new one, the new
    /// one is discarded as a no-op, not an error. Existing observations the
    /// new one strictly outranks are removed. Same-priority observations
    /// coexist as independent evidence.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the observation's entity or scope
    /// does not match the aggregate's.
    pub fn add_observation(&mut self, obs: Observation) -> Result<(), ValidationError> {
        if obs.entity != self.entity {
            return Err(ValidationError::EntityMismatch {
                expected: self.entity,
                actual: obs.entity,
            });
        }
        if obs.scope_id != self.scope_id {
            return Err(ValidationError::ScopeMismatch {
                expected: self.scope_id.clone(),
                actual: obs.scope_id,
            });
        }

        if self.observations.iter().any(|existing| existing.should_replace(&obs)) {
            return Ok(());
        }

        self.observations.retain(|existing| !obs.should_replace(existing));
        self.observations.push(obs);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Folds every observation of `other` into this aggregate.
    ///
    /// `other` is not mutated; the caller is responsible for retiring it
    /// from the repository index after a successful merge.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the entities or scopes differ;
    /// merging across entities or scopes is always a programming error,
    /// never silently allowed.
    pub fn merge(&mut self, other: &Self) -> Result<(), ValidationError> {
        if other.entity != self.entity {
            return Err(ValidationError::EntityMismatch {
                expected: self.entity,
                actual: other.entity,
            });
        }
        if other.scope_id != self.scope_id {
            return Err(ValidationError::ScopeMismatch {
                expected: self.scope_id.clone(),
                actual: other.scope_id.clone(),
            });
        }

        for obs in &other.observations {
            self.add_observation(obs.clone())?;
        }
        Ok(())
    }

    /// Decides whether `other` is a duplicate of this aggregate.
    ///
    /// A different entity or scope is never a duplicate regardless of name
    /// similarity. Identical identifiers always are. Otherwise the
    /// normalized names are scored and compared against `threshold`.
    #[must_use]
    pub fn is_duplicate_of(&self, other: &Self, threshold: f64) -> bool {
        if self.entity != other.entity || self.scope_id != other.scope_id {
            return false;
        }
        if self.id == other.id {
            return true;
        }
        name_similarity(&self.normalized_name, &other.normalized_name) >= threshold
    }

    /// Returns the per-field winning values across all observations.
    ///
    /// Per field, the highest-priority observation wins; among equal
    /// priorities the higher confidence, then the more recent extraction,
    /// then the larger observation id. The view is deterministic and
    /// independent of merge order.
    #[must_use]
    pub fn aggregated_payload(&self) -> BTreeMap<String, FieldValue> {
        let mut winners: BTreeMap<String, &Observation> = BTreeMap::new();

        for obs in &self.observations {
            for key in obs.payload.keys() {
                let replace = match winners.get(key.as_str()) {
                    None => true,
                    Some(current) => outranks(obs, current),
                };
                if replace {
                    winners.insert(key.clone(), obs);
                }
            }
        }

        winners
            .into_iter()
            .filter_map(|(key, obs)| obs.payload.get(&key).map(|v| (key.clone(), v.clone())))
            .collect()
    }

    /// Returns the maximum confidence across observations, 0.0 when empty.
    #[must_use]
    pub fn max_confidence(&self) -> f64 {
        self.observations
            .iter()
            .map(|o| o.confidence)
            .fold(0.0, f64::max)
    }

    /// Returns the number of owned observations.
    #[must_use]
    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Serializes to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> CoalesceResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes from a JSON string, re-validating every invariant.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON, or a validation
    /// error if the decoded record violates an invariant.
    pub fn from_json(json: &str) -> CoalesceResult<Self> {
        let aggregate: Self = serde_json::from_str(json)?;
        aggregate.validate()?;
        Ok(aggregate)
    }

    /// Re-checks the structural invariants of an already-built record.
    fn validate(&self) -> Result<(), ValidationError> {
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::EmptyDisplayName);
        }
        if self.scope_id.trim().is_empty() {
            return Err(ValidationError::EmptyScopeId);
        }
        if self.id.prefix() != K::PREFIX {
            return Err(ValidationError::IdPrefixMismatch {
                expected: K::PREFIX,
                actual: self.id.prefix(),
            });
        }
        if self.id.entity() != self.entity {
            return Err(ValidationError::EntityMismatch {
                expected: self.entity,
                actual: self.id.entity(),
            });
        }
        check_discriminator::<K>(self.secondary_discriminator.as_deref())?;

        for obs in &self.observations {
            if obs.entity != self.entity {
                return Err(ValidationError::EntityMismatch {
                    expected: self.entity,
                    actual: obs.entity,
                });
            }
            if obs.scope_id != self.scope_id {
                return Err(ValidationError::ScopeMismatch {
                    expected: self.scope_id.clone(),
                    actual: obs.scope_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// True if `a` beats `b` for a contested payload field.
fn outranks(a: &Observation, b: &Observation) -> bool {
    let key_a = (a.priority(), a.confidence, a.extracted_at, a.id);
    let key_b = (b.priority(), b.confidence, b.extracted_at, b.id);
    key_a.partial_cmp(&key_b) == Some(std::cmp::Ordering::Greater)
}

fn check_discriminator<K: DomainKind>(value: Option<&str>) -> Result<(), ValidationError> {
    match (K::DISCRIMINATOR, value) {
        (DiscriminatorRule::Required, None) => {
            Err(ValidationError::DiscriminatorRequired { kind: K::LABEL })
        }
        (DiscriminatorRule::Required, Some(s)) if s.trim().is_empty() => {
            Err(ValidationError::DiscriminatorRequired { kind: K::LABEL })
        }
        (DiscriminatorRule::Optional, Some(s)) if s.trim().is_empty() => {
            Err(ValidationError::EmptyDiscriminator)
        }
        (DiscriminatorRule::Forbidden, Some(_)) => {
            Err(ValidationError::DiscriminatorForbidden { kind: K::LABEL })
        }
        _ => Ok(()),
    }
}
