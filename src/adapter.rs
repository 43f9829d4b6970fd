//! Store adapters: the flat-record boundary of the kernel.
//!
//! Inbound, a raw fact from the extraction pipeline is translated into an
//! [`Observation`] and resolved through the repository behind a
//! coordinator claim gate. Outbound, an aggregate is flattened into the
//! inventory record shape the presentation stores consume. A malformed
//! fact is logged and skipped, never allowed to abort the rest of a batch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aggregate::{Aggregate, DiscriminatorRule, DomainKind};
use crate::coordinator::ExtractionCoordinator;
use crate::error::CoalesceResult;
use crate::normalize::{normalize, NameKind};
use crate::observation::{Observation, SourceKind};
use crate::repository::Repository;
use crate::value::FieldValue;

/// Payload key the adapter reads the secondary discriminator from.
const VENDOR_KEY: &str = "vendor";

/// A flat fact record as produced by the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFact {
    /// Extraction domain that produced the fact (e.g. "application").
    pub domain: String,
    /// Fact category within the domain.
    pub category: String,
    /// Display label of the observed item.
    pub item_label: String,
    /// Free-form detail map.
    #[serde(default)]
    pub details: BTreeMap<String, FieldValue>,
    /// Status string from the pipeline.
    pub status: String,
    /// Evidence quote backing the fact.
    pub evidence: String,
    /// Identifier of the source document.
    pub source_id: String,
    /// Entity string, `"target"` or `"buyer"`.
    pub entity: String,
    /// Deal/tenant scope identifier.
    pub scope_id: String,
    /// How the fact was extracted (`table`, `llm_prose`, ...).
    pub source_kind: String,
    /// When the fact was created.
    pub created_at: DateTime<Utc>,
    /// Confidence score, defaulted by source kind when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl RawFact {
    /// Returns the vendor detail, the secondary discriminator for kinds
    /// that use one.
    #[must_use]
    pub fn vendor(&self) -> Option<&str> {
        self.details.get(VENDOR_KEY).and_then(FieldValue::as_string)
    }

    /// Returns the grouping tuple this fact resolves under: normalized
    /// label, discriminator, entity string, and scope. Facts with equal
    /// keys land on the same aggregate.
    #[must_use]
    pub fn identity_key(&self, kind: NameKind) -> (String, Option<String>, String, String) {
        (
            normalize(&self.item_label, kind),
            self.vendor().map(str::to_string),
            self.entity.trim().to_ascii_lowercase(),
            self.scope_id.clone(),
        )
    }

    /// Translates this fact into an observation.
    ///
    /// The category and status are folded into the payload alongside the
    /// detail map; a missing confidence defaults by source kind.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown entity or source-kind
    /// string, an out-of-range confidence, or empty evidence/scope.
    pub fn to_observation(&self) -> CoalesceResult<Observation> {
        let entity = self.entity.parse()?;
        let source_kind: SourceKind = self.source_kind.parse()?;

        let mut payload = self.details.clone();
        payload.insert("category".to_string(), FieldValue::from(self.category.as_str()));
        payload.insert("status".to_string(), FieldValue::from(self.status.as_str()));

        let mut builder = Observation::builder()
            .source_kind(source_kind)
            .evidence(self.evidence.as_str())
            .extracted_at(self.created_at)
            .scope_id(self.scope_id.as_str())
            .entity(entity)
            .payload(payload);
        if let Some(confidence) = self.confidence {
            builder = builder.confidence(confidence);
        }

        Ok(builder.build()?)
    }
}

/// Accounting for one [`ingest_facts`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Facts that created a new aggregate.
    pub created: usize,
    /// Facts merged into an existing aggregate.
    pub merged: usize,
    /// Facts skipped because another extraction pass already claimed the
    /// item from the same source document.
    pub skipped_claimed: usize,
    /// Facts skipped because they failed validation.
    pub skipped_invalid: usize,
}

impl IngestReport {
    /// Total facts processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.created + self.merged + self.skipped_claimed + self.skipped_invalid
    }
}

/// Feeds a batch of raw facts through the claim gate and the repository.
///
/// Per fact: convert to an observation, atomically claim the normalized
/// item name for `domain` (skipping items any domain already claimed from
/// the same source), then resolve through
/// [`Repository::find_or_create`]. Validation failures are logged and
/// counted, and the batch continues.
pub fn ingest_facts<K: DomainKind>(
    repo: &Repository<K>,
    coordinator: &ExtractionCoordinator,
    domain: &str,
    facts: &[RawFact],
) -> IngestReport {
    let mut report = IngestReport::default();

    for fact in facts {
        let obs = match fact.to_observation() {
            Ok(obs) => obs,
            Err(err) => {
                warn!(item = %fact.item_label, source = %fact.source_id, %err, "skipping invalid fact");
                report.skipped_invalid += 1;
                continue;
            }
        };

        let normalized = normalize(&fact.item_label, K::NAME_KIND);
        if !coordinator.try_claim(&fact.source_id, domain, &normalized) {
            report.skipped_claimed += 1;
            continue;
        }

        let discriminator = match K::DISCRIMINATOR {
            DiscriminatorRule::Forbidden => None,
            DiscriminatorRule::Required | DiscriminatorRule::Optional => fact.vendor(),
        };

        let entity = obs.entity;
        let before = repo.len();
        match repo.find_or_create(&fact.item_label, discriminator, entity, &fact.scope_id, vec![obs]) {
            Ok(_) => {
                if repo.len() > before {
                    report.created += 1;
                } else {
                    report.merged += 1;
                }
            }
            Err(err) => {
                warn!(item = %fact.item_label, source = %fact.source_id, %err, "skipping fact that failed resolution");
                // The item was never registered; leaving the claim standing
                // would turn away a later valid fact for it.
                coordinator.release(&fact.source_id, domain, &normalized);
                report.skipped_invalid += 1;
            }
        }
    }

    report
}

/// The flat record shape the inventory/presentation stores consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Canonical display name.
    pub display_name: String,
    /// Secondary discriminator, if the kind carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_discriminator: Option<String>,
    /// The aggregate's identifier, for reverse lookup.
    pub identifier: String,
    /// Entity tag in its lowercase string form.
    pub entity: String,
    /// Deal/tenant scope identifier.
    pub scope_id: String,
    /// Aggregated payload view: highest-priority observation wins per
    /// field.
    pub fields: BTreeMap<String, FieldValue>,
    /// Number of observations backing the record.
    pub observation_count: usize,
    /// Maximum confidence across observations.
    pub max_confidence: f64,
}

impl InventoryRecord {
    /// Flattens an aggregate into the outbound record shape.
    #[must_use]
    pub fn from_aggregate<K: DomainKind>(aggregate: &Aggregate<K>) -> Self {
        Self {
            display_name: aggregate.display_name.clone(),
            secondary_discriminator: aggregate.secondary_discriminator.clone(),
            identifier: aggregate.id.to_string(),
            entity: aggregate.entity.as_str().to_string(),
            scope_id: aggregate.scope_id.clone(),
            fields: aggregate.aggregated_payload(),
            observation_count: aggregate.observation_count(),
            max_confidence: aggregate.max_confidence(),
        }
    }
}
