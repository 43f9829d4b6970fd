//! Observations: the atomic unit of extracted evidence.
//!
//! An observation is a provenance-tagged, confidence-scored, entity-scoped
//! unit of data. It is created once by an adapter from a raw fact,
//! immutable thereafter, and owned by exactly one aggregate after merge.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityTag;
use crate::error::ValidationError;
use crate::value::FieldValue;

/// Unique identifier for an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(uuid::Uuid);

impl ObservationId {
    /// Creates a new random observation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ObservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an observation came from, with a fixed trust ranking.
///
/// The ranking is a total order used wherever two observations describing
/// the same field conflict: `manual > table > llm_prose > llm_assumption`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Entered or corrected by a human analyst.
    Manual,
    /// Extracted from a structured table.
    Table,
    /// Extracted by an LLM from prose.
    LlmProse,
    /// Inferred by an LLM without direct evidence.
    LlmAssumption,
}

impl SourceKind {
    /// Returns the fixed priority score for this kind.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Manual => 4,
            Self::Table => 3,
            Self::LlmProse => 2,
            Self::LlmAssumption => 1,
        }
    }

    /// Returns true if an observation of this kind replaces one of `other`.
    ///
    /// Strictly greater: ties never replace; same-priority observations
    /// coexist as independent evidence.
    #[must_use]
    pub const fn should_replace(&self, other: &Self) -> bool {
        self.priority() > other.priority()
    }

    /// Default confidence assigned when a raw fact carries no score.
    #[must_use]
    pub const fn default_confidence(&self) -> f64 {
        match self {
            Self::Manual => 0.95,
            Self::Table => 0.9,
            Self::LlmProse => 0.7,
            Self::LlmAssumption => 0.4,
        }
    }

    /// Returns the lowercase string form used by the flat stores.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Table => "table",
            Self::LlmProse => "llm_prose",
            Self::LlmAssumption => "llm_assumption",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "table" => Ok(Self::Table),
            "llm_prose" => Ok(Self::LlmProse),
            "llm_assumption" => Ok(Self::LlmAssumption),
            _ => Err(ValidationError::UnknownSourceKind {
                value: s.to_string(),
            }),
        }
    }
}

/// One provenance-tagged, confidence-scored piece of evidence.
///
/// # Examples
///
/// ```
/// use coalesce::{EntityTag, Observation, SourceKind};
///
/// let obs = Observation::builder()
///     .source_kind(SourceKind::Table)
///     .confidence(0.9)
///     .evidence("IT inventory spreadsheet, row 12")
///     .scope_id("deal-123")
///     .entity(EntityTag::Target)
///     .payload_field("hosting", "cloud")
///     .build()
///     .unwrap();
///
/// assert_eq!(obs.source_kind, SourceKind::Table);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unique id, assigned at build time.
    pub id: ObservationId,
    /// Where this evidence came from.
    pub source_kind: SourceKind,
    /// Confidence score in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Verbatim evidence backing the observation.
    pub evidence: String,
    /// When the observation was extracted.
    pub extracted_at: DateTime<Utc>,
    /// Deal/tenant scope identifier.
    pub scope_id: String,
    /// Which organization this evidence is about.
    pub entity: EntityTag,

    /// Open string-keyed map of domain-specific fields.
    #[serde(default)]
    pub payload: BTreeMap<String, FieldValue>,
}

impl Observation {
    /// Starts building an observation.
    #[must_use]
    pub fn builder() -> ObservationBuilder {
        ObservationBuilder::default()
    }

    /// Returns the priority score of this observation's source kind.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        self.source_kind.priority()
    }

    /// Returns true if this observation outranks `other` in the trust order.
    #[must_use]
    pub const fn should_replace(&self, other: &Self) -> bool {
        self.source_kind.should_replace(&other.source_kind)
    }

    /// Serializes to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Builder for [`Observation`]. Validates invariants at `build()`.
#[derive(Debug, Default)]
pub struct ObservationBuilder {
    source_kind: Option<SourceKind>,
    confidence: Option<f64>,
    evidence: Option<String>,
    extracted_at: Option<DateTime<Utc>>,
    scope_id: Option<String>,
    entity: Option<EntityTag>,
    payload: BTreeMap<String, FieldValue>,
}

impl ObservationBuilder {
    /// Sets the source kind. Required.
    #[must_use]
    pub fn source_kind(mut self, kind: SourceKind) -> Self {
        self.source_kind = Some(kind);
        self
    }

    /// Sets the confidence score. Defaults by source kind when unset.
    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets the evidence string. Required to be non-empty.
    #[must_use]
    pub fn evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    /// Sets the extraction timestamp. Defaults to now when unset.
    #[must_use]
    pub fn extracted_at(mut self, at: DateTime<Utc>) -> Self {
        self.extracted_at = Some(at);
        self
    }

    /// Sets the scope id. Required to be non-empty.
    #[must_use]
    pub fn scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Sets the entity tag. Required.
    #[must_use]
    pub fn entity(mut self, entity: EntityTag) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Adds one payload field.
    #[must_use]
    pub fn payload_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Replaces the whole payload map.
    #[must_use]
    pub fn payload(mut self, payload: BTreeMap<String, FieldValue>) -> Self {
        self.payload = payload;
        self
    }

    /// Builds the observation, validating every invariant.
    ///
    /// The source kind defaults its confidence when none was supplied;
    /// `extracted_at` defaults to now.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a missing source kind or entity
    /// tag, an out-of-range confidence, empty evidence, or empty scope id.
    pub fn build(self) -> Result<Observation, ValidationError> {
        let source_kind = self
            .source_kind
            .ok_or(ValidationError::MissingField {
                field: "source_kind",
            })?;
        let entity = self
            .entity
            .ok_or(ValidationError::MissingField { field: "entity" })?;

        let confidence = self.confidence.unwrap_or(source_kind.default_confidence());
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange { value: confidence });
        }

        let evidence = self.evidence.unwrap_or_default();
        if evidence.trim().is_empty() {
            return Err(ValidationError::EmptyEvidence);
        }

        let scope_id = self.scope_id.unwrap_or_default();
        if scope_id.trim().is_empty() {
            return Err(ValidationError::EmptyScopeId);
        }

        Ok(Observation {
            id: ObservationId::new(),
            source_kind,
            confidence,
            evidence,
            extracted_at: self.extracted_at.unwrap_or_else(Utc::now),
            scope_id,
            entity,
            payload: self.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_builder() -> ObservationBuilder {
        Observation::builder()
            .source_kind(SourceKind::Table)
            .confidence(0.9)
            .evidence("inventory sheet")
            .scope_id("deal-123")
            .entity(EntityTag::Target)
    }

    #[test]
    fn test_source_kind_priority_order() {
        assert!(SourceKind::Manual.priority() > SourceKind::Table.priority());
        assert!(SourceKind::Table.priority() > SourceKind::LlmProse.priority());
        assert!(SourceKind::LlmProse.priority() > SourceKind::LlmAssumption.priority());
    }

    #[test]
    fn test_source_kind_should_replace_strict() {
        assert!(SourceKind::Manual.should_replace(&SourceKind::Table));
        assert!(!SourceKind::Table.should_replace(&SourceKind::Manual));
        // Ties never replace.
        assert!(!SourceKind::Table.should_replace(&SourceKind::Table));
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("manual".parse::<SourceKind>().unwrap(), SourceKind::Manual);
        assert_eq!("Table".parse::<SourceKind>().unwrap(), SourceKind::Table);
        assert_eq!(
            "llm_prose".parse::<SourceKind>().unwrap(),
            SourceKind::LlmProse
        );
        assert_eq!(
            "llm_assumption".parse::<SourceKind>().unwrap(),
            SourceKind::LlmAssumption
        );
        assert!("oracle".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_observation_build() {
        let obs = valid_builder()
            .payload_field("hosting", "cloud")
            .build()
            .unwrap();
        assert_eq!(obs.source_kind, SourceKind::Table);
        assert_eq!(obs.confidence, 0.9);
        assert_eq!(obs.scope_id, "deal-123");
        assert_eq!(obs.entity, EntityTag::Target);
        assert_eq!(
            obs.payload.get("hosting"),
            Some(&FieldValue::String("cloud".to_string()))
        );
    }

    #[test]
    fn test_observation_build_rejects_bad_confidence() {
        let err = valid_builder().confidence(1.5).build().unwrap_err();
        assert_eq!(err, ValidationError::ConfidenceOutOfRange { value: 1.5 });
        let err = valid_builder().confidence(-0.1).build().unwrap_err();
        assert_eq!(err, ValidationError::ConfidenceOutOfRange { value: -0.1 });
    }

    #[test]
    fn test_observation_build_accepts_boundary_confidence() {
        assert!(valid_builder().confidence(0.0).build().is_ok());
        assert!(valid_builder().confidence(1.0).build().is_ok());
    }

    #[test]
    fn test_observation_build_requires_source_kind_and_entity() {
        let err = Observation::builder()
            .evidence("e")
            .scope_id("deal-123")
            .entity(EntityTag::Target)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                field: "source_kind"
            }
        );

        let err = Observation::builder()
            .source_kind(SourceKind::Table)
            .evidence("e")
            .scope_id("deal-123")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "entity" });
    }

    #[test]
    fn test_observation_build_rejects_empty_evidence() {
        let err = valid_builder().evidence("  ").build().unwrap_err();
        assert_eq!(err, ValidationError::EmptyEvidence);
    }

    #[test]
    fn test_observation_build_rejects_empty_scope() {
        let err = valid_builder().scope_id("").build().unwrap_err();
        assert_eq!(err, ValidationError::EmptyScopeId);
    }

    #[test]
    fn test_observation_default_confidence_by_kind() {
        let obs = Observation::builder()
            .source_kind(SourceKind::LlmAssumption)
            .evidence("inferred from context")
            .scope_id("deal-123")
            .entity(EntityTag::Buyer)
            .build()
            .unwrap();
        assert_eq!(obs.confidence, SourceKind::LlmAssumption.default_confidence());
    }

    #[test]
    fn test_observation_ids_unique() {
        let a = valid_builder().build().unwrap();
        let b = valid_builder().build().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_observation_json_roundtrip() {
        let obs = valid_builder()
            .payload_field("hosting", "cloud")
            .payload_field("user_count", 250i64)
            .build()
            .unwrap();
        let json = obs.to_json().unwrap();
        let back = Observation::from_json(&json).unwrap();
        assert_eq!(obs, back);
    }

    #[test]
    fn test_observation_should_replace() {
        let manual = valid_builder()
            .source_kind(SourceKind::Manual)
            .build()
            .unwrap();
        let prose = valid_builder()
            .source_kind(SourceKind::LlmProse)
            .build()
            .unwrap();
        assert!(manual.should_replace(&prose));
        assert!(!prose.should_replace(&manual));
    }
}
