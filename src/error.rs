//! Error types for the resolution kernel.
//!
//! All errors are strongly typed using thiserror. Validation failures are
//! surfaced to the immediate caller at the point of construction or
//! mutation; nothing in this crate silently repairs invalid data.

use thiserror::Error;

use crate::entity::EntityTag;
use crate::fingerprint::DomainPrefix;

/// Validation errors raised when an observation, aggregate, or mutation
/// violates a structural invariant.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Confidence score outside the `[0.0, 1.0]` range.
    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        /// The rejected score.
        value: f64,
    },

    /// A required builder field was never supplied.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// Display name was empty or all whitespace.
    #[error("Display name cannot be empty")]
    EmptyDisplayName,

    /// Scope id was empty or all whitespace.
    #[error("Scope id cannot be empty")]
    EmptyScopeId,

    /// Evidence string was empty or all whitespace.
    #[error("Evidence cannot be empty")]
    EmptyEvidence,

    /// Entity string was neither `target` nor `buyer`.
    #[error("Unknown entity tag: '{value}' (expected 'target' or 'buyer')")]
    UnknownEntityTag {
        /// The rejected string.
        value: String,
    },

    /// Source-kind string did not name a known kind.
    #[error("Unknown source kind: '{value}'")]
    UnknownSourceKind {
        /// The rejected string.
        value: String,
    },

    /// A record carried a different entity tag than its aggregate.
    #[error("Entity mismatch: aggregate is {expected}, record is {actual}")]
    EntityMismatch {
        /// The aggregate's entity tag.
        expected: EntityTag,
        /// The record's entity tag.
        actual: EntityTag,
    },

    /// A record carried a different scope than its aggregate.
    #[error("Scope mismatch: aggregate is '{expected}', record is '{actual}'")]
    ScopeMismatch {
        /// The aggregate's scope id.
        expected: String,
        /// The record's scope id.
        actual: String,
    },

    /// The kind requires a discriminator and none was supplied.
    #[error("{kind} aggregates require a non-empty secondary discriminator")]
    DiscriminatorRequired {
        /// Label of the aggregate kind.
        kind: &'static str,
    },

    /// The kind forbids a discriminator and one was supplied.
    #[error("{kind} aggregates never carry a secondary discriminator")]
    DiscriminatorForbidden {
        /// Label of the aggregate kind.
        kind: &'static str,
    },

    /// A discriminator was supplied but empty or all whitespace.
    #[error("Secondary discriminator, when present, cannot be empty")]
    EmptyDiscriminator,

    /// An identifier's domain prefix did not match the aggregate kind.
    #[error("Identifier prefix mismatch: expected {expected}, got {actual}")]
    IdPrefixMismatch {
        /// The kind's prefix.
        expected: DomainPrefix,
        /// The identifier's prefix.
        actual: DomainPrefix,
    },
}

/// Errors raised when parsing an identifier string that does not match the
/// canonical `{PREFIX}-{ENTITY}-{hash8}` shape.
///
/// Distinct from [`ValidationError`]: these concern the identifier string
/// itself, not a domain object.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// The string did not split into exactly three segments.
    #[error("Malformed identifier '{id}': expected exactly 3 hyphen-separated segments")]
    MalformedShape {
        /// The rejected string.
        id: String,
    },

    /// The first segment was not a known domain prefix.
    #[error("Malformed identifier: unknown domain prefix '{segment}'")]
    UnknownPrefix {
        /// The rejected segment.
        segment: String,
    },

    /// The second segment was not a known entity tag.
    #[error("Malformed identifier: unknown entity segment '{segment}'")]
    UnknownEntity {
        /// The rejected segment.
        segment: String,
    },

    /// The hash segment was not 8 lowercase hex characters.
    #[error("Malformed identifier: hash segment '{segment}' is not 8 lowercase hex characters")]
    InvalidHash {
        /// The rejected segment.
        segment: String,
    },
}

/// Top-level error type for the resolution kernel.
#[derive(Debug, Error)]
pub enum CoalesceError {
    /// A structural invariant was violated.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An identifier string failed to parse.
    #[error("Identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description from the underlying codec.
        message: String,
    },

    /// A lock was poisoned by a panic on another thread.
    #[error("Lock poisoned: {what}")]
    LockPoisoned {
        /// Which lock was poisoned.
        what: &'static str,
    },
}

impl CoalesceError {
    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an identifier error.
    #[must_use]
    pub const fn is_identifier(&self) -> bool {
        matches!(self, Self::Identifier(_))
    }

    /// Creates a poisoned-lock error.
    #[must_use]
    pub const fn lock_poisoned(what: &'static str) -> Self {
        Self::LockPoisoned { what }
    }
}

impl From<serde_json::Error> for CoalesceError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type alias for kernel operations.
pub type CoalesceResult<T> = Result<T, CoalesceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_confidence() {
        let err = ValidationError::ConfidenceOutOfRange { value: 1.5 };
        let msg = format!("{err}");
        assert!(msg.contains("1.5"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn test_validation_error_entity_mismatch() {
        let err = ValidationError::EntityMismatch {
            expected: EntityTag::Target,
            actual: EntityTag::Buyer,
        };
        let msg = format!("{err}");
        assert!(msg.contains("target"));
        assert!(msg.contains("buyer"));
    }

    #[test]
    fn test_identifier_error_shape() {
        let err = IdentifierError::MalformedShape {
            id: "APP-TARGET".to_string(),
        };
        assert!(format!("{err}").contains("APP-TARGET"));
    }

    #[test]
    fn test_coalesce_error_from_validation() {
        let err: CoalesceError = ValidationError::EmptyDisplayName.into();
        assert!(err.is_validation());
        assert!(!err.is_identifier());
    }

    #[test]
    fn test_coalesce_error_from_identifier() {
        let err: CoalesceError = IdentifierError::InvalidHash {
            segment: "xyz".to_string(),
        }
        .into();
        assert!(err.is_identifier());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_coalesce_error_lock_poisoned() {
        let err = CoalesceError::lock_poisoned("repository index");
        let msg = format!("{err}");
        assert!(msg.contains("poisoned"));
        assert!(msg.contains("repository index"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_coalesce_error_serialization() {
        let err = CoalesceError::serialization("bad json");
        let msg = format!("{err}");
        assert!(msg.contains("bad json"));
    }
}
