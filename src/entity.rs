//! Entity tags: the TARGET/BUYER scoping classification.
//!
//! Every record in the kernel is scoped to exactly one of the two
//! organizations under analysis. Tags are parsed once from user or document
//! context and never mutated; crossing them is always a validation error,
//! never a merge candidate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Scopes a record to one of the two organizations under analysis.
///
/// # Examples
///
/// ```
/// use coalesce::EntityTag;
///
/// let tag: EntityTag = "Target".parse().unwrap();
/// assert_eq!(tag, EntityTag::Target);
/// assert_eq!(tag.as_str(), "target");
/// assert_eq!(tag.segment(), "TARGET");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityTag {
    /// The organization being acquired/analyzed.
    Target,
    /// The acquiring organization.
    Buyer,
}

impl EntityTag {
    /// Returns the lowercase string form used by the flat stores.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Buyer => "buyer",
        }
    }

    /// Returns the uppercase segment form used inside identifiers.
    #[must_use]
    pub const fn segment(&self) -> &'static str {
        match self {
            Self::Target => "TARGET",
            Self::Buyer => "BUYER",
        }
    }

    /// Parses the uppercase identifier segment form.
    pub(crate) fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "TARGET" => Some(Self::Target),
            "BUYER" => Some(Self::Buyer),
            _ => None,
        }
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityTag {
    type Err = ValidationError;

    /// Case-insensitive, whitespace-tolerant parse from the lowercase string
    /// form the ingest layer produces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "target" => Ok(Self::Target),
            "buyer" => Ok(Self::Buyer),
            _ => Err(ValidationError::UnknownEntityTag {
                value: s.to_string(),
            }),
        }
    }
}
