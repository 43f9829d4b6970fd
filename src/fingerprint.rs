//! Deterministic fingerprint identifiers.
//!
//! An identifier has the fixed shape `{PREFIX}-{ENTITY}-{hash8}`, e.g.
//! `APP-TARGET-a3f291c2`. The hash is the first 8 lowercase hex characters
//! of a blake3 digest over the composite key
//! `normalized_name|discriminator|entity`, so identical inputs always
//! produce the identical identifier across runs and machines, and the
//! discriminator and entity tag are load-bearing for collision avoidance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityTag;
use crate::error::IdentifierError;
use crate::normalize::NameKind;

/// Hash segment length in hex characters.
const HASH_LEN: usize = 8;

/// The domain an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainPrefix {
    /// Business applications (`APP`).
    App,
    /// Infrastructure items (`INFRA`).
    Infra,
    /// People and teams (`ORG`).
    Org,
}

impl DomainPrefix {
    /// Returns the uppercase segment form used inside identifiers.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::App => "APP",
            Self::Infra => "INFRA",
            Self::Org => "ORG",
        }
    }

    /// Returns the normalization rules for this domain.
    #[must_use]
    pub const fn name_kind(&self) -> NameKind {
        match self {
            Self::App => NameKind::Application,
            Self::Infra => NameKind::Infrastructure,
            Self::Org => NameKind::Organization,
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "APP" => Some(Self::App),
            "INFRA" => Some(Self::Infra),
            "ORG" => Some(Self::Org),
            _ => None,
        }
    }
}

impl fmt::Display for DomainPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated, deterministic aggregate identifier.
///
/// Construction goes through [`Identifier::generate`] or
/// [`Identifier::parse`]; the inner string is therefore always well-formed
/// and the segment accessors cannot fail.
///
/// # Examples
///
/// ```
/// use coalesce::{DomainPrefix, EntityTag, Identifier};
///
/// let id = Identifier::generate("salesforce", Some("Salesforce"), EntityTag::Target, DomainPrefix::App);
/// assert!(id.as_str().starts_with("APP-TARGET-"));
/// assert_eq!(id.prefix(), DomainPrefix::App);
/// assert_eq!(id.hash().len(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Generates the identifier for a normalized name, discriminator,
    /// entity tag, and domain prefix.
    ///
    /// Deterministic: the same inputs yield the same identifier on every
    /// run and every machine.
    #[must_use]
    pub fn generate(
        normalized_name: &str,
        secondary: Option<&str>,
        entity: EntityTag,
        prefix: DomainPrefix,
    ) -> Self {
        let discriminator = secondary.unwrap_or("").to_lowercase();
        let key = format!("{normalized_name}|{discriminator}|{}", entity.as_str());
        let digest = blake3::hash(key.as_bytes());

        let mut hash8 = String::with_capacity(HASH_LEN);
        for byte in &digest.as_bytes()[..HASH_LEN / 2] {
            hash8.push_str(&format!("{byte:02x}"));
        }

        Self(format!("{}-{}-{hash8}", prefix.as_str(), entity.segment()))
    }

    /// Generates an identifier without a secondary discriminator.
    ///
    /// Lower-integrity fallback for callers that genuinely do not know the
    /// discriminator: names that only a discriminator would separate will
    /// collide. Prefer [`Identifier::generate`] whenever one is available.
    #[must_use]
    pub fn generate_without_discriminator(
        normalized_name: &str,
        entity: EntityTag,
        prefix: DomainPrefix,
    ) -> Self {
        Self::generate(normalized_name, None, entity, prefix)
    }

    /// Parses and validates an identifier string.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentifierError`] if the string does not have exactly 3
    /// hyphen-separated segments, the prefix or entity segment is not
    /// recognized, or the hash segment is not exactly 8 lowercase hex
    /// characters.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let segments: Vec<&str> = s.split('-').collect();
        if segments.len() != 3 {
            return Err(IdentifierError::MalformedShape { id: s.to_string() });
        }

        if DomainPrefix::from_segment(segments[0]).is_none() {
            return Err(IdentifierError::UnknownPrefix {
                segment: segments[0].to_string(),
            });
        }

        if EntityTag::from_segment(segments[1]).is_none() {
            return Err(IdentifierError::UnknownEntity {
                segment: segments[1].to_string(),
            });
        }

        let hash = segments[2];
        let hash_ok = hash.len() == HASH_LEN
            && hash
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !hash_ok {
            return Err(IdentifierError::InvalidHash {
                segment: hash.to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }

    /// Reports whether a string is a well-formed identifier. Never errors.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Returns the domain prefix segment.
    #[must_use]
    pub fn prefix(&self) -> DomainPrefix {
        let segment = self.0.split('-').next().unwrap_or("");
        DomainPrefix::from_segment(segment).unwrap_or(DomainPrefix::App)
    }

    /// Returns the entity tag segment.
    #[must_use]
    pub fn entity(&self) -> EntityTag {
        let segment = self.0.split('-').nth(1).unwrap_or("");
        EntityTag::from_segment(segment).unwrap_or(EntityTag::Target)
    }

    /// Returns the 8-character hex hash segment.
    #[must_use]
    pub fn hash(&self) -> &str {
        self.0.split('-').nth(2).unwrap_or("")
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}
