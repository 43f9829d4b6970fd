//! # coalesce - identity resolution and deduplication kernel
//!
//! coalesce turns many independently-produced, possibly-duplicate,
//! possibly-conflicting observations about real-world entities into a
//! canonical, deduplicated set of aggregates with stable identifiers.
//!
//! ## Core Concepts
//!
//! - **Entity tag**: scopes every record to one of the two organizations
//!   under analysis (TARGET / BUYER)
//! - **Observation**: one provenance-tagged, confidence-scored piece of
//!   evidence
//! - **Aggregate**: the canonical deduplicated record owning its
//!   observations, one generic pattern instantiated per domain kind
//! - **Repository**: the deduplication engine: deterministic
//!   `find_or_create`, bounded fuzzy search, circuit-breaker-guarded
//!   reconciliation
//! - **Extraction coordinator**: prevents two concurrent extraction passes
//!   from registering the same item from the same source twice
//!
//! ## Usage
//!
//! ```rust
//! use coalesce::{ApplicationKind, EntityTag, Observation, Repository, SourceKind};
//!
//! let repo = Repository::<ApplicationKind>::new();
//!
//! let obs = Observation::builder()
//!     .source_kind(SourceKind::Table)
//!     .evidence("IT inventory spreadsheet, row 12")
//!     .scope_id("deal-123")
//!     .entity(EntityTag::Target)
//!     .build()
//!     .unwrap();
//!
//! let app = repo
//!     .find_or_create("Salesforce CRM", Some("Salesforce"), EntityTag::Target, "deal-123", vec![obs])
//!     .unwrap();
//! assert!(app.id.as_str().starts_with("APP-TARGET-"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod entity;
pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod observation;
pub mod similarity;
pub mod value;

// Resolution engine
pub mod aggregate;
pub mod coordinator;
pub mod repository;

// Flat-record boundary
pub mod adapter;

// Re-export primary types at crate root for convenience
pub use adapter::{ingest_facts, IngestReport, InventoryRecord, RawFact};
pub use aggregate::{
    Aggregate, Application, ApplicationKind, DiscriminatorRule, DomainKind, InfrastructureItem,
    InfrastructureKind, Person, PersonKind,
};
pub use coordinator::ExtractionCoordinator;
pub use entity::EntityTag;
pub use error::{CoalesceError, CoalesceResult, IdentifierError, ValidationError};
pub use fingerprint::{DomainPrefix, Identifier};
pub use normalize::{normalize, NameKind};
pub use observation::{Observation, ObservationBuilder, ObservationId, SourceKind};
pub use repository::{ReconcileReport, Repository, MAX_RECONCILE_SIZE};
pub use similarity::name_similarity;
pub use value::FieldValue;
