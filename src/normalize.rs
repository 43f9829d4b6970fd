//! Name normalization: the first half of identity assignment.
//!
//! Normalization maps a raw display name to the canonical lowercase form
//! that feeds the fingerprint generator. The rules are deliberately
//! kind-specific: application names shed a trailing product-category
//! suffix, while infrastructure and organization names keep every token,
//! because environment qualifiers and job titles are identity signal.

use serde::{Deserialize, Serialize};

/// Which domain's normalization rules apply to a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    /// Business applications (suffix stripping applies).
    Application,
    /// Infrastructure items (environment qualifiers preserved).
    Infrastructure,
    /// People and teams (role/title qualifiers preserved).
    Organization,
}

/// Trailing tokens stripped from application names.
///
/// Only a trailing occurrence after a word boundary is stripped; embedded
/// occurrences stay. This keeps "sap erp" -> "sap" distinguishable from
/// "sap successfactors" -> "sap successfactors" instead of collapsing both
/// to the bare vendor token.
const APPLICATION_SUFFIXES: &[&str] = &[
    "crm", "erp", "online", "cloud", "suite", "platform", "app", "system", "software",
];

/// Maps a raw display name to its canonical form.
///
/// Pure and total: lowercase, strip characters outside letters/digits/
/// whitespace/hyphen, collapse repeated whitespace, trim, then apply the
/// kind-specific suffix rule. An empty or all-junk input yields the empty
/// string.
///
/// # Examples
///
/// ```
/// use coalesce::{normalize, NameKind};
///
/// assert_eq!(normalize("  Salesforce CRM!  ", NameKind::Application), "salesforce");
/// assert_eq!(normalize("SAP SuccessFactors", NameKind::Application), "sap successfactors");
/// assert_eq!(normalize("Oracle DB (Production)", NameKind::Infrastructure), "oracle db production");
/// ```
#[must_use]
pub fn normalize(raw: &str, kind: NameKind) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    // Unicode-aware lowercasing: ASCII-only folding would leave accented
    // capitals intact and split case variants of the same name.
    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch.is_whitespace() || ch == '-' {
            cleaned.push(ch);
        }
    }

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    match kind {
        NameKind::Application => strip_trailing_suffix(&collapsed),
        NameKind::Infrastructure | NameKind::Organization => collapsed,
    }
}

/// Strips one trailing whitelist token, if present.
///
/// A single-token name is never stripped to the empty string: "erp" stays
/// "erp".
fn strip_trailing_suffix(name: &str) -> String {
    if let Some((head, last)) = name.rsplit_once(' ') {
        if APPLICATION_SUFFIXES.contains(&last) {
            return head.to_string();
        }
    }
    name.to_string()
}
