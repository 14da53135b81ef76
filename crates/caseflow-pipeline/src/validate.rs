//! Entity-key validation gating and the fallback discovery path
//!
//! Before any step runs, the entity key is checked against structural rules
//! and a sentinel list. An invalid key routes the item to a secondary
//! search keyed by party names instead of skipping outright; only when that
//! fallback also yields nothing is the item marked skipped - never silently
//! dropped.

use crate::error::SourceResult;
use async_trait::async_trait;
use caseflow_store::{EntityKey, WorkItem};

/// Placeholder values upstream systems emit instead of a real key
pub const KEY_SENTINELS: &[&str] = &["UNKNOWN", "N/A", "NA", "TBD", "NONE", "PENDING", "0"];

/// Minimum significant characters a plausible key carries
const MIN_KEY_LEN: usize = 3;

/// Verdict of claim-time key validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyVerdict {
    /// Key is structurally plausible
    Valid,
    /// Key is unusable; reason always contains "invalid"
    Invalid(String),
}

/// Validate an entity key: non-empty, minimum length, not a sentinel
#[must_use]
pub fn validate_entity_key(key: &EntityKey) -> KeyVerdict {
    let trimmed = key.as_str().trim();
    if trimmed.is_empty() {
        return KeyVerdict::Invalid("invalid entity key: empty".to_string());
    }
    if trimmed.len() < MIN_KEY_LEN {
        return KeyVerdict::Invalid(format!(
            "invalid entity key: '{trimmed}' shorter than {MIN_KEY_LEN} characters"
        ));
    }
    let upper = trimmed.to_ascii_uppercase();
    if KEY_SENTINELS.contains(&upper.as_str()) {
        return KeyVerdict::Invalid(format!(
            "invalid entity key: placeholder value '{trimmed}'"
        ));
    }
    KeyVerdict::Valid
}

/// Secondary discovery path: resolve an entity key from party names when
/// the primary key is unusable, or when Phase 1 produced no canonical key.
#[async_trait]
pub trait FallbackSearch: Send + Sync {
    /// Search by the item's party names; `Success` carries the resolved key
    async fn search_by_parties(&self, item: &WorkItem) -> SourceResult<EntityKey>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plausible_keys_pass() {
        assert_eq!(
            validate_entity_key(&EntityKey::new("R-1234-56")),
            KeyVerdict::Valid
        );
    }

    #[test]
    fn sentinels_fail_case_insensitively() {
        for sentinel in ["UNKNOWN", "unknown", "n/a", "Tbd"] {
            let verdict = validate_entity_key(&EntityKey::new(sentinel));
            let KeyVerdict::Invalid(reason) = verdict else {
                panic!("sentinel '{sentinel}' passed validation");
            };
            assert!(reason.contains("invalid"));
        }
    }

    #[test]
    fn short_and_empty_keys_fail() {
        assert!(matches!(
            validate_entity_key(&EntityKey::new("")),
            KeyVerdict::Invalid(_)
        ));
        assert!(matches!(
            validate_entity_key(&EntityKey::new("  ")),
            KeyVerdict::Invalid(_)
        ));
        assert!(matches!(
            validate_entity_key(&EntityKey::new("AB")),
            KeyVerdict::Invalid(_)
        ));
    }
}
