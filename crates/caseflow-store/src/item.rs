//! Work items and their identifiers
//!
//! A `WorkItem` is the immutable identifying tuple for one unit of pipeline
//! work. Many work items may reference the same entity key over time; the
//! item never changes after discovery inserts it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique work item identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Generate new item ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Entity key identifying the real-world subject (e.g. a parcel)
///
/// Keys come from upstream discovery and are not trusted: validation and
/// sentinel filtering happen in the pipeline before any step runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey(String);

impl EntityKey {
    /// Wrap a raw key as received from discovery
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One unit of pipeline work: a scheduled legal/property case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique id
    pub item_id: ItemId,
    /// Key of the entity this case concerns
    pub entity_key: EntityKey,
    /// Date the case is scheduled for (sale date, hearing date, ...)
    pub scheduled_date: NaiveDate,
    /// Case category as reported by discovery (e.g. "tax-sale")
    pub item_type: String,
    /// Party names captured at discovery, used by the fallback search
    /// when the entity key is unusable
    pub parties: Vec<String>,
}

impl WorkItem {
    /// Create a new work item with a fresh id
    #[must_use]
    pub fn new(
        entity_key: impl Into<EntityKey>,
        scheduled_date: NaiveDate,
        item_type: impl Into<String>,
    ) -> Self {
        Self {
            item_id: ItemId::new(),
            entity_key: entity_key.into(),
            scheduled_date,
            item_type: item_type.into(),
            parties: Vec::new(),
        }
    }

    /// With party names from the discovered docket entry
    #[inline]
    #[must_use]
    pub fn with_parties(mut self, parties: Vec<String>) -> Self {
        self.parties = parties;
        self
    }
}

impl From<String> for EntityKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_round_trip() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn work_item_builder() {
        let item = WorkItem::new(
            "R-1234-56",
            NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            "tax-sale",
        )
        .with_parties(vec!["DOE JOHN".to_string()]);

        assert_eq!(item.entity_key.as_str(), "R-1234-56");
        assert_eq!(item.parties.len(), 1);
    }
}
