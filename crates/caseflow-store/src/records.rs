//! Typed enrichment payloads
//!
//! One struct per collaborator result. These are what the write queue
//! persists into the entity projection and the per-domain detail tables,
//! serialized as JSON columns.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// County tax standing for an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxStatus {
    /// Total amount currently due, in cents
    pub amount_due_cents: i64,
    /// Tax years with unpaid balances
    pub delinquent_years: Vec<i32>,
    /// Last year fully paid, if any
    pub paid_through: Option<i32>,
    /// Assessed value on the roll, in cents
    pub assessed_value_cents: Option<i64>,
}

/// One active or historical sale listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListing {
    /// Listing source (MLS feed, auction site, ...)
    pub source: String,
    /// Asking price in cents
    pub price_cents: Option<i64>,
    /// Listing status text as reported
    pub status: String,
    /// Date the listing appeared
    pub listed_on: Option<NaiveDate>,
}

/// Coarse property profile from the assessor
///
/// May correct the entity key: `canonical_key` is the authoritative parcel
/// identifier Phase 2 lookups use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyProfile {
    /// Authoritative parcel/legal key, when it differs from the raw key
    pub canonical_key: Option<String>,
    /// Owner of record
    pub owner_name: Option<String>,
    /// Situs (street) address
    pub situs_address: Option<String>,
    /// Abbreviated legal description
    pub legal_description: Option<String>,
    /// Land-use code
    pub land_use: Option<String>,
}

/// Flood zone designation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodZone {
    /// FEMA zone designation (e.g. "AE", "X")
    pub zone: String,
    /// Map panel number
    pub panel: Option<String>,
    /// Panel effective date
    pub effective: Option<NaiveDate>,
}

/// One building or trade permit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitRecord {
    /// Issuing authority's permit number
    pub permit_no: String,
    /// Permit kind (building, electrical, demolition, ...)
    pub kind: String,
    /// Current permit status
    pub status: String,
    /// Issue date
    pub issued_on: Option<NaiveDate>,
    /// Free-text scope description
    pub description: Option<String>,
}

/// Business-registry record for an owning entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessEntity {
    /// Registered business name
    pub name: String,
    /// Registry file number
    pub registry_id: String,
    /// Registry standing (active, dissolved, ...)
    pub status: String,
    /// Registered agent of record
    pub registered_agent: Option<String>,
}

/// Recorded survey reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    /// Survey book/instrument reference
    pub survey_ref: String,
    /// Recording date
    pub recorded_on: Option<NaiveDate>,
    /// Surveyor notes, when available
    pub notes: Option<String>,
}

/// One recorded instrument from the document index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeedDocument {
    /// Recorder's instrument reference (book/page or instrument number)
    pub doc_ref: String,
    /// Instrument type (deed, mortgage, release, lis pendens, ...)
    pub doc_type: String,
    /// Recording date
    pub recorded_on: Option<NaiveDate>,
    /// Grantor as indexed
    pub grantor: Option<String>,
    /// Grantee as indexed
    pub grantee: Option<String>,
}

/// One lien or encumbrance, with the survival determination when analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LienRecord {
    /// Instrument reference of the lien
    pub doc_ref: String,
    /// Lien type (mortgage, judgment, HOA, municipal, ...)
    pub lien_type: String,
    /// Face amount in cents, when stated
    pub amount_cents: Option<i64>,
    /// Lien holder as indexed
    pub holder: Option<String>,
    /// Recording date
    pub recorded_on: Option<NaiveDate>,
    /// Whether the lien survives the scheduled sale; None until analyzed
    pub survives: Option<bool>,
}

/// Output of the chain-of-title analysis for an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleAnalysis {
    /// Instrument references forming the chain, oldest first
    pub chain: Vec<String>,
    /// Number of unexplained gaps found in the chain
    pub gaps: u32,
    /// Current vested owner per the chain
    pub vested_owner: Option<String>,
    /// When the analysis ran
    pub analyzed_at: DateTime<Utc>,
}

/// Derived valuation summary computed after enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSummary {
    /// Assessed value carried from the tax roll, in cents
    pub assessed_cents: Option<i64>,
    /// Market estimate from listings/comparables, in cents
    pub market_estimate_cents: Option<i64>,
    /// Confidence in the estimate (0.0 - 1.0)
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_status_json_shape() {
        let tax = TaxStatus {
            amount_due_cents: 123_456,
            delinquent_years: vec![2023, 2024],
            paid_through: Some(2022),
            assessed_value_cents: None,
        };
        let json = serde_json::to_value(&tax).unwrap();
        assert_eq!(json["amount_due_cents"], 123_456);
        assert_eq!(json["delinquent_years"][1], 2024);
    }

    #[test]
    fn lien_survives_defaults_to_unanalyzed() {
        let json = r#"{"doc_ref":"B100/P2","lien_type":"judgment",
                       "amount_cents":null,"holder":null,
                       "recorded_on":null,"survives":null}"#;
        let lien: LienRecord = serde_json::from_str(json).unwrap();
        assert!(lien.survives.is_none());
    }
}
