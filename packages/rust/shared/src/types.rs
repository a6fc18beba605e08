//! Core domain types for account aggregation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LookupError;

/// A secondary document fetched from the document store.
pub type DocumentPayload = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one aggregation run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// An identity record as yielded by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Provider-assigned unique identifier. Also the document store key.
    pub uid: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    /// Custom claims attached to the account. Any non-empty claim set marks
    /// the account as privileged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_claims: Option<serde_json::Map<String, serde_json::Value>>,
}

impl RawRecord {
    /// Build a record without claims.
    pub fn new(
        uid: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            display_name: display_name.into(),
            email: email.into(),
            custom_claims: None,
        }
    }

    /// Attach a custom claim.
    pub fn with_claim(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_claims
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    /// The privilege marker, if present and non-empty.
    pub fn privilege_marker(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.custom_claims.as_ref().filter(|claims| !claims.is_empty())
    }
}

/// One page of records from a paginated identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    #[serde(default)]
    pub users: Vec<RawRecord>,
    /// Token for the following page. Absent or empty on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// An eligible record joined with its projected document.
///
/// Serializes flat: identity fields first, then the payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub uid: String,
    pub display_name: String,
    pub email: String,
    #[serde(flatten)]
    pub payload: DocumentPayload,
}

impl EnrichedRecord {
    /// Join a record with the document fetched for it.
    pub fn new(record: RawRecord, payload: DocumentPayload) -> Self {
        Self {
            uid: record.uid,
            display_name: record.display_name,
            email: record.email,
            payload,
        }
    }
}

/// An eligible record whose lookup failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub uid: String,
    pub cause: LookupError,
}

/// Everything one run accumulated.
///
/// `records` is in completion order, which is not source order and not
/// stable between runs.
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    pub records: Vec<EnrichedRecord>,
    pub failures: Vec<FailureRecord>,
    /// Records read from the source.
    pub scanned: usize,
    /// Records rejected by the eligibility filter.
    pub excluded: usize,
}

impl AggregationResult {
    /// Enriched plus failed.
    pub fn outcomes(&self) -> usize {
        self.records.len() + self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_record_reads_camel_case() {
        let record: RawRecord = serde_json::from_value(json!({
            "uid": "u1",
            "displayName": "Ana",
            "email": "ana@example.com",
            "customClaims": {"isAdmin": true}
        }))
        .expect("deserialize");
        assert_eq!(record.display_name, "Ana");
        assert!(record.privilege_marker().is_some());
    }

    #[test]
    fn empty_claims_are_not_a_marker() {
        let record: RawRecord =
            serde_json::from_value(json!({"uid": "u1", "customClaims": {}})).expect("deserialize");
        assert!(record.custom_claims.is_some());
        assert!(record.privilege_marker().is_none());
        assert_eq!(record.email, "");
    }

    #[test]
    fn enriched_record_serializes_flat() {
        let mut payload = DocumentPayload::new();
        payload.insert("brands".into(), json!(["acme"]));
        payload.insert("properties".into(), json!(null));
        let enriched = EnrichedRecord::new(RawRecord::new("u1", "Ana", "ana@example.com"), payload);

        let value = serde_json::to_value(&enriched).expect("serialize");
        assert_eq!(
            value,
            json!({
                "uid": "u1",
                "displayName": "Ana",
                "email": "ana@example.com",
                "brands": ["acme"],
                "properties": null
            })
        );
    }

    #[test]
    fn user_page_without_token() {
        let page: UserPage =
            serde_json::from_value(json!({"users": [{"uid": "u1"}]})).expect("deserialize");
        assert_eq!(page.users.len(), 1);
        assert!(page.next_page_token.is_none());
    }
}
