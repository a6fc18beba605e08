//! Enrichment lookup: one document read per eligible record.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use acctfetch_shared::{DocumentPayload, EnrichedRecord, FailureRecord, LookupError, RawRecord};

/// Outcome of enriching one record.
pub type Outcome = std::result::Result<EnrichedRecord, FailureRecord>;

/// Identity fields that a projected document may not overwrite.
const RESERVED_FIELDS: [&str; 3] = ["uid", "displayName", "email"];

/// Keyed document reads against an external store.
///
/// Implementations perform exactly one read per call and never retry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> std::result::Result<DocumentPayload, LookupError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> std::result::Result<DocumentPayload, LookupError> {
        (**self).get(collection, key).await
    }
}

/// Joins records with their documents. Cheap to clone into worker tasks.
#[derive(Clone)]
pub struct Enricher {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
    fields: Arc<[String]>,
}

impl Enricher {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str, fields: &[String]) -> Self {
        Self {
            store,
            collection: Arc::from(collection),
            fields: Arc::from(fields),
        }
    }

    /// Look up the document for `record` and project it.
    ///
    /// A missing document is a failure like any other; nothing here is fatal.
    pub async fn enrich(&self, record: RawRecord) -> Outcome {
        match self.store.get(&self.collection, &record.uid).await {
            Ok(document) => {
                debug!(uid = %record.uid, "document fetched");
                let payload = project(document, &self.fields);
                Ok(EnrichedRecord::new(record, payload))
            }
            Err(cause) => {
                warn!(uid = %record.uid, error = %cause, "document lookup failed");
                Err(FailureRecord {
                    uid: record.uid,
                    cause,
                })
            }
        }
    }
}

/// Keep only `fields` of `document`, rendering absent ones as `null`.
/// An empty field list keeps the whole document. Identity fields are
/// always dropped from the payload.
pub fn project(mut document: DocumentPayload, fields: &[String]) -> DocumentPayload {
    let mut payload = if fields.is_empty() {
        document
    } else {
        fields
            .iter()
            .map(|field| {
                let value = document.remove(field).unwrap_or(serde_json::Value::Null);
                (field.clone(), value)
            })
            .collect()
    };
    for reserved in RESERVED_FIELDS {
        payload.remove(reserved);
    }
    payload
}
