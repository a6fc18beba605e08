//! libSQL document store (offline mode).
//!
//! The [`Storage`] struct wraps a local libSQL database holding one JSON
//! object per `(collection, key)`. It doubles as a [`DocumentStore`] so a
//! run can enrich accounts from a local mirror instead of a remote service.
//!
//! **Access rules:**
//! - importers: read-write via [`Storage::open`]
//! - aggregation runs: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};

use acctfetch_core::DocumentStore;
use acctfetch_shared::{AcctFetchError, DocumentPayload, LookupError, Result};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AcctFetchError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AcctFetchError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| AcctFetchError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AcctFetchError::Storage(format!(
                "document database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AcctFetchError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| AcctFetchError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        AcctFetchError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(AcctFetchError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Insert or replace the document at `(collection, key)`.
    pub async fn put_document(
        &self,
        collection: &str,
        key: &str,
        document: &DocumentPayload,
    ) -> Result<()> {
        self.check_writable()?;
        let body = serde_json::to_string(document)
            .map_err(|e| AcctFetchError::Storage(format!("failed to encode document: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO documents (collection, key, body_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, key) DO UPDATE SET
                   body_json = excluded.body_json,
                   updated_at = excluded.updated_at",
                params![collection, key, body.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| AcctFetchError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get the document at `(collection, key)`, if any.
    pub async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<DocumentPayload>> {
        let mut rows = self
            .conn
            .query(
                "SELECT body_json FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
            )
            .await
            .map_err(|e| AcctFetchError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let body: String = row
                    .get(0)
                    .map_err(|e| AcctFetchError::Storage(e.to_string()))?;
                let document = serde_json::from_str(&body).map_err(|e| {
                    AcctFetchError::Storage(format!("corrupt document {collection}/{key}: {e}"))
                })?;
                Ok(Some(document))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(AcctFetchError::Storage(e.to_string())),
        }
    }

    /// Number of documents in `collection`.
    pub async fn count_documents(&self, collection: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
            )
            .await
            .map_err(|e| AcctFetchError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(|e| AcctFetchError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(AcctFetchError::Storage(e.to_string())),
        }
    }

    /// Load a `{"<key>": {...}, ...}` map into `collection`. Returns the
    /// number of documents written. A non-object value rejects the whole
    /// import before anything is written.
    pub async fn import_documents(
        &self,
        collection: &str,
        documents: serde_json::Map<String, serde_json::Value>,
    ) -> Result<usize> {
        self.check_writable()?;
        let documents = documents
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::Object(document) => Ok((key, document)),
                _ => Err(AcctFetchError::validation(format!(
                    "document {key:?} is not a JSON object"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        for (key, document) in &documents {
            self.put_document(collection, key, document).await?;
        }
        let written = documents.len();
        tracing::info!(collection, written, "imported documents");
        Ok(written)
    }
}

#[async_trait]
impl DocumentStore for Storage {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> std::result::Result<DocumentPayload, LookupError> {
        match self.get_document(collection, key).await {
            Ok(Some(document)) => Ok(document),
            Ok(None) => Err(LookupError::not_found(key)),
            Err(e) => Err(LookupError::Transient(e.to_string())),
        }
    }
}
