//! Application configuration for acctfetch.
//!
//! User config lives at `~/.acctfetch/acctfetch.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AcctFetchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "acctfetch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".acctfetch";

/// Upper bound on concurrent lookups.
pub const MAX_CONCURRENCY: usize = 256;

/// Largest page the identity provider will serve.
pub const MAX_PAGE_SIZE: usize = 1000;

// ---------------------------------------------------------------------------
// Config structs (matching acctfetch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Aggregation settings.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Where identity records come from.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Where enrichment documents come from.
    #[serde(default)]
    pub documents: DocumentsConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Maximum number of lookups in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Records requested per identity provider page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            page_size: default_page_size(),
        }
    }
}

fn default_concurrency() -> usize {
    10
}
fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

/// Identity provider backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Paginated REST endpoint.
    Http,
    /// JSON export on disk.
    File,
}

/// `[identity]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_kind")]
    pub kind: IdentityKind,

    /// Base URL of the accounts endpoint (`http` kind).
    #[serde(default = "default_identity_url")]
    pub base_url: String,

    /// Path of the JSON export (`file` kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            kind: default_identity_kind(),
            base_url: default_identity_url(),
            path: None,
            token_env: default_token_env(),
        }
    }
}

fn default_identity_kind() -> IdentityKind {
    IdentityKind::Http
}
fn default_identity_url() -> String {
    "http://localhost:9099/v1".into()
}
fn default_token_env() -> String {
    "ACCTFETCH_TOKEN".into()
}

/// Document store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentsKind {
    /// REST document endpoint.
    Http,
    /// Local libSQL database.
    Sqlite,
}

/// `[documents]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_kind")]
    pub kind: DocumentsKind,

    /// Base URL of the document endpoint (`http` kind).
    #[serde(default = "default_documents_url")]
    pub base_url: String,

    /// Database file (`sqlite` kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Collection holding one document per account.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Document fields copied into each enriched record. Empty copies all.
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    /// Name of the env var holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            kind: default_documents_kind(),
            base_url: default_documents_url(),
            path: None,
            collection: default_collection(),
            fields: default_fields(),
            token_env: default_token_env(),
        }
    }
}

fn default_documents_kind() -> DocumentsKind {
    DocumentsKind::Http
}
fn default_documents_url() -> String {
    "http://localhost:8080/v1/documents".into()
}
fn default_collection() -> String {
    "users".into()
}
fn default_fields() -> Vec<String> {
    vec!["properties".into(), "brands".into()]
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime aggregation configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrency ceiling for in-flight lookups.
    pub concurrency: usize,
    /// Records per identity provider page.
    pub page_size: usize,
    /// Collection to look documents up in.
    pub collection: String,
    /// Fields projected from each document.
    pub fields: Vec<String>,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.pipeline.concurrency,
            page_size: config.pipeline.page_size,
            collection: config.documents.collection.clone(),
            fields: config.documents.fields.clone(),
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(AcctFetchError::config("concurrency must be at least 1"));
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(AcctFetchError::config(format!(
                "concurrency {} exceeds the maximum of {MAX_CONCURRENCY}",
                self.concurrency
            )));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(AcctFetchError::config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.collection.trim().is_empty() {
            return Err(AcctFetchError::config("documents.collection must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.acctfetch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AcctFetchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.acctfetch/acctfetch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AcctFetchError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        AcctFetchError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AcctFetchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AcctFetchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AcctFetchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a bearer token from the named env var. Unset or empty means no token.
pub fn read_token(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

/// Check that a configured base URL parses.
pub(crate) fn parse_base_url(raw: &str) -> Result<url::Url> {
    url::Url::parse(raw)
        .map_err(|e| AcctFetchError::config(format!("invalid base_url {raw:?}: {e}")))
}

impl IdentityConfig {
    /// Parsed base URL for the `http` kind.
    pub fn url(&self) -> Result<url::Url> {
        parse_base_url(&self.base_url)
    }
}

impl DocumentsConfig {
    /// Parsed base URL for the `http` kind.
    pub fn url(&self) -> Result<url::Url> {
        parse_base_url(&self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("concurrency"));
        assert!(toml_str.contains("ACCTFETCH_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.concurrency, 10);
        assert_eq!(parsed.documents.collection, "users");
        assert_eq!(parsed.identity.kind, IdentityKind::Http);
    }

    #[test]
    fn config_with_sqlite_documents() {
        let toml_str = r#"
[pipeline]
concurrency = 4

[identity]
kind = "file"
path = "/tmp/accounts.json"

[documents]
kind = "sqlite"
path = "/tmp/docs.db"
fields = []
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.concurrency, 4);
        assert_eq!(config.pipeline.page_size, MAX_PAGE_SIZE);
        assert_eq!(config.identity.kind, IdentityKind::File);
        assert_eq!(config.documents.kind, DocumentsKind::Sqlite);
        assert!(config.documents.fields.is_empty());
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.concurrency, 10);
        assert_eq!(pipeline.page_size, 1000);
        assert_eq!(pipeline.fields, vec!["properties", "brands"]);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn pipeline_config_rejects_bad_values() {
        let mut pipeline = PipelineConfig::from(&AppConfig::default());
        pipeline.concurrency = 0;
        assert!(pipeline.validate().is_err());

        pipeline.concurrency = MAX_CONCURRENCY + 1;
        assert!(pipeline.validate().is_err());

        pipeline.concurrency = 2;
        pipeline.page_size = MAX_PAGE_SIZE + 1;
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn token_lookup() {
        // Use a unique env var name to avoid interfering with other tests
        assert!(read_token("ACCTFETCH_TEST_NONEXISTENT_TOKEN_12345").is_none());
    }

    #[test]
    fn base_url_validation() {
        let mut identity = IdentityConfig::default();
        assert!(identity.url().is_ok());
        identity.base_url = "not a url".into();
        assert!(identity.url().is_err());
    }
}
