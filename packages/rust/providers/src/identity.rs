//! Identity providers: paginated HTTP endpoint and on-disk export.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use acctfetch_core::IdentityProvider;
use acctfetch_shared::{AcctFetchError, RawRecord, Result, UserPage};

use crate::client::{ClientOptions, MAX_RESPONSE_SIZE, authorize, build_client, join_segments};

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Reads `GET {base_url}/accounts?maxResults=N&pageToken=T`.
pub struct HttpIdentityProvider {
    client: Client,
    endpoint: Url,
    opts: ClientOptions,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &Url, opts: ClientOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(&opts)?,
            endpoint: join_segments(base_url, &["accounts"])?,
            opts,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn list_page(&self, page_token: Option<&str>, max_results: usize) -> Result<UserPage> {
        let mut request = self
            .client
            .get(self.endpoint.clone())
            .query(&[("maxResults", max_results.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = authorize(request, &self.opts)
            .send()
            .await
            .map_err(|e| AcctFetchError::Source(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcctFetchError::Source(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(AcctFetchError::Source(format!(
                    "{}: page too large ({len} bytes, max {MAX_RESPONSE_SIZE})",
                    self.endpoint
                )));
            }
        }

        let page: UserPage = response.json().await.map_err(|e| {
            AcctFetchError::Source(format!("{}: malformed page: {e}", self.endpoint))
        })?;
        debug!(records = page.users.len(), "accounts page received");
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// File export
// ---------------------------------------------------------------------------

/// Serves a `{"users": [...]}` export in pages, using offsets as page tokens.
#[derive(Debug)]
pub struct FileIdentityProvider {
    users: Vec<RawRecord>,
}

impl FileIdentityProvider {
    /// Load the export at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AcctFetchError::io(path, e))?;
        let export: UserPage = serde_json::from_str(&content).map_err(|e| {
            AcctFetchError::validation(format!("failed to parse {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), records = export.users.len(), "loaded account export");
        Ok(Self::from_records(export.users))
    }

    pub fn from_records(users: Vec<RawRecord>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl IdentityProvider for FileIdentityProvider {
    async fn list_page(&self, page_token: Option<&str>, max_results: usize) -> Result<UserPage> {
        let start = match page_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| AcctFetchError::Source(format!("invalid page token {token:?}")))?,
        };
        if start > self.users.len() {
            return Err(AcctFetchError::Source(format!(
                "page token {start} is past the end of the export"
            )));
        }

        let end = start
            .saturating_add(max_results.max(1))
            .min(self.users.len());
        Ok(UserPage {
            users: self.users[start..end].to_vec(),
            next_page_token: (end < self.users.len()).then(|| end.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use acctfetch_core::{IdentitySource, PagedReader};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn collect<S: IdentitySource>(source: &mut S) -> Result<Vec<String>> {
        let mut uids = Vec::new();
        while let Some(record) = source.next().await? {
            uids.push(record.uid);
        }
        Ok(uids)
    }

    #[tokio::test]
    async fn http_provider_walks_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/accounts"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{"uid": "u3", "customClaims": {"isAdmin": true}}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/accounts"))
            .and(query_param("maxResults", "2"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [
                    {"uid": "u1", "displayName": "Ana", "email": "ana@example.com"},
                    {"uid": "u2"}
                ],
                "nextPageToken": "p2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let base = Url::parse(&format!("{}/v1", server.uri())).unwrap();
        let opts = ClientOptions::default().with_token(Some("s3cret".into()));
        let provider = HttpIdentityProvider::new(&base, opts).unwrap();
        let mut reader = PagedReader::new(provider, 2);

        let uids = collect(&mut reader).await.unwrap();
        assert_eq!(uids, vec!["u1", "u2", "u3"]);
        assert_eq!(reader.pages_read(), 2);
    }

    #[tokio::test]
    async fn http_provider_error_status_is_source_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/accounts"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let provider = HttpIdentityProvider::new(&base, ClientOptions::default()).unwrap();
        let err = provider.list_page(None, 10).await.unwrap_err();
        assert!(matches!(err, AcctFetchError::Source(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn http_provider_rejects_malformed_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let provider = HttpIdentityProvider::new(&base, ClientOptions::default()).unwrap();
        let err = provider.list_page(None, 10).await.unwrap_err();
        assert!(err.to_string().contains("malformed page"));
    }

    #[tokio::test]
    async fn file_provider_pages_by_offset() {
        let users = (0..5)
            .map(|i| RawRecord::new(format!("u{i}"), "", ""))
            .collect();
        let provider = FileIdentityProvider::from_records(users);

        let first = provider.list_page(None, 2).await.unwrap();
        assert_eq!(first.users.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));

        let last = provider.list_page(Some("4"), 2).await.unwrap();
        assert_eq!(last.users[0].uid, "u4");
        assert!(last.next_page_token.is_none());

        assert!(provider.list_page(Some("nope"), 2).await.is_err());
        assert!(provider.list_page(Some("9"), 2).await.is_err());
    }

    #[tokio::test]
    async fn file_provider_handles_huge_page_size() {
        let users = (0..3)
            .map(|i| RawRecord::new(format!("u{i}"), "", ""))
            .collect();
        let provider = FileIdentityProvider::from_records(users);

        let page = provider.list_page(Some("1"), usize::MAX).await.unwrap();
        let uids: Vec<_> = page.users.iter().map(|u| u.uid.as_str()).collect();
        assert_eq!(uids, vec!["u1", "u2"]);
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn file_provider_reads_export() {
        let path = std::env::temp_dir().join(format!("acctfetch-export-{}.json", uuid::Uuid::now_v7()));
        let export = json!({
            "users": [
                {"uid": "u1", "email": "a@example.com"},
                {"uid": "u2", "customClaims": {"isAdmin": true}}
            ]
        });
        std::fs::write(&path, export.to_string()).unwrap();

        let provider = FileIdentityProvider::open(&path).unwrap();
        let mut reader = PagedReader::new(provider, 1);
        assert_eq!(collect(&mut reader).await.unwrap(), vec!["u1", "u2"]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn file_provider_reports_bad_json() {
        let path = std::env::temp_dir().join(format!("acctfetch-bad-{}.json", uuid::Uuid::now_v7()));
        std::fs::write(&path, "{not json").unwrap();
        let err = FileIdentityProvider::open(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
        let _ = std::fs::remove_file(&path);
    }
}
