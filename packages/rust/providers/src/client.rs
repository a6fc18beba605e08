//! Shared HTTP client setup.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use url::Url;

use acctfetch_shared::{AcctFetchError, Result};

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("acctfetch/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// Default timeout in seconds for a single request.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response size we accept (10 MB).
pub(crate) const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Connection settings for an HTTP-backed collaborator.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout for each request in seconds.
    pub timeout_secs: u64,
    /// Bearer token sent as `Authorization`, if any.
    pub token: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            token: None,
        }
    }
}

impl ClientOptions {
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

/// Build a reqwest client with appropriate settings.
pub(crate) fn build_client(opts: &ClientOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| AcctFetchError::Network(format!("failed to build HTTP client: {e}")))
}

/// Attach the bearer token, if configured.
pub(crate) fn authorize(request: RequestBuilder, opts: &ClientOptions) -> RequestBuilder {
    match &opts.token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AcctFetchError::validation(format!("URL cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
