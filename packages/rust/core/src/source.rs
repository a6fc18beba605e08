//! Paginated identity source.
//!
//! An [`IdentityProvider`] speaks the provider's page protocol; a
//! [`PagedReader`] flattens it into a forward-only stream of records that
//! the coordinator pulls one at a time.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::debug;

use acctfetch_shared::{MAX_PAGE_SIZE, RawRecord, Result, UserPage};

/// A lazy, finite, forward-only sequence of identity records.
#[async_trait]
pub trait IdentitySource: Send {
    /// Pull the next record. `Ok(None)` is the only clean end of stream;
    /// an `Err` means the source itself failed.
    async fn next(&mut self) -> Result<Option<RawRecord>>;
}

/// The provider side of pagination: one request per page.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch the page identified by `page_token` (`None` for the first page),
    /// holding at most `max_results` records.
    async fn list_page(&self, page_token: Option<&str>, max_results: usize) -> Result<UserPage>;
}

#[async_trait]
impl<P: IdentityProvider + ?Sized> IdentityProvider for Box<P> {
    async fn list_page(&self, page_token: Option<&str>, max_results: usize) -> Result<UserPage> {
        (**self).list_page(page_token, max_results).await
    }
}

/// Reads an [`IdentityProvider`] page by page, handing out one record per call.
pub struct PagedReader<P> {
    provider: P,
    page_size: usize,
    buffer: VecDeque<RawRecord>,
    next_token: Option<String>,
    more_pages: bool,
    pages_read: usize,
}

impl<P: IdentityProvider> PagedReader<P> {
    /// `page_size` is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(provider: P, page_size: usize) -> Self {
        Self {
            provider,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            buffer: VecDeque::new(),
            next_token: None,
            more_pages: true,
            pages_read: 0,
        }
    }

    /// Pages fetched so far.
    pub fn pages_read(&self) -> usize {
        self.pages_read
    }
}

#[async_trait]
impl<P: IdentityProvider> IdentitySource for PagedReader<P> {
    async fn next(&mut self) -> Result<Option<RawRecord>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if !self.more_pages {
                return Ok(None);
            }

            let token = self.next_token.take();
            let page = match self.provider.list_page(token.as_deref(), self.page_size).await {
                Ok(page) => page,
                Err(e) => {
                    // A failed source is never re-queried.
                    self.more_pages = false;
                    return Err(e);
                }
            };

            self.pages_read += 1;
            self.next_token = page.next_page_token.filter(|t| !t.is_empty());
            self.more_pages = self.next_token.is_some();
            debug!(
                page = self.pages_read,
                records = page.users.len(),
                more = self.more_pages,
                "fetched identity page"
            );
            self.buffer.extend(page.users);
        }
    }
}
