//! Concrete identity providers and document stores.
//!
//! - [`HttpIdentityProvider`]: paginated accounts endpoint
//! - [`FileIdentityProvider`]: JSON account export on disk
//! - [`HttpDocumentStore`]: one GET per document

mod client;
mod documents;
mod identity;

pub use client::ClientOptions;
pub use documents::HttpDocumentStore;
pub use identity::{FileIdentityProvider, HttpIdentityProvider};
