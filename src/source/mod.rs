//! Upstream data sources for the home feed.
//!
//! The feed core only depends on two transport-agnostic contracts:
//!
//! - [`SectionSource`] - pages through section descriptors
//! - [`ProductSource`] - returns the products of one section
//!
//! [`HttpSource`] implements both against the commerce REST API; the [`mock`]
//! module provides scripted in-process sources for tests.
//!
//! # Example
//!
//! ```ignore
//! let source = HttpSource::new(reqwest::Client::new(), "https://kurly.com/", Duration::from_secs(30))?;
//! let page = source.fetch_sections(None).await?;
//! let products = source.fetch_products(page.sections[0].id).await?;
//! ```

mod http;
pub mod mock;

pub use http::HttpSource;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{PageToken, Product, Section, SectionId};

/// Transport-level failures from a section or product source.
///
/// Covers unreachable upstreams, non-2xx responses and malformed payloads.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body was not the expected JSON shape
    #[error("Malformed response: {0}")]
    Decode(String),
    /// Source unavailable for a reason outside HTTP (used by in-process sources)
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// One page of section descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionPage {
    pub sections: Vec<Section>,
    /// Token of the following page, `None` when the upstream reports no more pages.
    pub next_page: Option<PageToken>,
}

/// A paged source of sections.
///
/// `page == None` requests the first page.
#[async_trait]
pub trait SectionSource: Send + Sync {
    async fn fetch_sections(&self, page: Option<PageToken>) -> Result<SectionPage, SourceError>;
}

/// A source of the products belonging to one section.
///
/// Implementations must return products in upstream order; the cache never re-sorts.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch_products(&self, section_id: SectionId) -> Result<Vec<Product>, SourceError>;
}
