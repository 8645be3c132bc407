use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{ProductSource, SectionPage, SectionSource, SourceError};
use crate::model::{PageToken, Product, ProductId, Section, SectionId, SectionKind};
use crate::util::{validate_base_url, BaseUrlError};

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const FIRST_PAGE: PageToken = 1;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SectionListResponse {
    data: Vec<SectionDto>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next_page: Option<PageToken>,
}

#[derive(Debug, Deserialize)]
struct SectionDto {
    id: SectionId,
    title: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct SectionProductsResponse {
    data: Vec<ProductDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductDto {
    id: ProductId,
    name: String,
    image: String,
    original_price: u32,
    #[serde(default)]
    discounted_price: Option<u32>,
    #[serde(rename = "is_sold_out", default)]
    sold_out: bool,
}

impl From<SectionDto> for Section {
    fn from(dto: SectionDto) -> Self {
        Section {
            id: dto.id,
            title: Arc::from(dto.title),
            kind: SectionKind::parse_lossy(&dto.kind),
        }
    }
}

impl From<ProductDto> for Product {
    fn from(dto: ProductDto) -> Self {
        Product {
            id: dto.id,
            name: Arc::from(dto.name),
            image: dto.image,
            original_price: dto.original_price,
            discounted_price: dto.discounted_price,
            sold_out: dto.sold_out,
            favorite: false,
        }
    }
}

// ============================================================================
// HTTP Source
// ============================================================================

/// Section and product source backed by the commerce REST API.
///
/// - `GET {base}/sections?page=N`
/// - `GET {base}/section/products?sectionId=N`
///
/// Every request is bounded by `timeout`, non-2xx responses fail with
/// [`SourceError::HttpStatus`], and bodies are capped at 10MB. Retries are left
/// to the caller.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, BaseUrlError> {
        Ok(Self {
            client,
            base_url: validate_base_url(base_url)?,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, SourceError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| SourceError::Unavailable(format!("invalid endpoint {path}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        tracing::debug!(url = %url, "Requesting");

        let response = tokio::time::timeout(self.timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| SourceError::Timeout)?
            .map_err(SourceError::Network)?;

        if !response.status().is_success() {
            tracing::warn!(url = %url, status = %response.status(), "Upstream returned error status");
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        let bytes = tokio::time::timeout(self.timeout, read_limited_bytes(response, MAX_RESPONSE_SIZE))
            .await
            .map_err(|_| SourceError::Timeout)??;

        serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SectionSource for HttpSource {
    async fn fetch_sections(&self, page: Option<PageToken>) -> Result<SectionPage, SourceError> {
        let page = page.unwrap_or(FIRST_PAGE);
        let url = self.endpoint("sections", &[("page", page.to_string())])?;
        let response: SectionListResponse = self.get_json(url).await?;

        let next_page = response.paging.and_then(|p| p.next_page);
        let sections: Vec<Section> = response.data.into_iter().map(Section::from).collect();
        tracing::debug!(page, count = sections.len(), next_page = ?next_page, "Fetched section page");

        Ok(SectionPage {
            sections,
            next_page,
        })
    }
}

#[async_trait]
impl ProductSource for HttpSource {
    async fn fetch_products(&self, section_id: SectionId) -> Result<Vec<Product>, SourceError> {
        let url = self.endpoint("section/products", &[("sectionId", section_id.to_string())])?;
        let response: SectionProductsResponse = self.get_json(url).await?;

        let products: Vec<Product> = response.data.into_iter().map(Product::from).collect();
        tracing::debug!(section_id, count = products.len(), "Fetched section products");
        Ok(products)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, SourceError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(SourceError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(SourceError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SourceError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
