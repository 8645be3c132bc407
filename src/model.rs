//! Domain types shared by the sources, the favorites store and the feed session.
//!
//! Sections are immutable once fetched and never carry their items; items live in
//! the per-section product cache keyed by [`SectionId`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::util::format_price;

/// Identifier of a feed section.
pub type SectionId = i32;

/// Identifier of a product.
pub type ProductId = i64;

/// Pagination token for the section feed (a 1-based page number).
pub type PageToken = u32;

// ============================================================================
// Section
// ============================================================================

/// Layout hint attached to a section by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Horizontal,
    Vertical,
    Grid,
}

#[derive(Debug, Error)]
#[error("Unknown section kind: {0}")]
pub struct UnknownSectionKind(pub String);

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Horizontal => "horizontal",
            SectionKind::Vertical => "vertical",
            SectionKind::Grid => "grid",
        }
    }

    /// Parse a backend kind string, falling back to `Vertical` for anything unknown.
    pub fn parse_lossy(value: &str) -> Self {
        value.parse().unwrap_or_else(|e: UnknownSectionKind| {
            tracing::warn!(kind = %e.0, "Unknown section kind, using vertical layout");
            SectionKind::Vertical
        })
    }
}

impl FromStr for SectionKind {
    type Err = UnknownSectionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Ok(SectionKind::Horizontal),
            "vertical" => Ok(SectionKind::Vertical),
            "grid" => Ok(SectionKind::Grid),
            _ => Err(UnknownSectionKind(s.to_string())),
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed grouping of products in the home feed.
///
/// `title` uses `Arc<str>` so the feed sequence can be cloned cheaply into
/// snapshots handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: SectionId,
    pub title: Arc<str>,
    pub kind: SectionKind,
}

impl Section {
    pub fn new(id: SectionId, title: &str, kind: SectionKind) -> Self {
        Self {
            id,
            title: Arc::from(title),
            kind,
        }
    }
}

// ============================================================================
// Product
// ============================================================================

/// A purchasable item shown inside a section.
///
/// `favorite` is a projection of the favorite store: it is filled in when the
/// section is decorated and may briefly lead the store while a toggle is being
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: Arc<str>,
    pub image: String,
    pub original_price: u32,
    pub discounted_price: Option<u32>,
    pub sold_out: bool,
    pub favorite: bool,
}

/// How a product's price should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceLabel {
    Regular { price: u32 },
    Discounted { rate: u32, price: u32, original: u32 },
}

impl Product {
    /// Discount percentage relative to `original_price`.
    ///
    /// 0 when there is no discounted price or it is not below the original,
    /// otherwise `round((original - discounted) / original * 100)`.
    pub fn discount_rate(&self) -> u32 {
        match self.discounted_price {
            Some(discounted) if discounted < self.original_price => {
                let off = f64::from(self.original_price - discounted);
                (off / f64::from(self.original_price) * 100.0).round() as u32
            }
            _ => 0,
        }
    }

    pub fn has_discount(&self) -> bool {
        self.discount_rate() > 0
    }

    pub fn price_label(&self) -> PriceLabel {
        match self.discounted_price {
            Some(price) if self.has_discount() => PriceLabel::Discounted {
                rate: self.discount_rate(),
                price,
                original: self.original_price,
            },
            _ => PriceLabel::Regular {
                price: self.original_price,
            },
        }
    }
}

impl fmt::Display for PriceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceLabel::Regular { price } => f.write_str(&format_price(*price)),
            PriceLabel::Discounted {
                rate,
                price,
                original,
            } => write!(
                f,
                "{}% {} ({})",
                rate,
                format_price(*price),
                format_price(*original)
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) fn test_product(id: ProductId, original: u32, discounted: Option<u32>) -> Product {
    Product {
        id,
        name: Arc::from(format!("Product {id}")),
        image: format!("https://img.example.com/{id}.jpg"),
        original_price: original,
        discounted_price: discounted,
        sold_out: false,
        favorite: false,
    }
}
