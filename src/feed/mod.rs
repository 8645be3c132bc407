//! Feed loading and state synchronisation.
//!
//! Leaf-first:
//!
//! - [`cursor`] - pagination cursor with a terminal marker
//! - [`loader`] - the append-only, id-deduplicated section sequence
//! - [`products`] - per-section product cache with the in-flight guard
//! - [`scheduler`] - visibility-driven load selection and the selected section
//! - [`favorites`] - favorite decoration and optimistic toggles
//! - [`session`] - [`HomeFeed`], the consumer surface tying them together
//!
//! # Example
//!
//! ```ignore
//! let feed = HomeFeed::new(source.clone(), source, Arc::new(db));
//! while let Ok(PageOutcome::Loaded { exhausted: false, .. }) = feed.load_next_page().await {}
//!
//! let visible: Vec<_> = feed.feed().iter().take(3).map(|s| s.id).collect();
//! feed.notify_visible(visible).await;
//! feed.toggle_favorite(product_id, section_id).await;
//! ```

pub mod cursor;
pub mod favorites;
pub mod loader;
pub mod products;
pub mod scheduler;
pub mod session;

pub use cursor::PageCursor;
pub use favorites::{decorate, FavoriteCoordinator, PendingToggle};
pub use loader::{load_page, SectionFeed};
pub use products::{LoadState, LoadStatus, ProductCache};
pub use scheduler::VisibilityScheduler;
pub use session::{
    FeedEvent, HomeFeed, HomeFeedBuilder, LoadOutcome, PageOutcome, SectionItems, ToggleOutcome,
    DEFAULT_MAX_CONCURRENT_LOADS,
};
