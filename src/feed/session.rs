//! The consumer-facing feed session.
//!
//! [`HomeFeed`] owns the section feed, the per-section product cache, the
//! selection and the favorite coordinator behind a single lock. The lock is
//! never held across an await: every operation snapshots what it needs,
//! releases the lock, calls the source or store, then re-acquires the lock to
//! apply the result.
//!
//! Each in-flight operation is tagged with the session generation it started
//! in. `refresh`, `reset` and `close` bump the generation, so completions that
//! arrive afterwards are discarded without touching state.

use futures::stream::{self, StreamExt};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

use super::favorites::{decorate, FavoriteCoordinator, PendingToggle};
use super::loader::{load_page, SectionFeed};
use super::products::{LoadState, LoadStatus, ProductCache};
use super::scheduler::VisibilityScheduler;
use crate::model::{PageToken, Product, ProductId, Section, SectionId};
use crate::source::{ProductSource, SectionSource, SourceError};
use crate::storage::{FavoriteStore, StoreError};

/// Default bound on concurrent product loads started by one `notify_visible`.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 4;

// ============================================================================
// Outcomes and Events
// ============================================================================

/// Result of [`HomeFeed::load_next_page`] that is not a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// A page was fetched and appended.
    Loaded { added: usize, exhausted: bool },
    /// The cursor is terminal; nothing was fetched.
    Exhausted,
    /// Another page load is already running.
    InFlight,
    /// The session was refreshed or closed while the page was in flight.
    Stale,
}

/// Result of a per-section product load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    AlreadyLoading,
    AlreadyLoaded,
    Failed(String),
    Stale,
}

/// Result of [`HomeFeed::toggle_favorite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The store confirmed the optimistic value.
    Persisted { favorite: bool },
    /// The write failed and the in-memory flag was restored to `restored`.
    RolledBack { restored: bool, error: String },
    /// The write failed, but a newer toggle owns the flag so nothing was reverted.
    Superseded,
    /// The session was refreshed or closed before the write finished.
    Stale,
    /// The section is not loaded or does not contain the product.
    NotFound,
}

/// Snapshot of one section's products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionItems {
    pub status: LoadStatus,
    pub items: Arc<Vec<Product>>,
}

/// State changes pushed to an optional observer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    PageLoaded {
        page: Option<PageToken>,
        added: usize,
        exhausted: bool,
    },
    PageFailed {
        page: Option<PageToken>,
        error: String,
    },
    SectionLoaded {
        section_id: SectionId,
        count: usize,
    },
    SectionFailed {
        section_id: SectionId,
        error: String,
    },
    /// Optimistic value applied, before the store write resolves.
    FavoriteChanged {
        section_id: SectionId,
        product_id: ProductId,
        favorite: bool,
    },
    /// A failed write was compensated; `favorite` is the restored value.
    FavoriteRolledBack {
        section_id: SectionId,
        product_id: ProductId,
        favorite: bool,
    },
    Refreshed,
}

// ============================================================================
// Session State
// ============================================================================

#[derive(Debug, Default)]
struct FeedState {
    generation: u64,
    closed: bool,
    feed: SectionFeed,
    page_in_flight: bool,
    refreshing: bool,
    cache: ProductCache,
    scheduler: VisibilityScheduler,
    favorites: FavoriteCoordinator,
    last_store_error: Option<StoreError>,
}

impl FeedState {
    /// Drop the feed, cursor and product cache. The selection is left to the caller.
    fn clear(&mut self) {
        self.generation += 1;
        self.feed.reset();
        self.page_in_flight = false;
        self.refreshing = false;
        self.cache.clear();
    }
}

struct Inner {
    sections: Arc<dyn SectionSource>,
    products: Arc<dyn ProductSource>,
    favorites: Arc<dyn FavoriteStore>,
    events: Option<mpsc::Sender<FeedEvent>>,
    max_concurrent_loads: usize,
    state: RwLock<FeedState>,
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, FeedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FeedState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Undoes an in-flight marker if the owning future is dropped before completing.
struct InFlightGuard<'a> {
    inner: &'a Inner,
    generation: u64,
    section: Option<SectionId>,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn page(inner: &'a Inner, generation: u64) -> Self {
        Self {
            inner,
            generation,
            section: None,
            armed: true,
        }
    }

    fn section(inner: &'a Inner, generation: u64, section_id: SectionId) -> Self {
        Self {
            inner,
            generation,
            section: Some(section_id),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.write();
        if state.generation != self.generation {
            return;
        }
        match self.section {
            Some(section_id) => {
                tracing::debug!(section_id, "Product load cancelled");
                state.cache.abandon(section_id);
            }
            None => {
                tracing::debug!("Section page load cancelled");
                state.page_in_flight = false;
                state.refreshing = false;
            }
        }
    }
}

/// Compensates an optimistic toggle whose future is dropped before the write
/// result is applied, as if the write had failed.
struct ToggleGuard<'a> {
    inner: &'a Inner,
    generation: u64,
    pending: PendingToggle,
    armed: bool,
}

impl<'a> ToggleGuard<'a> {
    fn new(inner: &'a Inner, generation: u64, pending: PendingToggle) -> Self {
        Self {
            inner,
            generation,
            pending,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ToggleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut guard = self.inner.write();
        let state = &mut *guard;
        state.favorites.finish_write(&self.pending);
        if state.generation != self.generation {
            return;
        }
        let restored = state
            .cache
            .items_mut(self.pending.section_id)
            .is_some_and(|items| state.favorites.rollback(items, &self.pending));
        tracing::debug!(
            product_id = self.pending.product_id,
            section_id = self.pending.section_id,
            restored,
            "Favorite toggle cancelled"
        );
    }
}

// ============================================================================
// HomeFeed
// ============================================================================

/// Builder for [`HomeFeed`].
pub struct HomeFeedBuilder {
    sections: Arc<dyn SectionSource>,
    products: Arc<dyn ProductSource>,
    favorites: Arc<dyn FavoriteStore>,
    events: Option<mpsc::Sender<FeedEvent>>,
    max_concurrent_loads: usize,
}

impl HomeFeedBuilder {
    /// Send [`FeedEvent`]s to `tx` as state changes.
    pub fn events(mut self, tx: mpsc::Sender<FeedEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn max_concurrent_loads(mut self, limit: usize) -> Self {
        self.max_concurrent_loads = limit.max(1);
        self
    }

    pub fn build(self) -> HomeFeed {
        HomeFeed {
            inner: Arc::new(Inner {
                sections: self.sections,
                products: self.products,
                favorites: self.favorites,
                events: self.events,
                max_concurrent_loads: self.max_concurrent_loads,
                state: RwLock::new(FeedState::default()),
            }),
        }
    }
}

/// A home feed session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HomeFeed {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HomeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read();
        f.debug_struct("HomeFeed")
            .field("generation", &state.generation)
            .field("closed", &state.closed)
            .field("sections", &state.feed.len())
            .field("exhausted", &state.feed.is_exhausted())
            .finish_non_exhaustive()
    }
}

impl HomeFeed {
    pub fn new(
        sections: Arc<dyn SectionSource>,
        products: Arc<dyn ProductSource>,
        favorites: Arc<dyn FavoriteStore>,
    ) -> Self {
        Self::builder(sections, products, favorites).build()
    }

    pub fn builder(
        sections: Arc<dyn SectionSource>,
        products: Arc<dyn ProductSource>,
        favorites: Arc<dyn FavoriteStore>,
    ) -> HomeFeedBuilder {
        HomeFeedBuilder {
            sections,
            products,
            favorites,
            events: None,
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
        }
    }

    async fn emit(&self, event: FeedEvent) {
        if let Some(tx) = &self.inner.events {
            if let Err(e) = tx.send(event).await {
                tracing::warn!(error = %e, "Feed event receiver dropped");
            }
        }
    }

    /// Like `emit`, but drops the event instead of waiting on a full channel.
    fn try_emit(&self, event: FeedEvent) {
        if let Some(tx) = &self.inner.events {
            if let Err(e) = tx.try_send(event) {
                tracing::warn!(error = %e, "Dropping feed event");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Current ordered section sequence.
    pub fn feed(&self) -> Arc<Vec<Section>> {
        self.inner.read().feed.sections()
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner.read().feed.is_exhausted()
    }

    /// True from `refresh` until its first page settles.
    pub fn is_refreshing(&self) -> bool {
        self.inner.read().refreshing
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Error of the most recent failed page load, cleared by the next successful page.
    pub fn refresh_error(&self) -> Option<String> {
        self.inner.read().feed.last_error().map(str::to_string)
    }

    pub fn selected_section(&self) -> Option<SectionId> {
        self.inner.read().scheduler.selected()
    }

    pub fn load_state(&self, section_id: SectionId) -> LoadState {
        self.inner.read().cache.get(section_id)
    }

    pub fn items_for(&self, section_id: SectionId) -> SectionItems {
        let state = self.inner.read().cache.get(section_id);
        SectionItems {
            status: state.status(),
            items: state.items().cloned().unwrap_or_default(),
        }
    }

    /// Sections whose product load is in flight, ascending.
    pub fn loading_sections(&self) -> Vec<SectionId> {
        self.inner.read().cache.loading()
    }

    /// Error of the last failed product load for `section_id`.
    pub fn last_error(&self, section_id: SectionId) -> Option<String> {
        self.inner.read().cache.last_error(section_id).map(str::to_string)
    }

    /// Most recent favorite store write failure.
    pub fn last_store_error(&self) -> Option<StoreError> {
        self.inner.read().last_store_error.clone()
    }

    // ------------------------------------------------------------------------
    // Section paging
    // ------------------------------------------------------------------------

    /// Fetch the next section page and append it to the feed.
    ///
    /// Single-flight: a call made while another page is loading returns
    /// [`PageOutcome::InFlight`]. On a transport error the accumulated sections
    /// and the cursor are kept, so calling again retries the same page.
    pub async fn load_next_page(&self) -> Result<PageOutcome, SourceError> {
        let (generation, page) = {
            let mut state = self.inner.write();
            if state.closed {
                return Ok(PageOutcome::Stale);
            }
            if state.page_in_flight {
                return Ok(PageOutcome::InFlight);
            }
            if state.feed.is_exhausted() {
                return Ok(PageOutcome::Exhausted);
            }
            state.page_in_flight = true;
            (state.generation, state.feed.cursor().next())
        };

        let mut guard = InFlightGuard::page(&self.inner, generation);
        let result = load_page(self.inner.sections.as_ref(), page).await;
        guard.disarm();

        let (outcome, event) = {
            let mut state = self.inner.write();
            if state.generation != generation {
                tracing::debug!(page = ?page, "Discarding stale section page");
                return Ok(PageOutcome::Stale);
            }
            state.page_in_flight = false;
            state.refreshing = false;

            match result {
                Ok(fetched) => {
                    let added = state.feed.append(fetched);
                    let exhausted = state.feed.is_exhausted();
                    tracing::info!(
                        page = ?page,
                        added,
                        total = state.feed.len(),
                        exhausted,
                        "Section page loaded"
                    );
                    (
                        Ok(PageOutcome::Loaded { added, exhausted }),
                        FeedEvent::PageLoaded {
                            page,
                            added,
                            exhausted,
                        },
                    )
                }
                Err(e) => {
                    tracing::warn!(page = ?page, error = %e, "Section page load failed");
                    state.feed.record_error(&e);
                    let event = FeedEvent::PageFailed {
                        page,
                        error: e.to_string(),
                    };
                    (Err(e), event)
                }
            }
        };

        self.emit(event).await;
        outcome
    }

    /// Discard all feed state and start over from the first page.
    ///
    /// Favorite flags and the selected section are kept; once the first page
    /// lands the selected section is loaded again. In-flight loads and writes
    /// from before the refresh complete as stale.
    pub async fn refresh(&self) -> Result<PageOutcome, SourceError> {
        {
            let mut state = self.inner.write();
            if state.closed {
                return Ok(PageOutcome::Stale);
            }
            state.clear();
            state.refreshing = true;
            tracing::info!(generation = state.generation, "Refreshing feed");
        }
        self.emit(FeedEvent::Refreshed).await;

        let outcome = self.load_next_page().await;
        if let Ok(PageOutcome::Loaded { .. }) = outcome {
            if let Some(section_id) = self.selected_section() {
                tracing::debug!(section_id, "Reloading selected section after refresh");
                self.load_section(section_id).await;
            }
        }
        outcome
    }

    /// Clear the feed, cursor, product cache and selection without loading.
    pub fn reset(&self) {
        let mut state = self.inner.write();
        if state.closed {
            return;
        }
        state.clear();
        state.scheduler.reset();
        tracing::debug!(generation = state.generation, "Feed reset");
    }

    /// End the session. Every later completion is discarded and further loads
    /// return stale outcomes.
    pub fn close(&self) {
        let mut state = self.inner.write();
        if !state.closed {
            state.closed = true;
            state.generation += 1;
            tracing::debug!("Feed session closed");
        }
    }

    // ------------------------------------------------------------------------
    // Product loading
    // ------------------------------------------------------------------------

    /// Load one section's products, unless they are already loading or loaded.
    ///
    /// A `Failed` section is retried. Loaded items are decorated with the
    /// persisted favorite flags before they become visible.
    pub async fn load_section(&self, section_id: SectionId) -> LoadOutcome {
        let generation = {
            let mut state = self.inner.write();
            if state.closed {
                return LoadOutcome::Stale;
            }
            match state.cache.status(section_id) {
                LoadStatus::Loading => {
                    tracing::debug!(section_id, "Section already loading");
                    return LoadOutcome::AlreadyLoading;
                }
                LoadStatus::Loaded => return LoadOutcome::AlreadyLoaded,
                LoadStatus::NotLoaded | LoadStatus::Failed => {}
            }
            state.cache.try_begin(section_id);
            state.generation
        };

        let mut guard = InFlightGuard::section(&self.inner, generation, section_id);
        let result = match self.inner.products.fetch_products(section_id).await {
            Ok(items) => Ok(decorate(self.inner.favorites.as_ref(), section_id, items).await),
            Err(e) => Err(e),
        };
        guard.disarm();

        let (outcome, event) = {
            let mut state = self.inner.write();
            if state.generation != generation {
                tracing::debug!(section_id, "Discarding stale product load");
                return LoadOutcome::Stale;
            }
            match result {
                Ok(items) => {
                    let count = items.len();
                    state.cache.complete(section_id, Ok(items));
                    tracing::debug!(section_id, count, "Section products loaded");
                    (
                        LoadOutcome::Loaded(count),
                        FeedEvent::SectionLoaded { section_id, count },
                    )
                }
                Err(e) => {
                    tracing::warn!(section_id, error = %e, "Section products failed to load");
                    let error = e.to_string();
                    state.cache.complete(section_id, Err(e));
                    (
                        LoadOutcome::Failed(error.clone()),
                        FeedEvent::SectionFailed { section_id, error },
                    )
                }
            }
        };

        self.emit(event).await;
        outcome
    }

    /// Report the sections currently on screen.
    ///
    /// Loads every visible section that is still `NotLoaded`, at most
    /// `max_concurrent_loads` at a time. The first call after the feed gains
    /// sections also selects (and loads) the first section.
    pub async fn notify_visible<I>(&self, visible: I) -> Vec<(SectionId, LoadOutcome)>
    where
        I: IntoIterator<Item = SectionId>,
    {
        let pending = {
            let mut guard = self.inner.write();
            let state = &mut *guard;
            if state.closed {
                return Vec::new();
            }
            let sections = state.feed.sections();
            let initial = state.scheduler.select_initial(&sections);
            let mut pending = state.scheduler.pending(visible, &state.cache);
            if let Some(first) = initial {
                if state.cache.status(first) == LoadStatus::NotLoaded && !pending.contains(&first) {
                    pending.push(first);
                }
            }
            pending
        };

        if pending.is_empty() {
            return Vec::new();
        }
        tracing::debug!(sections = ?pending, "Loading visible sections");

        stream::iter(pending)
            .map(|section_id| async move { (section_id, self.load_section(section_id).await) })
            .buffer_unordered(self.inner.max_concurrent_loads)
            .collect()
            .await
    }

    /// Select a section and make sure its products are loaded.
    pub async fn select_section(&self, section_id: SectionId) -> LoadOutcome {
        {
            let mut state = self.inner.write();
            if state.closed {
                return LoadOutcome::Stale;
            }
            state.scheduler.select(section_id);
        }
        self.load_section(section_id).await
    }

    // ------------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------------

    /// Flip a product's favorite flag within `section_id`.
    ///
    /// The new value is visible through [`HomeFeed::items_for`] before the
    /// store write resolves. Writes for the same product reach the store in
    /// toggle order. A failed write reverts the flag only if no newer toggle
    /// of the same product in the same section has happened since. Dropping
    /// the returned future before it completes counts as a failed write.
    pub async fn toggle_favorite(&self, product_id: ProductId, section_id: SectionId) -> ToggleOutcome {
        let (generation, pending, mut ticket) = {
            let mut guard = self.inner.write();
            let state = &mut *guard;
            if state.closed {
                return ToggleOutcome::Stale;
            }
            let Some(items) = state.cache.items_mut(section_id) else {
                tracing::debug!(section_id, product_id, "Toggle on unloaded section");
                return ToggleOutcome::NotFound;
            };
            let Some((pending, ticket)) = state.favorites.begin_toggle(items, section_id, product_id) else {
                tracing::debug!(section_id, product_id, "Toggle on unknown product");
                return ToggleOutcome::NotFound;
            };
            (state.generation, pending, ticket)
        };

        let mut cancel = ToggleGuard::new(&self.inner, generation, pending);
        self.try_emit(FeedEvent::FavoriteChanged {
            section_id,
            product_id,
            favorite: pending.favorite,
        });

        ticket.wait_turn().await;
        let result = self.inner.favorites.write(product_id, pending.favorite).await;
        drop(ticket);
        cancel.disarm();

        let (outcome, event) = {
            let mut guard = self.inner.write();
            let state = &mut *guard;
            state.favorites.finish_write(&pending);
            if state.generation != generation {
                tracing::debug!(product_id, "Discarding stale favorite write result");
                return ToggleOutcome::Stale;
            }

            let error = match result {
                Ok(()) => {
                    return ToggleOutcome::Persisted {
                        favorite: pending.favorite,
                    }
                }
                Err(e) => e,
            };

            tracing::warn!(product_id, section_id, error = %error, "Favorite write failed");
            state.last_store_error = Some(error.clone());
            let restored = state
                .cache
                .items_mut(section_id)
                .is_some_and(|items| state.favorites.rollback(items, &pending));
            if !restored {
                tracing::debug!(product_id, "Favorite superseded by a newer toggle, not rolling back");
                return ToggleOutcome::Superseded;
            }
            (
                ToggleOutcome::RolledBack {
                    restored: !pending.favorite,
                    error: error.to_string(),
                },
                FeedEvent::FavoriteRolledBack {
                    section_id,
                    product_id,
                    favorite: !pending.favorite,
                },
            )
        };

        self.emit(event).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{test_product, SectionKind};
    use crate::source::mock::{MockProductSource, MockSectionSource};
    use crate::storage::MemoryFavoriteStore;
    use pretty_assertions::assert_eq;

    fn section(id: SectionId) -> Section {
        Section::new(id, &format!("Section {id}"), SectionKind::Horizontal)
    }

    fn session(
        sections: MockSectionSource,
        products: MockProductSource,
        store: MemoryFavoriteStore,
    ) -> (HomeFeed, Arc<MockSectionSource>, Arc<MockProductSource>, Arc<MemoryFavoriteStore>) {
        let sections = Arc::new(sections);
        let products = Arc::new(products);
        let store = Arc::new(store);
        let feed = HomeFeed::new(sections.clone(), products.clone(), store.clone());
        (feed, sections, products, store)
    }

    #[tokio::test]
    async fn test_page_failure_keeps_sections() {
        let (feed, sections, _, _) = session(
            MockSectionSource::new()
                .with_page(1, vec![section(1)], Some(2))
                .with_page(2, vec![section(2)], None),
            MockProductSource::new(),
            MemoryFavoriteStore::new(),
        );

        feed.load_next_page().await.unwrap();
        sections.fail_next("boom");
        assert!(feed.load_next_page().await.is_err());
        assert_eq!(feed.feed().len(), 1);
        assert!(feed.refresh_error().unwrap().contains("boom"));

        // retry the same page
        let outcome = feed.load_next_page().await.unwrap();
        assert_eq!(outcome, PageOutcome::Loaded { added: 1, exhausted: true });
        assert_eq!(sections.calls(), vec![None, Some(2), Some(2)]);
        assert_eq!(feed.refresh_error(), None);
    }

    #[tokio::test]
    async fn test_exhausted_does_not_call_source() {
        let (feed, sections, _, _) = session(
            MockSectionSource::new().with_page(1, vec![section(1)], None),
            MockProductSource::new(),
            MemoryFavoriteStore::new(),
        );

        feed.load_next_page().await.unwrap();
        assert_eq!(feed.load_next_page().await.unwrap(), PageOutcome::Exhausted);
        assert_eq!(sections.call_count(), 1);
    }

    #[tokio::test]
    async fn test_load_decorates_with_store_flags() {
        let (feed, _, _, _) = session(
            MockSectionSource::new(),
            MockProductSource::new()
                .with_products(1, vec![test_product(10, 100, None), test_product(11, 100, None)]),
            MemoryFavoriteStore::new().with_flag(11, true),
        );

        assert_eq!(feed.load_section(1).await, LoadOutcome::Loaded(2));
        let items = feed.items_for(1);
        assert_eq!(items.status, LoadStatus::Loaded);
        assert!(!items.items[0].favorite);
        assert!(items.items[1].favorite);
        assert_eq!(feed.load_section(1).await, LoadOutcome::AlreadyLoaded);
    }

    #[tokio::test]
    async fn test_failed_section_isolated_and_retryable() {
        let (feed, _, products, _) = session(
            MockSectionSource::new(),
            MockProductSource::new()
                .with_products(1, vec![test_product(10, 100, None)])
                .with_products(2, vec![test_product(20, 100, None)]),
            MemoryFavoriteStore::new(),
        );
        products.fail_section(2);

        let mut results = feed.notify_visible([1, 2]).await;
        results.sort_by_key(|(id, _)| *id);
        assert_eq!(results[0], (1, LoadOutcome::Loaded(1)));
        assert!(matches!(results[1], (2, LoadOutcome::Failed(_))));
        assert_eq!(feed.items_for(1).status, LoadStatus::Loaded);
        assert_eq!(feed.items_for(2).status, LoadStatus::Failed);
        assert!(feed.last_error(2).is_some());

        // visibility does not retry failures, explicit loads do
        assert!(feed.notify_visible([1, 2]).await.is_empty());
        products.recover(2);
        assert_eq!(feed.load_section(2).await, LoadOutcome::Loaded(1));
    }

    #[tokio::test]
    async fn test_initial_selection_once() {
        let (feed, _, products, _) = session(
            MockSectionSource::new().with_page(1, vec![section(5), section(6)], None),
            MockProductSource::new(),
            MemoryFavoriteStore::new(),
        );

        assert!(feed.notify_visible([]).await.is_empty());
        assert_eq!(feed.selected_section(), None);

        feed.load_next_page().await.unwrap();
        let results = feed.notify_visible([]).await;
        assert_eq!(results, vec![(5, LoadOutcome::Loaded(0))]);
        assert_eq!(feed.selected_section(), Some(5));

        feed.select_section(6).await;
        feed.notify_visible([]).await;
        assert_eq!(feed.selected_section(), Some(6));
        assert_eq!(products.calls(), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_toggle_unknown_targets() {
        let (feed, _, _, store) = session(
            MockSectionSource::new(),
            MockProductSource::new().with_products(1, vec![test_product(10, 100, None)]),
            MemoryFavoriteStore::new(),
        );

        assert_eq!(feed.toggle_favorite(10, 1).await, ToggleOutcome::NotFound);
        feed.load_section(1).await;
        assert_eq!(feed.toggle_favorite(99, 1).await, ToggleOutcome::NotFound);
        assert!(store.write_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_persists_and_rolls_back() {
        let (feed, _, _, store) = session(
            MockSectionSource::new(),
            MockProductSource::new().with_products(1, vec![test_product(10, 100, None)]),
            MemoryFavoriteStore::new(),
        );
        feed.load_section(1).await;

        assert_eq!(
            feed.toggle_favorite(10, 1).await,
            ToggleOutcome::Persisted { favorite: true }
        );
        assert!(store.get(10));

        store.fail_next_writes(1);
        let outcome = feed.toggle_favorite(10, 1).await;
        assert!(matches!(outcome, ToggleOutcome::RolledBack { restored: true, .. }));
        assert!(feed.items_for(1).items[0].favorite);
        assert!(store.get(10));
        assert!(feed.last_store_error().is_some());
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let (tx, mut rx) = mpsc::channel(16);
        let feed = HomeFeed::builder(
            Arc::new(MockSectionSource::new().with_page(1, vec![section(1)], None)),
            Arc::new(MockProductSource::new().with_products(1, vec![test_product(10, 100, None)])),
            Arc::new(MemoryFavoriteStore::new()),
        )
        .events(tx)
        .max_concurrent_loads(2)
        .build();

        feed.load_next_page().await.unwrap();
        feed.load_section(1).await;
        feed.toggle_favorite(10, 1).await;

        assert_eq!(
            rx.recv().await,
            Some(FeedEvent::PageLoaded {
                page: None,
                added: 1,
                exhausted: true
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(FeedEvent::SectionLoaded {
                section_id: 1,
                count: 1
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(FeedEvent::FavoriteChanged {
                section_id: 1,
                product_id: 10,
                favorite: true
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_load_returns_to_not_loaded() {
        let products = MockProductSource::new().with_products(1, vec![test_product(10, 100, None)]);
        let gate = products.hold();
        let (feed, _, products, _) = session(MockSectionSource::new(), products, MemoryFavoriteStore::new());

        let load = feed.load_section(1);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), load).await;
        assert!(timed_out.is_err());
        assert_eq!(feed.items_for(1).status, LoadStatus::NotLoaded);

        products.release();
        drop(gate);
        assert_eq!(feed.load_section(1).await, LoadOutcome::Loaded(1));
    }

    #[tokio::test]
    async fn test_cancelled_toggle_rolls_back() {
        let store = MemoryFavoriteStore::new();
        let gate = store.hold_writes();
        let (feed, _, _, store) = session(
            MockSectionSource::new(),
            MockProductSource::new().with_products(1, vec![test_product(10, 100, None)]),
            store,
        );
        feed.load_section(1).await;

        let toggle = feed.toggle_favorite(10, 1);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), toggle).await;
        assert!(timed_out.is_err());
        assert!(!feed.items_for(1).items[0].favorite);
        assert!(!store.get(10));

        // the write queue was released, so the next toggle goes through
        store.release_writes();
        drop(gate);
        assert_eq!(
            feed.toggle_favorite(10, 1).await,
            ToggleOutcome::Persisted { favorite: true }
        );
        assert!(feed.items_for(1).items[0].favorite);
    }

    #[tokio::test]
    async fn test_full_event_channel_does_not_block_toggle() {
        let (tx, _rx) = mpsc::channel(1);
        let store = Arc::new(MemoryFavoriteStore::new());
        let feed = HomeFeed::builder(
            Arc::new(MockSectionSource::new()),
            Arc::new(MockProductSource::new().with_products(1, vec![test_product(10, 100, None)])),
            store.clone(),
        )
        .events(tx)
        .build();

        // SectionLoaded fills the channel and nobody drains it
        assert_eq!(feed.load_section(1).await, LoadOutcome::Loaded(1));

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            feed.toggle_favorite(10, 1),
        )
        .await
        .unwrap();
        assert_eq!(outcome, ToggleOutcome::Persisted { favorite: true });
        assert!(store.get(10));
    }

    #[tokio::test]
    async fn test_closed_session_is_inert() {
        let (feed, sections, products, _) = session(
            MockSectionSource::new().with_page(1, vec![section(1)], None),
            MockProductSource::new(),
            MemoryFavoriteStore::new(),
        );
        feed.close();

        assert_eq!(feed.load_next_page().await.unwrap(), PageOutcome::Stale);
        assert_eq!(feed.refresh().await.unwrap(), PageOutcome::Stale);
        assert_eq!(feed.load_section(1).await, LoadOutcome::Stale);
        assert!(feed.notify_visible([1]).await.is_empty());
        assert_eq!(sections.call_count(), 0);
        assert!(products.calls().is_empty());
        assert!(feed.is_closed());
    }
}
