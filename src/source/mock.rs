//! Scripted in-process sources for tests.
//!
//! Both mocks record every call before responding, and can be "held" so that a
//! call stays in flight until the test releases it through the returned
//! [`Notify`]. That makes in-flight states (Loading, optimistic toggles,
//! refresh races) observable deterministically.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use super::{ProductSource, SectionPage, SectionSource, SourceError};
use crate::model::{PageToken, Product, Section, SectionId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn wait_for_gate(gate: &Mutex<Option<Arc<Notify>>>) {
    let gate = lock(gate).clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
}

// ============================================================================
// Section Source
// ============================================================================

/// Mock section source serving pages keyed by page number (`None` is page 1).
#[derive(Debug, Default)]
pub struct MockSectionSource {
    inner: Mutex<MockSectionInner>,
    gate: Mutex<Option<Arc<Notify>>>,
}

#[derive(Debug, Default)]
struct MockSectionInner {
    pages: HashMap<PageToken, SectionPage>,
    calls: Vec<Option<PageToken>>,
    fail_next: Option<String>,
}

impl MockSectionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `sections` for `page`, advertising `next_page` as the following token.
    pub fn with_page(self, page: PageToken, sections: Vec<Section>, next_page: Option<PageToken>) -> Self {
        self.set_page(page, sections, next_page);
        self
    }

    pub fn set_page(&self, page: PageToken, sections: Vec<Section>, next_page: Option<PageToken>) {
        lock(&self.inner).pages.insert(
            page,
            SectionPage {
                sections,
                next_page,
            },
        );
    }

    /// Cause the next fetch to fail with [`SourceError::Unavailable`].
    pub fn fail_next(&self, error: &str) {
        lock(&self.inner).fail_next = Some(error.to_string());
    }

    /// Hold every subsequent fetch until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *lock(&self.gate) = Some(Arc::clone(&notify));
        notify
    }

    /// Stop holding fetches. Calls already waiting still need a notification.
    pub fn release(&self) {
        *lock(&self.gate) = None;
    }

    /// Page tokens requested so far, in call order.
    pub fn calls(&self) -> Vec<Option<PageToken>> {
        lock(&self.inner).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.inner).calls.len()
    }
}

#[async_trait]
impl SectionSource for MockSectionSource {
    async fn fetch_sections(&self, page: Option<PageToken>) -> Result<SectionPage, SourceError> {
        lock(&self.inner).calls.push(page);
        wait_for_gate(&self.gate).await;

        let mut inner = lock(&self.inner);
        if let Some(error) = inner.fail_next.take() {
            return Err(SourceError::Unavailable(error));
        }
        Ok(inner.pages.get(&page.unwrap_or(1)).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Product Source
// ============================================================================

/// Mock product source serving fixed product lists per section.
#[derive(Debug, Default)]
pub struct MockProductSource {
    inner: Mutex<MockProductInner>,
    gate: Mutex<Option<Arc<Notify>>>,
}

#[derive(Debug, Default)]
struct MockProductInner {
    products: HashMap<SectionId, Vec<Product>>,
    failing: HashSet<SectionId>,
    calls: Vec<SectionId>,
}

impl MockProductSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(self, section_id: SectionId, products: Vec<Product>) -> Self {
        self.set_products(section_id, products);
        self
    }

    pub fn set_products(&self, section_id: SectionId, products: Vec<Product>) {
        lock(&self.inner).products.insert(section_id, products);
    }

    /// Make every fetch for `section_id` fail until [`Self::recover`] is called.
    pub fn fail_section(&self, section_id: SectionId) {
        lock(&self.inner).failing.insert(section_id);
    }

    pub fn recover(&self, section_id: SectionId) {
        lock(&self.inner).failing.remove(&section_id);
    }

    /// Hold every subsequent fetch until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *lock(&self.gate) = Some(Arc::clone(&notify));
        notify
    }

    pub fn release(&self) {
        *lock(&self.gate) = None;
    }

    /// Section ids requested so far, in call order.
    pub fn calls(&self) -> Vec<SectionId> {
        lock(&self.inner).calls.clone()
    }

    pub fn calls_for(&self, section_id: SectionId) -> usize {
        lock(&self.inner)
            .calls
            .iter()
            .filter(|id| **id == section_id)
            .count()
    }
}

#[async_trait]
impl ProductSource for MockProductSource {
    async fn fetch_products(&self, section_id: SectionId) -> Result<Vec<Product>, SourceError> {
        lock(&self.inner).calls.push(section_id);
        wait_for_gate(&self.gate).await;

        let inner = lock(&self.inner);
        if inner.failing.contains(&section_id) {
            return Err(SourceError::Unavailable(format!(
                "section {section_id} unavailable"
            )));
        }
        Ok(inner.products.get(&section_id).cloned().unwrap_or_default())
    }
}
