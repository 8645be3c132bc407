use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use super::store::FavoriteStore;
use super::types::StoreError;
use crate::model::ProductId;

/// In-process favorite store.
///
/// Used for `--ephemeral` runs and tests. Writes can be made to fail
/// (`fail_next_writes`) or held in flight (`hold_writes`) so optimistic
/// toggles can be observed before they are confirmed.
#[derive(Debug, Default)]
pub struct MemoryFavoriteStore {
    inner: Mutex<MemoryInner>,
    write_gate: Mutex<Option<Arc<Notify>>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    flags: HashMap<ProductId, bool>,
    pending_write_failures: usize,
    fail_reads: bool,
    write_attempts: Vec<(ProductId, bool)>,
}

impl MemoryFavoriteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a flag without counting it as a write attempt.
    pub fn with_flag(self, product_id: ProductId, favorite: bool) -> Self {
        self.lock().flags.insert(product_id, favorite);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current persisted value, bypassing failure injection.
    pub fn get(&self, product_id: ProductId) -> bool {
        self.lock().flags.get(&product_id).copied().unwrap_or(false)
    }

    /// Fail the next `count` writes (in the order they reach the store).
    pub fn fail_next_writes(&self, count: usize) {
        self.lock().pending_write_failures = count;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Hold every subsequent write until the returned handle is notified.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.write_gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&notify));
        notify
    }

    pub fn release_writes(&self) {
        *self.write_gate.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Every write received, in arrival order, including failed ones.
    pub fn write_attempts(&self) -> Vec<(ProductId, bool)> {
        self.lock().write_attempts.clone()
    }
}

#[async_trait]
impl FavoriteStore for MemoryFavoriteStore {
    async fn read(&self, product_id: ProductId) -> Result<bool, StoreError> {
        let inner = self.lock();
        if inner.fail_reads {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(inner.flags.get(&product_id).copied().unwrap_or(false))
    }

    async fn write(&self, product_id: ProductId, favorite: bool) -> Result<(), StoreError> {
        self.lock().write_attempts.push((product_id, favorite));

        let gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut inner = self.lock();
        if inner.pending_write_failures > 0 {
            inner.pending_write_failures -= 1;
            return Err(StoreError::Unavailable(format!(
                "write rejected for product {product_id}"
            )));
        }
        inner.flags.insert(product_id, favorite);
        Ok(())
    }
}
