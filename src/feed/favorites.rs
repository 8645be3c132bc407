use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::model::{Product, ProductId, SectionId};
use crate::storage::FavoriteStore;

/// Apply persisted favorite flags to freshly fetched products.
///
/// Store read failures are not fatal: the section still loads, with every item
/// shown as not favorited.
pub async fn decorate(
    store: &dyn FavoriteStore,
    section_id: SectionId,
    mut items: Vec<Product>,
) -> Vec<Product> {
    if items.is_empty() {
        return items;
    }

    let ids: Vec<ProductId> = items.iter().map(|p| p.id).collect();
    match store.read_many(&ids).await {
        Ok(flags) => {
            for item in &mut items {
                item.favorite = flags.get(&item.id).copied().unwrap_or(false);
            }
        }
        Err(e) => {
            tracing::warn!(section_id, error = %e, "Failed to read favorite flags, showing none");
            for item in &mut items {
                item.favorite = false;
            }
        }
    }
    items
}

/// An optimistic toggle that has been applied in memory but not yet persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingToggle {
    pub product_id: ProductId,
    pub section_id: SectionId,
    /// Value written optimistically (and being persisted).
    pub favorite: bool,
    /// Version of the product's flag within `section_id` assigned to this toggle.
    pub version: u64,
    /// Position in the product's store write queue.
    slot: u64,
}

/// Place in the per-product write queue.
///
/// Store writes for one product are issued in toggle order: a ticket waits for
/// its predecessor to be dropped before [`WriteTicket::wait_turn`] returns.
/// Dropping a ticket (including a cancelled toggle) always unblocks the next one.
#[derive(Debug)]
pub struct WriteTicket {
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl WriteTicket {
    pub async fn wait_turn(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Err just means the predecessor was dropped, which is also our turn.
            let _ = previous.await;
        }
    }
}

/// Optimistic favorite toggles with versioned rollback.
///
/// A toggle flips the flag of one product within one section's list, so
/// versions are kept per `(section, product)`: a failed write rolls that
/// section's flag back only if no newer toggle of the same product in the same
/// section has happened since. The store write queue is per product across
/// sections, so the store always ends on the last toggle that was written.
#[derive(Debug, Default)]
pub struct FavoriteCoordinator {
    versions: HashMap<(SectionId, ProductId), u64>,
    write_queue: HashMap<ProductId, (u64, oneshot::Receiver<()>)>,
    next_slot: u64,
}

impl FavoriteCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest toggle version of a product within a section (0 if never toggled).
    pub fn version(&self, section_id: SectionId, product_id: ProductId) -> u64 {
        self.versions
            .get(&(section_id, product_id))
            .copied()
            .unwrap_or(0)
    }

    /// Flip the product's flag in `items` and assign the toggle a version.
    ///
    /// Returns `None` if the product is not in `items`.
    pub fn begin_toggle(
        &mut self,
        items: &mut [Product],
        section_id: SectionId,
        product_id: ProductId,
    ) -> Option<(PendingToggle, WriteTicket)> {
        let current = items.iter().find(|p| p.id == product_id)?.favorite;
        let favorite = !current;
        for item in items.iter_mut().filter(|p| p.id == product_id) {
            item.favorite = favorite;
        }

        let version = self.versions.entry((section_id, product_id)).or_insert(0);
        *version += 1;
        let version = *version;

        self.next_slot += 1;
        let slot = self.next_slot;
        let (done, queued) = oneshot::channel();
        let previous = self
            .write_queue
            .insert(product_id, (slot, queued))
            .map(|(_, previous)| previous);

        Some((
            PendingToggle {
                product_id,
                section_id,
                favorite,
                version,
                slot,
            },
            WriteTicket {
                previous,
                _done: done,
            },
        ))
    }

    /// Whether no newer toggle has superseded `pending`.
    pub fn is_current(&self, pending: &PendingToggle) -> bool {
        self.version(pending.section_id, pending.product_id) == pending.version
    }

    /// Compensate a failed write by restoring the pre-toggle value.
    ///
    /// No-op (returns `false`) if a newer toggle exists or the product is gone.
    pub fn rollback(&self, items: &mut [Product], pending: &PendingToggle) -> bool {
        if !self.is_current(pending) {
            return false;
        }
        let mut restored = false;
        for item in items.iter_mut().filter(|p| p.id == pending.product_id) {
            item.favorite = !pending.favorite;
            restored = true;
        }
        restored
    }

    /// Drop the queue entry once the last queued write for a product has finished.
    pub fn finish_write(&mut self, pending: &PendingToggle) {
        let is_tail = self
            .write_queue
            .get(&pending.product_id)
            .is_some_and(|(slot, _)| *slot == pending.slot);
        if is_tail {
            self.write_queue.remove(&pending.product_id);
        }
    }
}
