use async_trait::async_trait;
use std::collections::HashMap;

use super::types::StoreError;
use crate::model::ProductId;

/// Durable boolean favorite flags keyed by product id.
///
/// The store is the source of truth; in-memory product lists only project it.
/// Absent keys read as `false`.
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    async fn read(&self, product_id: ProductId) -> Result<bool, StoreError>;

    async fn write(&self, product_id: ProductId, favorite: bool) -> Result<(), StoreError>;

    /// Batch read. The default issues one [`FavoriteStore::read`] per id.
    async fn read_many(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, bool>, StoreError> {
        let mut flags = HashMap::with_capacity(product_ids.len());
        for &id in product_ids {
            flags.insert(id, self.read(id).await?);
        }
        Ok(flags)
    }
}
