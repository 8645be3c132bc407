use anyhow::Result;
use async_trait::async_trait;
use sqlx::QueryBuilder;
use std::collections::HashMap;

use super::schema::Database;
use super::store::FavoriteStore;
use super::types::StoreError;
use crate::model::ProductId;

/// SQLite caps bound parameters per statement; stay well under the default.
const MAX_IDS_PER_QUERY: usize = 500;

impl Database {
    // ========================================================================
    // Favorite Operations
    // ========================================================================

    /// Get the favorite flag for a product. Missing rows read as `false`.
    pub async fn get_favorite(&self, product_id: ProductId) -> Result<bool> {
        let row: Option<(bool,)> = sqlx::query_as("SELECT favorite FROM favorites WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some_and(|(favorite,)| favorite))
    }

    /// Set the favorite flag for a product (UPSERT).
    pub async fn set_favorite(&self, product_id: ProductId, favorite: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO favorites (product_id, favorite, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(product_id) DO UPDATE SET
                favorite = excluded.favorite,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(product_id)
        .bind(favorite)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the favorite flags for many products at once.
    ///
    /// Every requested id is present in the result; ids without a row map to `false`.
    pub async fn get_favorites(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, bool>> {
        let mut flags: HashMap<ProductId, bool> = product_ids.iter().map(|&id| (id, false)).collect();

        for chunk in product_ids.chunks(MAX_IDS_PER_QUERY) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT product_id, favorite FROM favorites WHERE product_id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let rows: Vec<(ProductId, bool)> = builder.build_query_as().fetch_all(&self.pool).await?;
            for (id, favorite) in rows {
                flags.insert(id, favorite);
            }
        }

        Ok(flags)
    }

    /// Ids of all products currently marked favorite, ascending.
    pub async fn favorite_product_ids(&self) -> Result<Vec<ProductId>> {
        let rows: Vec<(ProductId,)> =
            sqlx::query_as("SELECT product_id FROM favorites WHERE favorite = 1 ORDER BY product_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl FavoriteStore for Database {
    async fn read(&self, product_id: ProductId) -> Result<bool, StoreError> {
        self.get_favorite(product_id)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn write(&self, product_id: ProductId, favorite: bool) -> Result<(), StoreError> {
        self.set_favorite(product_id, favorite)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn read_many(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, bool>, StoreError> {
        self.get_favorites(product_ids)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}
