mod favorites;
mod memory;
mod schema;
mod store;
mod types;

pub use memory::MemoryFavoriteStore;
pub use schema::Database;
pub use store::FavoriteStore;
pub use types::{DatabaseError, StoreError};
