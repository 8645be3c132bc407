//! Home feed engine: paged sections, lazily loaded per-section products and
//! optimistic favorites persisted to SQLite.

pub mod config;
pub mod feed;
pub mod model;
pub mod source;
pub mod storage;
pub mod util;
