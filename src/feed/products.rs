use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Product, SectionId};
use crate::source::SourceError;

/// Load state of one section's product list.
///
/// Transitions are `NotLoaded -> Loading -> Loaded | Failed`. `Loaded` is never
/// re-entered into `Loading`; `Failed` may be retried.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    NotLoaded,
    Loading,
    Loaded(Arc<Vec<Product>>),
    Failed,
}

/// `LoadState` without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

impl LoadState {
    pub fn status(&self) -> LoadStatus {
        match self {
            LoadState::NotLoaded => LoadStatus::NotLoaded,
            LoadState::Loading => LoadStatus::Loading,
            LoadState::Loaded(_) => LoadStatus::Loaded,
            LoadState::Failed => LoadStatus::Failed,
        }
    }

    pub fn items(&self) -> Option<&Arc<Vec<Product>>> {
        match self {
            LoadState::Loaded(items) => Some(items),
            _ => None,
        }
    }
}

/// Per-section product cache.
///
/// Pure state: the owner serialises access (the feed session keeps it behind a
/// lock) so that [`ProductCache::try_begin`] is the atomic guard for a section.
#[derive(Debug, Default)]
pub struct ProductCache {
    entries: HashMap<SectionId, LoadState>,
    last_errors: HashMap<SectionId, String>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, section_id: SectionId) -> LoadState {
        self.entries.get(&section_id).cloned().unwrap_or_default()
    }

    pub fn status(&self, section_id: SectionId) -> LoadStatus {
        self.entries
            .get(&section_id)
            .map_or(LoadStatus::NotLoaded, LoadState::status)
    }

    /// Guard + transition to `Loading`.
    ///
    /// Returns `false` (and changes nothing) if the section is already
    /// `Loading` or `Loaded`.
    pub fn try_begin(&mut self, section_id: SectionId) -> bool {
        match self.status(section_id) {
            LoadStatus::Loading | LoadStatus::Loaded => false,
            LoadStatus::NotLoaded | LoadStatus::Failed => {
                self.entries.insert(section_id, LoadState::Loading);
                true
            }
        }
    }

    /// Apply a completed load. Ignored unless the section is still `Loading`
    /// (a `clear` in between makes the completion stale).
    pub fn complete(&mut self, section_id: SectionId, result: Result<Vec<Product>, SourceError>) -> bool {
        if self.status(section_id) != LoadStatus::Loading {
            tracing::debug!(section_id, "Dropping product load completion for non-loading section");
            return false;
        }
        match result {
            Ok(items) => {
                self.last_errors.remove(&section_id);
                self.entries.insert(section_id, LoadState::Loaded(Arc::new(items)));
            }
            Err(e) => {
                self.last_errors.insert(section_id, e.to_string());
                self.entries.insert(section_id, LoadState::Failed);
            }
        }
        true
    }

    /// Return a `Loading` section to `NotLoaded` when its load was cancelled
    /// before completing.
    pub fn abandon(&mut self, section_id: SectionId) {
        if self.status(section_id) == LoadStatus::Loading {
            self.entries.remove(&section_id);
        }
    }

    /// Mutable access to a loaded section's items (copy-on-write).
    pub fn items_mut(&mut self, section_id: SectionId) -> Option<&mut Vec<Product>> {
        match self.entries.get_mut(&section_id) {
            Some(LoadState::Loaded(items)) => Some(Arc::make_mut(items)),
            _ => None,
        }
    }

    /// Sections currently `Loading`, ascending.
    pub fn loading(&self) -> Vec<SectionId> {
        let mut ids: Vec<SectionId> = self
            .entries
            .iter()
            .filter(|(_, state)| matches!(state, LoadState::Loading))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn last_error(&self, section_id: SectionId) -> Option<&str> {
        self.last_errors.get(&section_id).map(String::as_str)
    }

    /// Reset every section to `NotLoaded`.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_errors.clear();
    }
}
