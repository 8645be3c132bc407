use std::collections::HashSet;

use super::products::{LoadStatus, ProductCache};
use crate::model::{Section, SectionId};

/// Decides which sections to load when the visible set changes.
///
/// Level-triggered: re-evaluating the same visible set is harmless because only
/// `NotLoaded` sections are returned and the cache guard rejects anything
/// already in flight. Also owns the selected section, whose first assignment
/// is a one-shot transition.
#[derive(Debug, Default)]
pub struct VisibilityScheduler {
    selected: Option<SectionId>,
}

impl VisibilityScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<SectionId> {
        self.selected
    }

    /// Select the first feed section if nothing is selected yet.
    ///
    /// Returns the newly selected id; `None` if a selection already existed or
    /// the feed is empty.
    pub fn select_initial(&mut self, feed: &[Section]) -> Option<SectionId> {
        if self.selected.is_some() {
            return None;
        }
        let first = feed.first()?.id;
        self.selected = Some(first);
        tracing::debug!(section_id = first, "Initial section selected");
        Some(first)
    }

    pub fn select(&mut self, section_id: SectionId) {
        self.selected = Some(section_id);
    }

    /// Visible sections that still need a load, in first-seen order without duplicates.
    pub fn pending<I>(&self, visible: I, cache: &ProductCache) -> Vec<SectionId>
    where
        I: IntoIterator<Item = SectionId>,
    {
        let mut seen = HashSet::new();
        visible
            .into_iter()
            .filter(|id| seen.insert(*id))
            .filter(|id| cache.status(*id) == LoadStatus::NotLoaded)
            .collect()
    }

    pub fn reset(&mut self) {
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SectionKind;
    use crate::source::SourceError;

    #[test]
    fn test_pending_only_not_loaded() {
        let mut cache = ProductCache::new();
        cache.try_begin(1); // loading
        cache.try_begin(2);
        cache.complete(2, Ok(vec![])); // loaded
        cache.try_begin(3);
        cache.complete(3, Err(SourceError::Unavailable("x".into()))); // failed

        let scheduler = VisibilityScheduler::new();
        assert_eq!(scheduler.pending([1, 2, 3, 4, 5], &cache), vec![4, 5]);
    }

    #[test]
    fn test_pending_dedupes_preserving_order() {
        let scheduler = VisibilityScheduler::new();
        let cache = ProductCache::new();
        assert_eq!(scheduler.pending([7, 3, 7, 1, 3], &cache), vec![7, 3, 1]);
    }

    #[test]
    fn test_pending_is_level_triggered() {
        let scheduler = VisibilityScheduler::new();
        let mut cache = ProductCache::new();
        for id in scheduler.pending([1, 2], &cache) {
            cache.try_begin(id);
        }
        assert!(scheduler.pending([1, 2], &cache).is_empty());
    }

    #[test]
    fn test_initial_selection_is_one_shot() {
        let mut scheduler = VisibilityScheduler::new();
        assert_eq!(scheduler.select_initial(&[]), None);

        let feed = vec![
            Section::new(4, "First", SectionKind::Grid),
            Section::new(5, "Second", SectionKind::Grid),
        ];
        assert_eq!(scheduler.select_initial(&feed), Some(4));
        assert_eq!(scheduler.select_initial(&feed[1..]), None);
        assert_eq!(scheduler.selected(), Some(4));

        scheduler.select(5);
        assert_eq!(scheduler.select_initial(&feed), None);
        assert_eq!(scheduler.selected(), Some(5));

        scheduler.reset();
        assert_eq!(scheduler.select_initial(&feed), Some(4));
    }
}
