use std::collections::HashSet;
use std::sync::Arc;

use super::cursor::PageCursor;
use crate::model::{PageToken, Section, SectionId};
use crate::source::{SectionPage, SectionSource, SourceError};

/// Fetch one page and normalise its terminal marker.
///
/// The returned `next_page` is `None` when the page is empty or when the source
/// reports no following page.
pub async fn load_page(
    source: &dyn SectionSource,
    page: Option<PageToken>,
) -> Result<SectionPage, SourceError> {
    let mut fetched = source.fetch_sections(page).await?;
    if fetched.sections.is_empty() {
        tracing::debug!(page = ?page, "Empty section page, no more pages");
        fetched.next_page = None;
    } else if fetched.next_page.is_none() {
        tracing::debug!(page = ?page, "Last section page");
    }
    Ok(fetched)
}

/// The growable, ordered section sequence plus its pagination cursor.
///
/// Pagination only ever appends: existing sections keep their position and a
/// section id already seen is never added again.
///
/// `sections` is an `Arc<Vec<_>>` so snapshots handed out to consumers are
/// O(1); appends go through `Arc::make_mut` and only copy while a snapshot is
/// still alive.
#[derive(Debug, Clone, Default)]
pub struct SectionFeed {
    sections: Arc<Vec<Section>>,
    seen: HashSet<SectionId>,
    cursor: PageCursor,
    last_error: Option<String>,
}

impl SectionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sections(&self) -> Arc<Vec<Section>> {
        Arc::clone(&self.sections)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn contains(&self, section_id: SectionId) -> bool {
        self.seen.contains(&section_id)
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_exhausted()
    }

    /// Error from the most recent failed page load, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Append a fetched page, returning how many new sections were added.
    pub fn append(&mut self, page: SectionPage) -> usize {
        let fetched = page.sections.len();
        self.cursor.advance(page.next_page, fetched);
        self.last_error = None;

        let sections = Arc::make_mut(&mut self.sections);
        let before = sections.len();
        for section in page.sections {
            if self.seen.insert(section.id) {
                sections.push(section);
            } else {
                tracing::debug!(section_id = section.id, "Dropping duplicate section");
            }
        }
        sections.len() - before
    }

    /// Record a failed page load. Accumulated sections and the cursor are kept,
    /// so the same page can be retried.
    pub fn record_error(&mut self, error: &SourceError) {
        self.last_error = Some(error.to_string());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
