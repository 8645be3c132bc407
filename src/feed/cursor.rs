use crate::model::PageToken;

/// Pagination state for the section feed.
///
/// `next == None` while not exhausted means "first page". Once a page comes back
/// empty or without a follow-up token the cursor is exhausted and stays that
/// way until [`PageCursor::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCursor {
    next: Option<PageToken>,
    exhausted: bool,
}

impl PageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to request next (`None` = first page).
    pub fn next(&self) -> Option<PageToken> {
        self.next
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Record the outcome of a page load.
    ///
    /// An empty page and a missing next token are checked independently:
    /// an upstream page can be non-empty yet terminal.
    pub fn advance(&mut self, next_token: Option<PageToken>, page_len: usize) {
        match next_token {
            Some(token) if page_len > 0 => self.next = Some(token),
            _ => {
                self.next = None;
                self.exhausted = true;
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_requests_first_page() {
        let cursor = PageCursor::new();
        assert_eq!(cursor.next(), None);
        assert!(!cursor.is_exhausted());
    }

    #[test]
    fn test_advance_stores_token() {
        let mut cursor = PageCursor::new();
        cursor.advance(Some(2), 3);
        assert_eq!(cursor.next(), Some(2));
        assert!(!cursor.is_exhausted());
    }

    #[test]
    fn test_missing_token_exhausts() {
        let mut cursor = PageCursor::new();
        cursor.advance(Some(2), 3);
        cursor.advance(None, 1);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn test_empty_page_exhausts_even_with_token() {
        let mut cursor = PageCursor::new();
        cursor.advance(Some(5), 0);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut cursor = PageCursor::new();
        cursor.advance(None, 0);
        cursor.reset();
        assert_eq!(cursor, PageCursor::new());
    }
}
