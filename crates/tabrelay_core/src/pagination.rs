/// What to do after a page has been extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    /// Item cap reached.
    Done,
    /// Last allowed page processed.
    LastPage,
    /// Try to move to the next page.
    TryNext,
}

/// Page counter and item budget for paginated traversal.
#[derive(Debug, Clone)]
pub struct PageCursor {
    page: u32,
    max_pages: u32,
    max_items: usize,
    collected: usize,
}

impl PageCursor {
    pub fn new(max_pages: u32, max_items: usize) -> Self {
        Self {
            page: 1,
            max_pages,
            max_items,
            collected: 0,
        }
    }

    /// 1-based number of the page currently shown.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn collected(&self) -> usize {
        self.collected
    }

    pub fn record_page(&mut self, items: usize) -> PageStep {
        self.collected += items;
        if self.collected >= self.max_items {
            PageStep::Done
        } else if self.page >= self.max_pages {
            PageStep::LastPage
        } else {
            PageStep::TryNext
        }
    }

    /// The next-page control was clicked.
    pub fn advance(&mut self) {
        self.page += 1;
    }
}
