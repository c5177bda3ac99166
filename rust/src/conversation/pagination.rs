pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Offset-based backward paging over history. The server's `has_more` flag is the only
/// exhaustion signal; a short page is not.
#[derive(Debug, Clone)]
pub struct PaginationCursor {
    page_size: u32,
    loaded_count: usize,
    has_more: bool,
    in_flight: bool,
}

impl PaginationCursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            loaded_count: 0,
            has_more: true,
            in_flight: false,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn next_offset(&self) -> usize {
        self.loaded_count
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Claim the next page. `None` when history is exhausted or a page is already loading.
    pub fn begin_load(&mut self) -> Option<usize> {
        if !self.has_more || self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(self.loaded_count)
    }

    /// Server rows count toward the offset even when they turn out to be duplicates: the
    /// offset addresses server rows, not novel ones.
    pub fn record_page(&mut self, received: usize, server_has_more: bool) {
        self.in_flight = false;
        self.loaded_count += received;
        self.has_more = server_has_more;
    }

    pub fn fail_load(&mut self) {
        self.in_flight = false;
    }

    /// A newly confirmed message at the head shifts every server offset by one.
    pub fn note_head_insert(&mut self) {
        self.loaded_count += 1;
    }

    pub fn reset(&mut self) {
        self.loaded_count = 0;
        self.has_more = true;
        self.in_flight = false;
    }
}
