use csvdash_types::models::{CsvRow, CsvView};

pub const FILE_PAGE_SIZES: &[usize] = &[5, 10, 25, 50];
pub const DEFAULT_FILE_PAGE_SIZE: usize = 10;

pub const CSV_ROWS_PER_PAGE: &[usize] = &[25, 50, 100];
pub const DEFAULT_CSV_ROWS_PER_PAGE: usize = 50;

pub const CSV_MAX_ROWS: &[usize] = &[100, 500, 1000];
pub const DEFAULT_CSV_MAX_ROWS: usize = 100;

/// The visible slice of a result set. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub total_pages: usize,
}

/// Slice `items` for `page`. Never clamps: a page past the end (or page 0)
/// is simply empty.
pub fn project<T>(items: &[T], page: usize, page_size: usize) -> Page<'_, T> {
    if page_size == 0 {
        return Page { items: &[], total_pages: 0 };
    }
    let total_pages = items.len().div_ceil(page_size);
    let slice: &[T] = match page.checked_sub(1).and_then(|p| p.checked_mul(page_size)) {
        Some(start) if start < items.len() => {
            let end = start.saturating_add(page_size).min(items.len());
            &items[start..end]
        }
        _ => &[],
    };
    Page {
        items: slice,
        total_pages,
    }
}

/// Paging parameters held by a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page: usize,
    page_size: usize,
}

impl Pager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn files() -> Self {
        Self::new(DEFAULT_FILE_PAGE_SIZE)
    }

    pub fn csv_rows() -> Self {
        Self::new(DEFAULT_CSV_ROWS_PER_PAGE)
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Always returns to the first page.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.page = 1;
    }

    /// Pull the page back inside `1..=total_pages` after the data shrank.
    pub fn clamp(&mut self, total_pages: usize) {
        self.page = self.page.min(total_pages).max(1);
    }

    pub fn project<'a, T>(&self, items: &'a [T]) -> Page<'a, T> {
        project(items, self.page, self.page_size)
    }
}

impl Default for Pager {
    fn default() -> Self {
        Self::files()
    }
}

/// Rows actually shown for a CSV: the server's returned count, never more
/// than the file holds.
pub fn bounded_rows(view: &CsvView) -> usize {
    view.displayed_rows.min(view.total_rows)
}

/// Page over the bounded rows of a CSV view.
pub fn project_csv<'a>(view: &'a CsvView, pager: &Pager) -> Page<'a, CsvRow> {
    let bound = bounded_rows(view).min(view.rows.len());
    project(&view.rows[..bound], pager.page(), pager.page_size())
}
