//! Blocking page cursor.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::PageInfo;
use crate::error::Error;

/// Fetches page `n` of the same query.
pub type PageFetcher<T> = Arc<dyn Fn(u32) -> Result<Page<T>, Error> + Send + Sync>;

/// One page of a listing, with the capability to fetch the others.
pub struct Page<T> {
    items: Vec<T>,
    info: PageInfo,
    fetcher: PageFetcher<T>,
}

impl<T> Page<T> {
    /// Wraps a fetched page.
    pub fn new(items: Vec<T>, info: PageInfo, fetcher: PageFetcher<T>) -> Self {
        Self {
            items,
            info,
            fetcher,
        }
    }

    /// Items of this page, in server order.
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.items
    }

    /// Consumes the page, returning its items.
    #[must_use]
    pub fn into_data(self) -> Vec<T> {
        self.items
    }

    /// Pagination metadata.
    #[must_use]
    pub fn info(&self) -> PageInfo {
        self.info
    }

    /// Total items across all pages.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.info.total()
    }

    /// This page's number, starting at 1.
    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.info.page_number()
    }

    /// Items per page.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.info.page_size()
    }

    /// Number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a page follows this one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.info.has_next()
    }

    /// Fetches the following page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMorePages`] on the last page,
    /// [`Error::MalformedResponse`] if no later page number exists, or
    /// whatever the fetch fails with.
    pub fn next_page(&self) -> Result<Page<T>, Error> {
        (self.fetcher)(self.info.next_number()?)
    }
}

impl<T: Clone> Page<T> {
    /// Lazily walks this page and every following one.
    ///
    /// Each call starts a fresh traversal; a page is fetched only when the
    /// iterator is advanced to it. A failed fetch is yielded once and ends
    /// the traversal.
    #[must_use]
    pub fn pages(&self) -> Pages<T> {
        Pages {
            cursor: Cursor::Start(self.clone()),
        }
    }

    /// Lazily walks every item of this page and the following ones.
    #[must_use]
    pub fn items(&self) -> Items<T> {
        Items {
            pages: self.pages(),
            buffer: Vec::new().into_iter(),
        }
    }
}

impl<T: Clone> Clone for Page<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            info: self.info,
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Page<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("items", &self.items)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    /// Iterates this page only; use [`Page::items`] to cross pages.
    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

enum Cursor<T> {
    Start(Page<T>),
    After(PageInfo, PageFetcher<T>),
    Done,
}

/// Iterator over pages, see [`Page::pages`].
pub struct Pages<T> {
    cursor: Cursor<T>,
}

impl<T> Iterator for Pages<T> {
    type Item = Result<Page<T>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Start(page) => {
                self.cursor = Cursor::After(page.info, Arc::clone(&page.fetcher));
                Some(Ok(page))
            }
            Cursor::After(info, fetcher) => {
                if !info.has_next() {
                    return None;
                }
                let number = match info.next_number() {
                    Ok(number) => number,
                    Err(error) => return Some(Err(error)),
                };
                debug!(page = number, "fetching next page");
                match fetcher(number) {
                    Ok(page) => {
                        self.cursor = Cursor::After(page.info, Arc::clone(&page.fetcher));
                        Some(Ok(page))
                    }
                    Err(error) => Some(Err(error)),
                }
            }
            Cursor::Done => None,
        }
    }
}

/// Iterator over items across pages, see [`Page::items`].
pub struct Items<T> {
    pages: Pages<T>,
    buffer: std::vec::IntoIter<T>,
}

impl<T> Iterator for Items<T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            match self.pages.next()? {
                Ok(page) => self.buffer = page.items.into_iter(),
                Err(error) => return Some(Err(error)),
            }
        }
    }
}
