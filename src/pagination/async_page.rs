//! Async page cursor.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use super::PageInfo;
use crate::error::Error;

/// Fetches page `n` of the same query.
pub type AsyncPageFetcher<T> =
    Arc<dyn Fn(u32) -> BoxFuture<'static, Result<AsyncPage<T>, Error>> + Send + Sync>;

/// One page of a listing, with the capability to fetch the others (async).
pub struct AsyncPage<T> {
    items: Vec<T>,
    info: PageInfo,
    fetcher: AsyncPageFetcher<T>,
}

impl<T> AsyncPage<T> {
    /// Wraps a fetched page.
    pub fn new(items: Vec<T>, info: PageInfo, fetcher: AsyncPageFetcher<T>) -> Self {
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
    pub async fn next_page(&self) -> Result<AsyncPage<T>, Error> {
        (self.fetcher)(self.info.next_number()?).await
    }
}

enum Cursor<T> {
    Start(AsyncPage<T>),
    After(PageInfo, AsyncPageFetcher<T>),
    Done,
}

impl<T> AsyncPage<T>
where
    T: Clone + Send + 'static,
{
    /// Lazily walks this page and every following one.
    ///
    /// Each call starts a fresh traversal; a page is fetched only when the
    /// stream is polled for it. A failed fetch is yielded once and ends the
    /// traversal.
    #[must_use]
    pub fn pages(&self) -> BoxStream<'static, Result<AsyncPage<T>, Error>> {
        stream::unfold(Cursor::Start(self.clone()), |cursor| async move {
            match cursor {
                Cursor::Start(page) => {
                    let next = Cursor::After(page.info, Arc::clone(&page.fetcher));
                    Some((Ok(page), next))
                }
                Cursor::After(info, fetcher) => {
                    if !info.has_next() {
                        return None;
                    }
                    let number = match info.next_number() {
                        Ok(number) => number,
                        Err(error) => return Some((Err(error), Cursor::Done)),
                    };
                    debug!(page = number, "fetching next page");
                    match fetcher(number).await {
                        Ok(page) => {
                            let next = Cursor::After(page.info, Arc::clone(&page.fetcher));
                            Some((Ok(page), next))
                        }
                        Err(error) => Some((Err(error), Cursor::Done)),
                    }
                }
                Cursor::Done => None,
            }
        })
        .boxed()
    }

    /// Lazily walks every item of this page and the following ones.
    #[must_use]
    pub fn items(&self) -> BoxStream<'static, Result<T, Error>> {
        self.pages()
            .flat_map(|page| {
                let batch: Vec<Result<T, Error>> = match page {
                    Ok(page) => page.items.into_iter().map(Ok).collect(),
                    Err(error) => vec![Err(error)],
                };
                stream::iter(batch)
            })
            .boxed()
    }
}

impl<T: Clone> Clone for AsyncPage<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            info: self.info,
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncPage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncPage")
            .field("items", &self.items)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::TryStreamExt;
    use tokio_test::block_on;

    use super::*;

    /// Serves `total` numbered items in pages of `size`, counting fetches.
    fn numbered(total: u32, size: u32, fetches: Arc<AtomicUsize>) -> AsyncPageFetcher<u32> {
        Arc::new(move |number: u32| -> BoxFuture<'static, Result<AsyncPage<u32>, Error>> {
            let fetches = Arc::clone(&fetches);
            Box::pin(async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                let start = (number - 1) * size;
                let end = (start + size).min(total);
                let info = PageInfo::new(u64::from(total), number, size)?;
                let next = numbered(total, size, Arc::clone(&fetches));
                Ok::<_, Error>(AsyncPage::new((start..end).collect(), info, next))
            })
        })
    }

    fn first_page(total: u32, size: u32) -> (AsyncPage<u32>, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let page = block_on(numbered(total, size, Arc::clone(&fetches))(1)).unwrap();
        fetches.store(0, Ordering::SeqCst);
        (page, fetches)
    }

    #[test]
    fn test_items_flatten_two_two_one() {
        let (page, fetches) = first_page(5, 2);
        let items: Vec<u32> = block_on(page.items().try_collect()).unwrap();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pages_lazy_and_repeatable() {
        let (page, fetches) = first_page(5, 2);
        let mut pages = page.pages();
        let first = block_on(pages.next()).unwrap().unwrap();
        assert_eq!(first.page_number(), 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        drop(pages);

        let numbers: Vec<u32> = block_on(page.pages().map_ok(|p| p.page_number()).try_collect()).unwrap();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_next_page_on_last_page_fails() {
        let (page, _) = first_page(20, 20);
        let err = block_on(page.next_page()).unwrap_err();
        assert!(matches!(err, Error::NoMorePages { page: 1, total: 20 }));
    }

    #[test]
    fn test_empty_listing() {
        let (page, fetches) = first_page(0, 10);
        let pages: Vec<_> = block_on(page.pages().collect::<Vec<_>>());
        assert_eq!(pages.len(), 1);
        let items: Vec<u32> = block_on(page.items().try_collect()).unwrap();
        assert!(items.is_empty());
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_page_number_overflow_is_malformed() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let info = PageInfo::new(u64::MAX, u32::MAX, 1).unwrap();
        let page = AsyncPage::new(vec![7], info, numbered(10, 1, Arc::clone(&fetches)));

        let err = block_on(page.next_page()).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }), "got {err:?}");

        let results: Vec<Result<u32, Error>> = block_on(page.items().collect());
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(Error::MalformedResponse { .. })));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }
}
