//! Cursor-based pagination over listing endpoints.
//!
//! A listing endpoint answers with an envelope:
//!
//! ```text
//! { "data": [...], "pagination": { "total": 45, "page": 1, "limit": 20 } }
//! ```
//!
//! [`Page`] (blocking) and [`AsyncPage`] (async) wrap one such page together
//! with the capability to fetch any other page of the same query. Both offer
//! `has_next`, `next_page`, a lazy `pages()` traversal and a flattened
//! `items()` traversal.

mod async_page;
mod page;

pub use async_page::{AsyncPage, AsyncPageFetcher};
pub use page::{Items, Page, PageFetcher, Pages};

use serde::Deserialize;

use crate::error::Error;
use crate::http::ApiRequest;

/// Pagination metadata of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageInfo {
    total: u64,
    #[serde(rename = "page")]
    page_number: u32,
    #[serde(rename = "limit")]
    page_size: u32,
}

impl PageInfo {
    /// Creates metadata for page `page_number` of `page_size` items out of `total`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if the page number or size is zero.
    pub fn new(total: u64, page_number: u32, page_size: u32) -> Result<Self, Error> {
        Self {
            total,
            page_number,
            page_size,
        }
        .validated()
    }

    fn validated(self) -> Result<Self, Error> {
        if self.page_number == 0 {
            return Err(Error::malformed("page numbers start at 1"));
        }
        if self.page_size == 0 {
            return Err(Error::malformed("page size must be at least 1"));
        }
        Ok(self)
    }

    /// Total items across all pages.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// This page's number, starting at 1.
    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// Items per page.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Whether a page follows this one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.page_number) * u64::from(self.page_size) < self.total
    }

    /// Number of the page that follows this one.
    ///
    /// Fails with [`Error::NoMorePages`] on the last page, and with
    /// [`Error::MalformedResponse`] when the server reports more items past
    /// the highest representable page number.
    pub(crate) fn next_number(self) -> Result<u32, Error> {
        if !self.has_next() {
            return Err(Error::NoMorePages {
                page: self.page_number,
                total: self.total,
            });
        }
        self.page_number.checked_add(1).ok_or_else(|| {
            Error::malformed(format!(
                "page {} reports {} items but no later page number exists",
                self.page_number, self.total
            ))
        })
    }
}

/// Wire envelope of a listing response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope<T> {
    /// Items of the page, in server order.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub pagination: PageInfo,
}

impl<T> ListEnvelope<T> {
    /// Splits the envelope after validating the metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if the page number or size is zero.
    pub fn into_parts(self) -> Result<(Vec<T>, PageInfo), Error> {
        Ok((self.data, self.pagination.validated()?))
    }
}

/// A listing request: endpoint path plus filters, reused for every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    path: String,
    params: Vec<(String, String)>,
    page: u32,
    limit: Option<u32>,
}

impl ListQuery {
    /// Lists `path` starting at page 1 with the server's default page size.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
            page: 1,
            limit: None,
        }
    }

    /// Adds a filter parameter (e.g. `search`).
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Starts at a page other than 1 (0 is treated as 1).
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Requests `limit` items per page.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Endpoint path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Filter parameters.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// First page to fetch.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Requested page size.
    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// The request for page `page` of this query.
    #[must_use]
    pub fn request(&self, page: u32) -> ApiRequest {
        let request = ApiRequest::get(self.path.clone())
            .query_pairs(self.params.iter().cloned())
            .query("page", page.to_string());
        match self.limit {
            Some(limit) => request.query("limit", limit.to_string()),
            None => request,
        }
    }
}
