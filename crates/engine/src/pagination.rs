//! Pagination walker
//!
//! Fetches pages strictly in cursor order, one at a time, until the server
//! reports no next page, the page limit is reached, or a fetch fails. Pages
//! accumulated before a failure are returned alongside the diagnostics.

use crate::context::CallContext;
use crate::error::EngineResult;
use crate::page_info::{locate, LocateError, Paginated};
use gqlrun_core::{Diagnostic, Diagnostics, ErrorCode};
use std::future::Future;
use tracing::debug;

/// Upper bound on the number of pages a walk fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageLimit(usize);

impl PageLimit {
    /// A single page; no pagination beyond the first fetch
    pub const ONE: Self = Self(1);

    /// Create a limit; values `<= 0` mean one page
    #[must_use]
    pub fn new(max_pages: i64) -> Self {
        match usize::try_from(max_pages) {
            Ok(0) | Err(_) => Self::ONE,
            Ok(pages) => Self(pages),
        }
    }

    /// Number of pages allowed
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for PageLimit {
    fn default() -> Self {
        Self::ONE
    }
}

impl From<i64> for PageLimit {
    fn from(max_pages: i64) -> Self {
        Self::new(max_pages)
    }
}

/// Result of a walk: every page fetched plus any failure
///
/// Pages are usable only as far as the diagnostics allow; check
/// [`WalkOutcome::is_complete`] before trusting the set as exhaustive.
#[derive(Debug)]
pub struct WalkOutcome<T> {
    /// Decoded pages in fetch order
    pub pages: Vec<T>,
    /// Failure that ended the walk, empty on success
    pub diagnostics: Diagnostics,
}

impl<T> WalkOutcome<T> {
    fn done(pages: Vec<T>) -> Self {
        Self {
            pages,
            diagnostics: Diagnostics::new(),
        }
    }

    fn failed(pages: Vec<T>, diagnostics: impl Into<Diagnostics>) -> Self {
        Self {
            pages,
            diagnostics: diagnostics.into(),
        }
    }

    /// Whether the walk ended without failure
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Pages on success, diagnostics otherwise; partial pages are dropped
    pub fn into_result(self) -> EngineResult<Vec<T>> {
        if self.diagnostics.is_empty() {
            Ok(self.pages)
        } else {
            Err(self.diagnostics)
        }
    }
}

/// Walk pages by repeatedly calling `fetch` with the current cursor
///
/// The first fetch receives an empty cursor. `fetch` is expected to bind the
/// cursor into the operation's variables and perform one round trip.
pub async fn walk<T, F, Fut>(limit: PageLimit, ctx: &CallContext, mut fetch: F) -> WalkOutcome<T>
where
    T: Paginated,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut pages = Vec::new();
    let mut cursor = String::new();

    loop {
        if let Some(interruption) = ctx.interruption() {
            debug!(pages = pages.len(), "Walk interrupted before fetch");
            return WalkOutcome::failed(pages, interruption);
        }

        debug!(page = pages.len() + 1, cursor = %cursor, "Fetching page");
        let page = match fetch(cursor.clone()).await {
            Ok(page) => page,
            Err(diagnostics) => return WalkOutcome::failed(pages, diagnostics),
        };

        let info = locate(&page);
        pages.push(page);

        let info = match info {
            Ok(info) => info,
            Err(LocateError::NotPaginated) => {
                return WalkOutcome::failed(pages, Diagnostic::not_paginated());
            }
        };

        if !info.has_next_page {
            debug!(pages = pages.len(), "Last page reached");
            return WalkOutcome::done(pages);
        }

        if pages.len() >= limit.get() {
            debug!(pages = pages.len(), limit = limit.get(), "Page limit reached");
            return WalkOutcome::done(pages);
        }

        match info.end_cursor.filter(|next| !next.is_empty()) {
            Some(next) => cursor = next,
            None => {
                return WalkOutcome::failed(
                    pages,
                    Diagnostic::new(
                        ErrorCode::MissingCursor,
                        "page reports a next page but carries no endCursor",
                    ),
                );
            }
        }
    }
}
