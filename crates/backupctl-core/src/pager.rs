//! Lazy, restartable listing across result pages
//!
//! A [`Pager`] owns a page-fetch function plus the filter and page size.
//! Each call to [`Pager::stream`] starts again from the first page and
//! follows `next_page_token` until the service stops returning one.

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{self, Stream, TryStreamExt};

use crate::error::{CoreError, Result};
use crate::types::{Page, PageRequest};

/// Future returned by a page-fetch function
pub type PageFuture<'a, T> = BoxFuture<'a, Result<Page<T>>>;

type FetchFn<'a, T> = Box<dyn Fn(PageRequest) -> PageFuture<'a, T> + Send + Sync + 'a>;

enum Cursor {
    First,
    Next(String),
    Exhausted,
}

/// Finite sequence of list results fetched page by page
pub struct Pager<'a, T> {
    fetch: FetchFn<'a, T>,
    filter: Option<String>,
    page_size: Option<u32>,
}

impl<'a, T: Send + 'a> Pager<'a, T> {
    pub fn new<F>(fetch: F) -> Self
    where
        F: Fn(PageRequest) -> PageFuture<'a, T> + Send + Sync + 'a,
    {
        Self {
            fetch: Box::new(fetch),
            filter: None,
            page_size: None,
        }
    }

    /// Filter expression passed through to the service untouched
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set an optional filter
    pub fn filter_opt(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Stream every item, fetching further pages on demand
    pub fn stream(&self) -> impl Stream<Item = Result<T>> + Send + '_ {
        let fetch = &self.fetch;
        let filter = self.filter.clone();
        let page_size = self.page_size;

        stream::try_unfold(Cursor::First, move |cursor| {
            let page_token = match cursor {
                Cursor::First => None,
                Cursor::Next(token) => Some(token),
                Cursor::Exhausted => {
                    let done: Result<Option<(Vec<T>, Cursor)>> = Ok(None);
                    return futures::future::ready(done).boxed();
                }
            };
            let previous = page_token.clone();
            let request = PageRequest {
                filter: filter.clone(),
                page_size,
                page_token,
            };
            let page = fetch(request);
            async move {
                let page = page.await?;
                let next = match page.next_page_token {
                    Some(token) if token.is_empty() => Cursor::Exhausted,
                    // A service handing back the same token would loop forever
                    Some(token) if previous.as_deref() == Some(token.as_str()) => {
                        return Err(CoreError::Decode(format!(
                            "page token '{}' returned twice",
                            token
                        )));
                    }
                    Some(token) => Cursor::Next(token),
                    None => Cursor::Exhausted,
                };
                Ok::<_, CoreError>(Some((page.items, next)))
            }
            .boxed()
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
        .try_flatten()
    }

    /// Fetch every page and return all items in service order
    pub async fn collect_all(&self) -> Result<Vec<T>> {
        self.stream().try_collect().await
    }
}
