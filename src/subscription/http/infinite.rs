//! Paginated HTTP reads.
//!
//! An [`InfiniteQuery`] keeps every page loaded so far under one cache key.
//! The first page is fetched with the initial page parameter; each
//! [`QueryClient::fetch_next_page`] for the same key appends one more page,
//! as long as the last page came back full.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::endpoints::{QueryDescriptor, parse_url};
use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::cache::CacheEntry;
use super::client::ClientRegistry;
use super::query::{QueryClient, QueryError, QueryEvent, QueryResult};

/// Token identifying one page, substituted for `{{pageParam}}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageParam {
    Number(u64),
    Text(String),
}

impl fmt::Display for PageParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for PageParam {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for PageParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for PageParam {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Next page token after loading `loaded_pages` pages, the last of which
/// held `last_page_len` items.
///
/// A full page means there may be more, so the next token is the number of
/// loaded pages plus one. A short page ends the list.
///
/// ```
/// use rest_queries::subscription::http::{PageParam, next_page_param};
///
/// assert_eq!(next_page_param(10, 10, 1), Some(PageParam::Number(2)));
/// assert_eq!(next_page_param(3, 10, 2), None);
/// ```
pub fn next_page_param(last_page_len: usize, page_size: usize, loaded_pages: usize) -> Option<PageParam> {
    // A zero page size would otherwise page forever over empty pages
    (page_size > 0 && last_page_len == page_size).then(|| PageParam::Number(loaded_pages as u64 + 1))
}

/// Every page loaded so far.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteData<T> {
    pub pages: Vec<Vec<T>>,
    /// Token each page was fetched with, index-aligned with `pages`.
    pub page_params: Vec<PageParam>,
    pub next_page: Option<PageParam>,
}

impl<T> InfiniteData<T> {
    fn first(page: Vec<T>, param: PageParam, page_size: usize) -> Self {
        let next_page = next_page_param(page.len(), page_size, 1);
        Self {
            pages: vec![page],
            page_params: vec![param],
            next_page,
        }
    }

    fn push(&mut self, page: Vec<T>, param: PageParam, page_size: usize) {
        self.next_page = next_page_param(page.len(), page_size, self.pages.len() + 1);
        self.pages.push(page);
        self.page_params.push(param);
    }

    pub const fn has_next_page(&self) -> bool {
        self.next_page.is_some()
    }

    /// All items across pages, in page order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flatten()
    }
}

type PageFetcher<T> = Arc<dyn Fn(PageParam) -> BoxFuture<'static, Result<Vec<T>, QueryError>> + Send + Sync>;

/// A paginated query subscription.
///
/// Emits the same [`QueryResult`] states as [`Query`](super::Query), carrying
/// an [`InfiniteData`] with all loaded pages.
pub struct InfiniteQuery<T> {
    key: String,
    initial_page: PageParam,
    page_size: usize,
    fetcher: PageFetcher<T>,
    client: Arc<QueryClient>,
}

impl<T> InfiniteQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(
        key: &impl ToString,
        initial_page: impl Into<PageParam>,
        page_size: usize,
        fetcher: F,
        client: Arc<QueryClient>,
    ) -> Self
    where
        F: Fn(PageParam) -> BoxFuture<'static, Result<Vec<T>, QueryError>> + Send + Sync + 'static,
    {
        Self {
            key: key.to_string(),
            initial_page: initial_page.into(),
            page_size,
            fetcher: Arc::new(fetcher),
            client,
        }
    }

    /// A paginated GET. `{{pageParam}}` and `{{pageSize}}` in the
    /// descriptor's URL are filled in for every page.
    pub fn get(
        key: &impl ToString,
        descriptor: QueryDescriptor,
        initial_page: impl Into<PageParam>,
        page_size: usize,
        clients: &ClientRegistry,
        client: Arc<QueryClient>,
    ) -> Self
    where
        T: DeserializeOwned,
    {
        let http = clients.get(descriptor.base_url.as_str());
        let descriptor = Arc::new(descriptor);

        Self::new(
            key,
            initial_page,
            page_size,
            move |page: PageParam| {
                let http = http.clone();
                let descriptor = descriptor.clone();
                Box::pin(async move {
                    let url = parse_url(
                        &descriptor.url,
                        [("pageParam", page.to_string()), ("pageSize", page_size.to_string())],
                    );
                    http.get::<Vec<T>>(&url, descriptor.request_config.as_ref())
                        .await
                })
            },
            client,
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

struct Pager<T> {
    key: Arc<str>,
    initial_page: PageParam,
    page_size: usize,
    fetcher: PageFetcher<T>,
    client: Arc<QueryClient>,
}

impl<T: Clone + Send + Sync + 'static> Pager<T> {
    fn cached(&self) -> Option<CacheEntry<InfiniteData<T>>> {
        self.client.get_cache::<InfiniteData<T>>(&self.key)
    }

    async fn fetch_first(&self) -> QueryResult<InfiniteData<T>> {
        let page = self.initial_page.clone();
        match (self.fetcher)(page.clone()).await {
            Ok(items) => {
                let data = InfiniteData::first(items, page, self.page_size);
                self.client
                    .set_cache(self.key.to_string(), CacheEntry::new(data.clone()));
                QueryResult::success(data, false)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "first page fetch failed");
                QueryResult::error(e)
            }
        }
    }

    async fn fetch_next(&self, mut data: InfiniteData<T>, page: PageParam) -> QueryResult<InfiniteData<T>> {
        match (self.fetcher)(page.clone()).await {
            Ok(items) => {
                debug!(key = %self.key, page = %page, "loaded next page");
                data.push(items, page, self.page_size);
                self.client
                    .set_cache(self.key.to_string(), CacheEntry::new(data.clone()));
                QueryResult::success(data, false)
            }
            Err(e) => {
                warn!(key = %self.key, page = %page, error = %e, "next page fetch failed");
                QueryResult::error(e)
            }
        }
    }
}

enum State {
    Initial { rx: broadcast::Receiver<QueryEvent> },
    FetchFirst { rx: broadcast::Receiver<QueryEvent> },
    Watching { rx: broadcast::Receiver<QueryEvent> },
}

impl<T> SubscriptionSource for InfiniteQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = QueryResult<InfiniteData<T>>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        let pager = Arc::new(Pager {
            key: Arc::from(self.key.as_str()),
            initial_page: self.initial_page.clone(),
            page_size: self.page_size,
            fetcher: self.fetcher.clone(),
            client: self.client.clone(),
        });
        let rx = pager.client.subscribe_events();

        stream::unfold(State::Initial { rx }, move |state| {
            let pager = pager.clone();

            async move {
                match state {
                    State::Initial { rx } => match pager.cached() {
                        Some(mut cached) => {
                            let is_stale = cached.check_staleness(pager.client.config().stale_time);
                            let result = QueryResult::success(cached.data, is_stale);
                            if is_stale {
                                Some((result, State::FetchFirst { rx }))
                            } else {
                                Some((result, State::Watching { rx }))
                            }
                        }
                        None => Some((QueryResult::loading(), State::FetchFirst { rx })),
                    },

                    State::FetchFirst { rx } => {
                        let result = pager.fetch_first().await;
                        Some((result, State::Watching { rx }))
                    }

                    State::Watching { mut rx } => loop {
                        let event = match rx.recv().await {
                            Ok(event) if event.key() == &*pager.key => event,
                            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => return None,
                        };

                        match event {
                            // Refetch from the first page
                            QueryEvent::Invalidated(_) => {
                                let result = match pager.cached() {
                                    Some(cached) => QueryResult::success(cached.data, true),
                                    None => QueryResult::loading(),
                                };
                                return Some((result, State::FetchFirst { rx }));
                            }
                            QueryEvent::FetchNextPage(_) => {
                                let Some(cached) = pager.cached() else {
                                    continue;
                                };
                                let Some(page) = cached.data.next_page.clone() else {
                                    continue;
                                };
                                let result = pager.fetch_next(cached.data, page).await;
                                return Some((result, State::Watching { rx }));
                            }
                        }
                    },
                }
            }
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.key.hash(&mut hasher);
        self.page_size.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}
