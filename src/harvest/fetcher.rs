//! Paginated fetcher
//!
//! Executes one logical API query to completion:
//! - Single-object endpoints (`/users/{login}`, `/repos/{org}/{repo}`) take one request
//! - List endpoints are walked page by page until a short or empty page
//! - Rate-limited pages are retried in place after the appropriate wait
//! - Enrichment fields and transforms are applied to every item
//!
//! Remote failures never escape as errors: the result carries a status telling
//! whether the query ran to completion.

use crate::config::ApiConfig;
use crate::harvest::credentials::CredentialPool;
use crate::harvest::rate_limit::{classify_message, primary_backoff, ApiSignal, RATE_LIMIT_RESET_HEADER};
use crate::model::Enrichment;
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Transform applied to every item after enrichment
pub type ItemTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Transform applied to a whole page body before it is split into items
pub type PageTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Invoked once per query with the enrichment fields and the full result
pub type CompletionCallback = Arc<dyn Fn(&Enrichment, &FetchOutcome) + Send + Sync>;

/// One logical API query
#[derive(Clone)]
pub struct FetchRequest {
    /// API path such as `/orgs/acme/members`
    pub endpoint: String,

    /// Extra query parameters (pagination parameters are added by the fetcher)
    pub query: Vec<(String, String)>,

    /// Constant fields merged into every returned item
    pub enrichment: Enrichment,

    pub item_transform: Option<ItemTransform>,
    pub page_transform: Option<PageTransform>,
    pub completion: Option<CompletionCallback>,
}

impl FetchRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            query: Vec::new(),
            enrichment: Enrichment::new(),
            item_transform: None,
            page_transform: None,
            completion: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn enrich(mut self, key: &str, value: &str) -> Self {
        self.enrichment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_item_transform(
        mut self,
        transform: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.item_transform = Some(Arc::new(transform));
        self
    }

    pub fn with_page_transform(
        mut self,
        transform: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.page_transform = Some(Arc::new(transform));
        self
    }

    pub fn on_complete(
        mut self,
        callback: impl Fn(&Enrichment, &FetchOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.completion = Some(Arc::new(callback));
        self
    }

    /// Merges enrichment into an item, then applies the item transform
    fn prepare_item(&self, mut item: Value) -> Value {
        if let Value::Object(map) = &mut item {
            for (key, value) in &self.enrichment {
                map.insert(key.clone(), Value::String(value.clone()));
            }
        }
        match &self.item_transform {
            Some(transform) => transform(item),
            None => item,
        }
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("endpoint", &self.endpoint)
            .field("query", &self.query)
            .field("enrichment", &self.enrichment)
            .field("item_transform", &self.item_transform.is_some())
            .field("page_transform", &self.page_transform.is_some())
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

/// Whether a query ran to its natural end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Last page reached, or the resource is empty
    Complete,

    /// Stopped early on an API or transport error; items hold what was collected
    Partial,
}

/// Result of one query
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Items in page order, enriched and transformed
    pub items: Vec<Value>,
    pub status: FetchStatus,

    /// Number of non-empty pages received
    pub pages: u32,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == FetchStatus::Complete
    }
}

/// Result of one page request after throttling has been dealt with
enum PageFetch {
    Body(Value),
    Empty,
    Malformed,
    Failed(String),
}

/// Result of a single HTTP exchange
enum Exchange {
    Done(PageFetch),
    Throttled { wait: Duration, reason: &'static str },
}

/// Executes queries against the API using sessions from a credential pool
pub struct PaginatedFetcher {
    pool: Arc<CredentialPool>,
    base_url: String,
    page_size: u32,
    max_pages: u32,
    secondary_cooldown: Duration,
    max_rate_limit_retries: u32,
}

impl PaginatedFetcher {
    pub fn new(pool: Arc<CredentialPool>, api: &ApiConfig) -> Self {
        Self {
            pool,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            page_size: api.page_size,
            max_pages: api.max_pages,
            secondary_cooldown: api.secondary_cooldown(),
            max_rate_limit_retries: api.max_rate_limit_retries,
        }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Runs a query to completion and invokes its completion callback
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let url = self.url_for(&request.endpoint);
        tracing::info!("requesting: {}", url);

        let outcome = if is_single_object(&self.base_url, &url) {
            self.fetch_single(&url, request).await
        } else {
            self.fetch_pages(&url, request).await
        };

        tracing::debug!(
            "{}: {} items from {} pages ({:?})",
            url,
            outcome.items.len(),
            outcome.pages,
            outcome.status
        );

        if let Some(callback) = &request.completion {
            callback(&request.enrichment, &outcome);
        }
        outcome
    }

    async fn fetch_single(&self, url: &str, request: &FetchRequest) -> FetchOutcome {
        match self.fetch_page(url, request, None).await {
            PageFetch::Body(body) => FetchOutcome {
                items: vec![request.prepare_item(body)],
                status: FetchStatus::Complete,
                pages: 1,
            },
            PageFetch::Empty | PageFetch::Malformed => FetchOutcome {
                items: Vec::new(),
                status: FetchStatus::Complete,
                pages: 0,
            },
            PageFetch::Failed(message) => {
                tracing::warn!("{} returned an error: {}", url, message);
                FetchOutcome {
                    items: Vec::new(),
                    status: FetchStatus::Partial,
                    pages: 0,
                }
            }
        }
    }

    async fn fetch_pages(&self, url: &str, request: &FetchRequest) -> FetchOutcome {
        let mut items = Vec::new();
        let mut status = FetchStatus::Complete;
        let mut pages = 0;
        let mut page = 1;

        while page <= self.max_pages {
            let body = match self.fetch_page(url, request, Some(page)).await {
                PageFetch::Body(body) => body,
                PageFetch::Empty => {
                    tracing::info!("{} page {} is empty", url, page);
                    break;
                }
                PageFetch::Malformed => {
                    tracing::warn!("{} page {} is not JSON, treating as no items", url, page);
                    break;
                }
                PageFetch::Failed(message) => {
                    tracing::warn!("{} page {} returned an error: {}", url, page, message);
                    status = FetchStatus::Partial;
                    break;
                }
            };

            if matches!(&body, Value::Array(raw) if raw.is_empty()) {
                break;
            }

            let body = match &request.page_transform {
                Some(transform) => transform(body),
                None => body,
            };
            let Value::Array(page_items) = body else {
                tracing::warn!("{} page {} is not a list, stopping", url, page);
                break;
            };

            pages += 1;
            let count = page_items.len();
            items.extend(page_items.into_iter().map(|item| request.prepare_item(item)));
            tracing::trace!("{} page {}: {} items", url, page, count);

            if count < self.page_size as usize {
                break;
            }
            page += 1;
        }

        if page > self.max_pages {
            tracing::warn!("{} reached the cap of {} pages", url, self.max_pages);
        }

        FetchOutcome {
            items,
            status,
            pages,
        }
    }

    /// Requests one page, retrying in place while the API throttles us
    async fn fetch_page(&self, url: &str, request: &FetchRequest, page: Option<u32>) -> PageFetch {
        let mut throttled = 0;
        loop {
            match self.exchange(url, request, page).await {
                Exchange::Done(result) => return result,
                Exchange::Throttled { wait, reason } => {
                    throttled += 1;
                    if throttled > self.max_rate_limit_retries {
                        return PageFetch::Failed(format!(
                            "{} persisted after {} retries",
                            reason, self.max_rate_limit_retries
                        ));
                    }
                    tracing::warn!(
                        "{} on {} (page {}), waiting {:?} before retrying",
                        reason,
                        url,
                        page.unwrap_or(1),
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn exchange(&self, url: &str, request: &FetchRequest, page: Option<u32>) -> Exchange {
        let session = self.pool.acquire();
        let mut builder = session.get(url).query(&request.query);
        builder = match page {
            Some(page) => builder.query(&[("per_page", self.page_size), ("page", page)]),
            None => builder.query(&[("per_page", self.page_size)]),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Exchange::Done(PageFetch::Failed(e.to_string())),
        };

        let status = response.status();
        let reset = response
            .headers()
            .get(RATE_LIMIT_RESET_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Exchange::Done(PageFetch::Failed(e.to_string())),
        };

        let Ok(body) = serde_json::from_str::<Value>(&text) else {
            if status.is_success() {
                return Exchange::Done(PageFetch::Malformed);
            }
            return Exchange::Done(PageFetch::Failed(format!("HTTP {}", status)));
        };

        let Some(message) = error_message(&body) else {
            if status.is_success() {
                return Exchange::Done(PageFetch::Body(body));
            }
            return Exchange::Done(PageFetch::Failed(format!("HTTP {}", status)));
        };

        match classify_message(message) {
            ApiSignal::PrimaryRateLimit => Exchange::Throttled {
                wait: primary_backoff(reset.as_deref(), Utc::now()),
                reason: "rate limit exceeded",
            },
            ApiSignal::SecondaryRateLimit => Exchange::Throttled {
                wait: self.secondary_cooldown,
                reason: "secondary rate limit exceeded",
            },
            ApiSignal::Empty => Exchange::Done(PageFetch::Empty),
            ApiSignal::Error(message) => Exchange::Done(PageFetch::Failed(message)),
        }
    }
}

/// The `message` of an error object, if the body is one
fn error_message(body: &Value) -> Option<&str> {
    body.as_object()?.get("message")?.as_str()
}

/// True for lookups that return one object instead of a page:
/// `/users/{login}` and `/repos/{org}/{repo}`, relative to `base_url`
pub fn is_single_object(base_url: &str, url: &str) -> bool {
    let (Ok(base), Ok(target)) = (Url::parse(base_url), Url::parse(url)) else {
        return false;
    };
    let prefix = path_segments(&base);
    let path = path_segments(&target);
    let Some(relative) = path.strip_prefix(prefix.as_slice()) else {
        return false;
    };

    matches!(relative, ["users", _] | ["repos", _, _])
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}
