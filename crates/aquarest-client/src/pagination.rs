//! Transparent pagination.
//!
//! [`PageWalker`] fetches the complete result set of an endpoint whether or
//! not it is paginated. It first issues a reconnaissance request for page 1
//! with a page size of 1, classifies the response, then:
//!
//! - returns the response as is when the endpoint answers with a bare array;
//! - issues one request for page 1 at the page-size ceiling when the response
//!   carries no usable `count`, since the first request is capped at one item;
//! - issues one request for page 1 at the page-size ceiling when the reported
//!   total fits on one page;
//! - otherwise requests every page `1..=ceil(total / ceiling)` in order and
//!   concatenates their `result` arrays.
//!
//! At most `ceil(total / ceiling) + 1` requests are made, one at a time. Any
//! failure aborts the walk; partial results are never returned.

use log::{debug, warn};
use serde_json::Value;

use aquarest_common::pagination::RESULT_FIELD;
use aquarest_common::{PagePlan, PageShape, PaginationAnalysis, ResponseKind};

use crate::error::ClientError;
use crate::request::{Query, RestClient};

/// Query parameter carrying the 1-based page index.
pub const PAGE_PARAM: &str = "page";
/// Query parameter carrying the page size.
pub const PAGE_SIZE_PARAM: &str = "pagesize";

/// Walks the pages of an endpoint.
pub struct PageWalker<'a, C: RestClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: RestClient + ?Sized> PageWalker<'a, C> {
    /// Creates a walker over `client`.
    pub const fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Fetches a single page.
    ///
    /// The caller's query is sent on every page; any `page` or `pagesize`
    /// keys in it are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::PageSizeExceeded`] before any network call when
    /// `per_page` is above the configured ceiling, a configuration error for
    /// page 0, or any error from the request itself.
    pub async fn get_page(
        &self,
        path: &str,
        query: &Query,
        page: u64,
        per_page: u32,
    ) -> Result<Value, ClientError> {
        let max = self.client.config().per_page_max;
        if per_page > max {
            return Err(ClientError::PageSizeExceeded {
                requested: per_page,
                max,
            });
        }
        if page == 0 {
            return Err(ClientError::Configuration(
                "page indices start at 1".to_string(),
            ));
        }

        let mut query = query.clone();
        query
            .remove(PAGE_PARAM)
            .remove(PAGE_SIZE_PARAM)
            .append(PAGE_PARAM, page)
            .append(PAGE_SIZE_PARAM, per_page);

        self.client.get(path, query).await
    }

    /// Samples `path` and reports whether it is paginated.
    ///
    /// # Errors
    ///
    /// Returns any error from the reconnaissance request.
    pub async fn analyze(
        &self,
        path: &str,
        query: &Query,
    ) -> Result<PaginationAnalysis, ClientError> {
        let sample = self.get_page(path, query, 1, 1).await?;
        Ok(PaginationAnalysis::from_response(sample))
    }

    /// Fetches every item of `path`.
    ///
    /// # Errors
    ///
    /// Returns the first error from any request; items gathered so far are discarded.
    pub async fn get_all(&self, path: &str, query: &Query) -> Result<Vec<Value>, ClientError> {
        let sample = self.get_page(path, query, 1, 1).await?;
        let sample_kind = ResponseKind::of(&sample);
        let per_page = self.client.config().per_page_max;
        let trace = self.client.config().debug;

        // The one-item sample is discarded once the plan is known.
        let total = match PageShape::classify(sample) {
            PageShape::Unpaginated(items) if sample_kind == ResponseKind::Array => {
                if trace {
                    debug!("{path} is not paginated, {} item(s)", items.len());
                }
                return Ok(items);
            }
            PageShape::Unpaginated(_) => {
                // No usable count; the sample was capped at one item.
                if trace {
                    debug!("{path} reports no count, fetching a single page of {per_page}");
                }
                let page = self.get_page(path, query, 1, per_page).await?;
                return Ok(PageShape::classify(page).into_items());
            }
            PageShape::Paginated { total, .. } => total,
        };

        let plan = PagePlan::new(total, per_page);

        if plan.fits_single_page() {
            if trace {
                debug!("{path} reports {total} item(s), fetching a single page of {per_page}");
            }
            let page = self.get_page(path, query, 1, per_page).await?;
            return Ok(page_items(page, path, 1, trace));
        }

        if trace {
            debug!(
                "{path} reports {total} item(s), fetching {} pages of {per_page}",
                plan.pages()
            );
        }

        let mut all = Vec::new();
        for index in plan.page_indices() {
            let page = self.get_page(path, query, index, per_page).await?;
            all.extend(page_items(page, path, index, trace));
        }

        if trace && all.len() as u64 != total {
            debug!(
                "{path} reported {total} item(s) but {} were returned",
                all.len()
            );
        }

        Ok(all)
    }
}

/// Items carried by a page. Pages without a `result` array contribute nothing.
fn page_items(page: Value, path: &str, index: u64, trace: bool) -> Vec<Value> {
    match page {
        Value::Object(mut map) => match map.remove(RESULT_FIELD) {
            Some(Value::Array(items)) => items,
            _ => {
                if trace {
                    warn!("{path} page {index} has no {RESULT_FIELD} array, skipping");
                }
                Vec::new()
            }
        },
        Value::Array(items) => items,
        _ => {
            if trace {
                warn!("{path} page {index} is not an object, skipping");
            }
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use aquarest_common::ClientConfig;

    use super::*;
    use crate::auth::TokenHandle;
    use crate::request::ApiRequest;

    type Responder = Box<dyn Fn(&ApiRequest) -> Result<Value, ClientError> + Send + Sync>;

    /// Records every request and answers from a closure.
    struct MockRestClient {
        config: ClientConfig,
        token: TokenHandle,
        requests: Mutex<Vec<ApiRequest>>,
        responder: Responder,
    }

    impl MockRestClient {
        fn new(
            per_page_max: u32,
            responder: impl Fn(&ApiRequest) -> Result<Value, ClientError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                config: ClientConfig::new().with_per_page_max(per_page_max).unwrap(),
                token: TokenHandle::new(),
                requests: Mutex::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        /// Serves `total` numbered items as `{"result": [...], "count": total}`.
        fn dataset(per_page_max: u32, total: u64) -> Self {
            Self::new(per_page_max, move |request| {
                let page: u64 = param(request, PAGE_PARAM);
                let size: u64 = param(request, PAGE_SIZE_PARAM);
                let start = (page - 1) * size;
                let end = (start + size).min(total);
                let result: Vec<Value> = (start..end).map(|i| json!({"id": i})).collect();
                Ok(json!({"result": result, "count": total}))
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn pages_requested(&self) -> Vec<(u64, u64)> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| (param(r, PAGE_PARAM), param(r, PAGE_SIZE_PARAM)))
                .collect()
        }
    }

    fn param(request: &ApiRequest, key: &str) -> u64 {
        request
            .query
            .get_all(key)
            .next()
            .expect("parameter present")
            .parse()
            .expect("numeric parameter")
    }

    #[async_trait]
    impl RestClient for MockRestClient {
        fn config(&self) -> &ClientConfig {
            &self.config
        }

        fn token(&self) -> &TokenHandle {
            &self.token
        }

        async fn request(&self, request: ApiRequest) -> Result<Value, ClientError> {
            let response = (self.responder)(&request);
            self.requests.lock().unwrap().push(request);
            response
        }
    }

    #[tokio::test]
    async fn test_single_page_walk_uses_two_requests() {
        let client = MockRestClient::dataset(1000, 420);
        let items = PageWalker::new(&client)
            .get_all("/api/v2/images", &Query::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 420);
        assert_eq!(client.request_count(), 2);
        assert_eq!(client.pages_requested(), vec![(1, 1), (1, 1000)]);
    }

    #[tokio::test]
    async fn test_multi_page_walk_concatenates_in_order() {
        let client = MockRestClient::dataset(1000, 2500);
        let items = PageWalker::new(&client)
            .get_all("/api/v2/images", &Query::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 2500);
        assert_eq!(client.request_count(), 4);
        assert_eq!(
            client.pages_requested(),
            vec![(1, 1), (1, 1000), (2, 1000), (3, 1000)]
        );
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item["id"], json!(i));
        }
    }

    #[tokio::test]
    async fn test_exact_multiple_does_not_fetch_extra_page() {
        let client = MockRestClient::dataset(10, 30);
        let items = PageWalker::new(&client)
            .get_all("/api/v1/hosts", &Query::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 30);
        assert_eq!(client.request_count(), 4);
    }

    #[tokio::test]
    async fn test_bare_array_is_returned_after_sample() {
        let client = MockRestClient::new(1000, |_| Ok(json!(["a", "b", "c"])));
        let walker = PageWalker::new(&client);

        let items = walker.get_all("/api/v1/settings", &Query::new()).await.unwrap();
        assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(client.request_count(), 1);

        let analysis = walker.analyze("/api/v1/settings", &Query::new()).await.unwrap();
        assert!(!analysis.supported);
        assert_eq!(analysis.kind, aquarest_common::ResponseKind::Array);
        assert_eq!(analysis.count, 3);
    }

    #[tokio::test]
    async fn test_result_without_count_refetches_full_page() {
        let client = MockRestClient::new(1000, |request| {
            Ok(match param(request, PAGE_SIZE_PARAM) {
                1 => json!({"result": ["a"]}),
                _ => json!({"result": ["a", "b", "c"]}),
            })
        });

        let items = PageWalker::new(&client)
            .get_all("/api/v1/hosts", &Query::new())
            .await
            .unwrap();

        assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(client.pages_requested(), vec![(1, 1), (1, 1000)]);
    }

    #[tokio::test]
    async fn test_non_numeric_count_refetches_full_page() {
        let client = MockRestClient::new(1000, |request| {
            let size = param(request, PAGE_SIZE_PARAM);
            let result: Vec<u64> = (0..size.min(4)).collect();
            Ok(json!({"result": result, "count": "4"}))
        });

        let items = PageWalker::new(&client)
            .get_all("/api/v1/hosts", &Query::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 4);
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_plain_object_is_returned_from_full_page() {
        let client = MockRestClient::new(1000, |_| Ok(json!({"version": "2022.4"})));

        let items = PageWalker::new(&client)
            .get_all("/api/v1/settings/version", &Query::new())
            .await
            .unwrap();

        assert_eq!(items, vec![json!({"version": "2022.4"})]);
        assert_eq!(client.request_count(), 2);
    }

    /// Keeps formatted records so tests can check what was logged.
    struct CaptureLogger {
        lines: Mutex<Vec<String>>,
    }

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            self.lines.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    static CAPTURE: CaptureLogger = CaptureLogger {
        lines: Mutex::new(Vec::new()),
    };

    fn logged_lines_mentioning(needle: &str) -> usize {
        CAPTURE
            .lines
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    #[tokio::test]
    async fn test_walk_logs_only_with_debug_flag() {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Trace);

        let skipping = |request: &ApiRequest| -> Result<Value, ClientError> {
            Ok(match param(request, PAGE_PARAM) {
                2 => json!({"message": "temporarily empty"}),
                _ => json!({"result": [1], "count": 30}),
            })
        };

        let quiet = MockRestClient::new(10, skipping);
        PageWalker::new(&quiet)
            .get_all("/api/v1/quiet-walk", &Query::new())
            .await
            .unwrap();
        assert_eq!(logged_lines_mentioning("/api/v1/quiet-walk"), 0);

        let mut traced = MockRestClient::new(10, skipping);
        traced.config.debug = true;
        PageWalker::new(&traced)
            .get_all("/api/v1/traced-walk", &Query::new())
            .await
            .unwrap();
        assert!(logged_lines_mentioning("/api/v1/traced-walk") >= 2);
    }

    #[tokio::test]
    async fn test_analyze_paginated_endpoint() {
        let client = MockRestClient::dataset(1000, 2500);
        let analysis = PageWalker::new(&client)
            .analyze("/api/v2/images", &Query::new())
            .await
            .unwrap();

        assert!(analysis.supported);
        assert_eq!(analysis.count, 2500);
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_pages_missing_result_are_skipped() {
        let client = MockRestClient::new(2, |request| {
            let page = param(request, PAGE_PARAM);
            let size = param(request, PAGE_SIZE_PARAM);
            Ok(match (page, size) {
                (1, 1) => json!({"result": [1], "count": 5}),
                (2, _) => json!({"message": "temporarily empty"}),
                (p, _) => json!({"result": [p * 10, p * 10 + 1], "count": 5}),
            })
        });

        let items = PageWalker::new(&client)
            .get_all("/api/v1/hosts", &Query::new())
            .await
            .unwrap();

        assert_eq!(items, vec![json!(10), json!(11), json!(30), json!(31)]);
        assert_eq!(client.request_count(), 4);
    }

    #[tokio::test]
    async fn test_failure_aborts_walk() {
        let client = MockRestClient::new(10, |request| {
            if param(request, PAGE_PARAM) == 2 {
                return Err(ClientError::MalformedResponse("boom".to_string()));
            }
            Ok(json!({"result": [1], "count": 35}))
        });

        let result = PageWalker::new(&client)
            .get_all("/api/v1/hosts", &Query::new())
            .await;

        assert!(matches!(result, Err(ClientError::MalformedResponse(_))));
        // sample, page 1, page 2; nothing after the failure
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn test_caller_query_reused_on_every_page() {
        let client = MockRestClient::dataset(10, 25);
        let query = Query::new()
            .with("registry", "Docker Hub")
            .with("page", 99)
            .with("pagesize", 99);

        PageWalker::new(&client)
            .get_all("/api/v2/images", &query)
            .await
            .unwrap();

        for request in client.requests.lock().unwrap().iter() {
            assert_eq!(
                request.query.get_all("registry").collect::<Vec<_>>(),
                vec!["Docker Hub"]
            );
            assert_eq!(request.query.get_all(PAGE_PARAM).count(), 1);
            assert_ne!(param(request, PAGE_SIZE_PARAM), 99);
        }
    }

    #[tokio::test]
    async fn test_page_size_above_ceiling_fails_before_network() {
        let client = MockRestClient::dataset(1000, 10);
        let result = PageWalker::new(&client)
            .get_page("/api/v2/images", &Query::new(), 1, 1001)
            .await;

        assert!(matches!(
            result,
            Err(ClientError::PageSizeExceeded {
                requested: 1001,
                max: 1000
            })
        ));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_page_zero_rejected() {
        let client = MockRestClient::dataset(1000, 10);
        let result = PageWalker::new(&client)
            .get_page("/api/v2/images", &Query::new(), 0, 10)
            .await;

        assert!(matches!(result, Err(ClientError::Configuration(_))));
        assert_eq!(client.request_count(), 0);
    }
}
