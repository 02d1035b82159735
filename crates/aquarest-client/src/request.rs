//! Request engine for the Aqua REST API.
//!
//! [`AquaClient`] turns an [`ApiRequest`] into one HTTP call and returns the
//! parsed JSON body. It supports exactly two methods, `GET` and `POST`, and
//! only JSON payloads.
//!
//! # Security
//!
//! When the client holds a token it is attached as `Authorization: Bearer ...`
//! unless the caller supplied an `Authorization` header. With the debug flag
//! set, the method and target URL of each call are logged; headers and bodies
//! never are.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::{Map, Value};
use typed_builder::TypedBuilder;
use url::Url;

use aquarest_common::{ClientConfig, LoginCredentials, PaginationAnalysis, Secret, SecretBox};

use crate::auth::{AuthSession, TokenHandle};
use crate::error::ClientError;
use crate::pagination::PageWalker;

/// Header carrying the bearer token.
pub const AUTHORIZATION: &str = "Authorization";
/// Header carrying the serialized body length.
pub const CONTENT_LENGTH: &str = "Content-Length";
const ACCEPT: &str = "Accept";
const CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";

/// HTTP methods the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// Read.
    #[default]
    Get,
    /// Create.
    Post,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
        }
    }
}

/// Ordered query parameters.
///
/// Values are converted to strings as they are added. Adding a key twice
/// produces a repeated parameter, never an array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a parameter.
    pub fn append(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    /// Appends a parameter, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.append(key, value);
        self
    }

    /// Removes every parameter named `key`.
    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.0.retain(|(k, _)| k != key);
        self
    }

    /// Every value recorded for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over the parameters in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, (String, String)> {
        self.0.iter()
    }

    /// Number of parameters.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Self::new();
        query.extend(iter);
        query
    }
}

impl<K: Into<String>, V: ToString> Extend<(K, V)> for Query {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.append(key, value);
        }
    }
}

/// Request headers with case-insensitive lookup.
#[derive(Clone, Default)]
pub struct Headers(Vec<(String, String)>);

// Header values may carry credentials, so only names are printed.
impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.0.iter().map(|(name, _)| name))
            .finish()
    }
}

impl Headers {
    /// Creates an empty header set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// The defaults used when a caller supplies no headers.
    #[must_use]
    pub fn json_defaults() -> Self {
        Self::new()
            .with(ACCEPT, APPLICATION_JSON)
            .with(CONTENT_TYPE, APPLICATION_JSON)
    }

    /// Sets `name`, replacing any existing value under any casing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
        self
    }

    /// Sets `name`, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Value of `name`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether `name` is present, compared case-insensitively.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over the headers in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, (String, String)> {
        self.0.iter()
    }

    /// Whether no headers are set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single call to the API.
///
/// # Examples
///
/// ```
/// use aquarest_client::{ApiRequest, Method, Query};
/// use serde_json::json;
///
/// let list = ApiRequest::builder()
///     .endpoint("/api/v2/images")
///     .query(Query::new().with("registry", "Docker Hub"))
///     .build();
///
/// let create = ApiRequest::builder()
///     .method(Method::Post)
///     .endpoint("/api/v2/images")
///     .body(json!({"registry": "Docker Hub", "image": "alpine:3"}))
///     .build();
/// ```
#[derive(Clone, TypedBuilder)]
pub struct ApiRequest {
    /// HTTP method, `GET` unless set.
    #[builder(default)]
    pub method: Method,
    /// Path on the instance, replacing the instance URL's own path.
    #[builder(setter(into))]
    pub endpoint: String,
    /// Query parameters.
    #[builder(default)]
    pub query: Query,
    /// Explicit headers. When empty, JSON `Accept` and `Content-Type` are sent.
    #[builder(default)]
    pub headers: Headers,
    /// JSON body, sent with `POST` only. Defaults to `{}` for `POST`.
    #[builder(default, setter(strip_option))]
    pub body: Option<Value>,
}

// Custom Debug implementation to avoid exposing bodies (login payloads)
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Trait for clients that can issue API requests.
///
/// The page walker and login session are written against this seam, so any
/// implementation (including test doubles) gets pagination and authentication
/// for free.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// The client's configuration.
    fn config(&self) -> &ClientConfig;

    /// Handle to the cached bearer token.
    fn token(&self) -> &TokenHandle;

    /// Performs one request and returns the parsed JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No instance URL is configured
    /// - The stored token cannot be decrypted
    /// - The transport fails
    /// - The body is not valid JSON
    async fn request(&self, request: ApiRequest) -> Result<Value, ClientError>;

    /// Performs a `GET`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    async fn get(&self, endpoint: &str, query: Query) -> Result<Value, ClientError> {
        self.request(ApiRequest::builder().endpoint(endpoint).query(query).build())
            .await
    }

    /// Performs a `POST` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    async fn post(&self, endpoint: &str, body: Value) -> Result<Value, ClientError> {
        self.request(
            ApiRequest::builder()
                .method(Method::Post)
                .endpoint(endpoint)
                .body(body)
                .build(),
        )
        .await
    }
}

/// Client for an Aqua instance.
///
/// Cheap to clone; clones share the HTTP connection pool and the cached token.
#[derive(Clone)]
pub struct AquaClient {
    http: ClientWithMiddleware,
    config: Arc<ClientConfig>,
    token: TokenHandle,
}

// Custom Debug implementation to avoid exposing the token
impl fmt::Debug for AquaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AquaClient")
            .field("config", &self.config)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl AquaClient {
    /// Creates a client from a configuration.
    ///
    /// TLS verification and the request timeout come from `config`. No retry
    /// middleware is installed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aquarest_client::{AquaClient, RestClient};
    /// use aquarest_common::ClientConfig;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ClientConfig::new().with_instance("https://aqua.example.com")?;
    /// let client = AquaClient::new(config)?;
    /// client.set_token("eyJhbGciOi...").await?;
    ///
    /// let images = client.get_all("/api/v2/images", &Default::default()).await?;
    /// println!("{} images", images.len());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!config.verify_tls);
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let http = reqwest_middleware::ClientBuilder::new(builder.build()?).build();
        Self::with_http_client(config, http)
    }

    /// Creates a client over a caller-built middleware stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_http_client(
        config: ClientConfig,
        http: ClientWithMiddleware,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            token: TokenHandle::new(),
        })
    }

    /// Creates a client from the `AQUA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is invalid or the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Replaces the instance URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidInstance`] unless `instance` is an absolute URL.
    pub fn set_instance(&mut self, instance: &str) -> Result<(), ClientError> {
        Arc::make_mut(&mut self.config).set_instance(instance)?;
        Ok(())
    }

    /// Replaces the port override.
    pub fn set_port(&mut self, port: Option<u16>) {
        Arc::make_mut(&mut self.config).port = port;
    }

    /// Stores an operator-supplied token, replacing any cached one.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be encrypted.
    pub async fn set_token(&self, token: impl Into<Secret> + Send) -> Result<(), ClientError> {
        self.token.store(token).await
    }

    /// Composes the target URL for `path` and `query`.
    ///
    /// The path replaces whatever path the instance URL carries, query values
    /// are appended in order, and the port override (if any) is applied.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidInstance`] if no instance URL is configured
    /// or the port cannot be set on it.
    pub fn build_url(&self, path: &str, query: &Query) -> Result<Url, ClientError> {
        let mut url = self
            .config
            .instance
            .clone()
            .ok_or_else(|| ClientError::InvalidInstance("no instance URL configured".into()))?;

        url.set_path(path);

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        if let Some(port) = self.config.port {
            url.set_port(Some(port)).map_err(|()| {
                ClientError::InvalidInstance(format!("cannot set port {port} on {url}"))
            })?;
        }

        Ok(url)
    }

    /// Fetches one page; see [`PageWalker::get_page`].
    ///
    /// # Errors
    ///
    /// See [`PageWalker::get_page`].
    pub async fn get_page(
        &self,
        path: &str,
        query: &Query,
        page: u64,
        per_page: u32,
    ) -> Result<Value, ClientError> {
        PageWalker::new(self)
            .get_page(path, query, page, per_page)
            .await
    }

    /// Fetches every item of an endpoint; see [`PageWalker::get_all`].
    ///
    /// # Errors
    ///
    /// See [`PageWalker::get_all`].
    pub async fn get_all(&self, path: &str, query: &Query) -> Result<Vec<Value>, ClientError> {
        PageWalker::new(self).get_all(path, query).await
    }

    /// Samples an endpoint for pagination support; see [`PageWalker::analyze`].
    ///
    /// # Errors
    ///
    /// See [`PageWalker::analyze`].
    pub async fn analyze(
        &self,
        path: &str,
        query: &Query,
    ) -> Result<PaginationAnalysis, ClientError> {
        PageWalker::new(self).analyze(path, query).await
    }

    /// Exchanges sealed credentials for a token; see [`AuthSession::authenticate`].
    ///
    /// # Errors
    ///
    /// See [`AuthSession::authenticate`].
    pub async fn authenticate(&self, credentials: &SecretBox) -> Result<TokenHandle, ClientError> {
        AuthSession::new(self).authenticate(credentials).await
    }

    /// Seals and exchanges login credentials; see [`AuthSession::login`].
    ///
    /// # Errors
    ///
    /// See [`AuthSession::login`].
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<TokenHandle, ClientError> {
        AuthSession::new(self).login(credentials).await
    }
}

#[async_trait]
impl RestClient for AquaClient {
    fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn token(&self) -> &TokenHandle {
        &self.token
    }

    async fn request(&self, request: ApiRequest) -> Result<Value, ClientError> {
        let ApiRequest {
            method,
            endpoint,
            query,
            mut headers,
            body,
        } = request;

        let url = self.build_url(&endpoint, &query)?;

        if headers.is_empty() {
            headers = Headers::json_defaults();
        }

        let payload = match method {
            Method::Get => None,
            Method::Post => {
                let body = body.unwrap_or_else(|| Value::Object(Map::new()));
                let payload = serde_json::to_string(&body).map_err(|e| {
                    ClientError::Configuration(format!("cannot serialize request body: {e}"))
                })?;
                headers.insert(CONTENT_LENGTH, payload.len().to_string());
                Some(payload)
            }
        };

        if !headers.contains(AUTHORIZATION) && self.token.has_data().await {
            let token = self.token.fetch().await?;
            headers.insert(AUTHORIZATION, format!("Bearer {}", token.as_text()));
        }

        if self.config.debug {
            debug!("{method} {}", loggable(&url));
        }

        let mut request_builder = self.http.request(method.into(), url.clone());
        for (name, value) in headers.iter() {
            request_builder = request_builder.header(name, value);
        }
        if let Some(payload) = payload {
            request_builder = request_builder.body(payload);
        }

        let response = request_builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if self.config.debug {
            debug!("{method} {} -> {}", loggable(&url), status.as_u16());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::MalformedResponse(format!(
                "{method} {} returned a non-JSON body (status {}): {e}",
                url.path(),
                status.as_u16()
            ))
        })
    }
}

/// Copy of `url` without userinfo, safe to log.
fn loggable(url: &Url) -> Url {
    let mut shown = url.clone();
    // Both only fail on URLs that cannot carry userinfo at all.
    let _ = shown.set_username("");
    let _ = shown.set_password(None);
    shown
}
