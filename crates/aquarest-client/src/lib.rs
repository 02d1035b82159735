//! # aquarest-client
//!
//! Async client library for the Aqua Security REST API.
//!
//! This crate wraps a configured HTTP client with the behaviors every Aqua
//! integration needs:
//! - `GET`/`POST` requests with JSON bodies and an automatic bearer token
//! - Login against `/api/v1/login` with the token cached encrypted in memory
//! - Transparent retrieval of paginated list endpoints
//!
//! ## Example
//!
//! ```no_run
//! use aquarest_client::{AquaClient, Query, RestClient};
//! use aquarest_common::{ClientConfig, LoginCredentials};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::new()
//!     .with_instance("https://aqua.example.com")?
//!     .with_per_page_max(500)?;
//! let client = AquaClient::new(config)?;
//!
//! // Log in once; the token is attached to every later request
//! client
//!     .login(&LoginCredentials::new("administrator", "Password1!"))
//!     .await?;
//!
//! // Fetch every image, however many pages that takes
//! let query = Query::new().with("registry", "Docker Hub");
//! let images = client.get_all("/api/v2/images", &query).await?;
//! println!("{} images", images.len());
//!
//! // Plain single requests
//! let status = client.get("/api/v1/settings/version", Query::new()).await?;
//! println!("{status}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod pagination;
pub mod request;

pub use auth::{AuthSession, LOGIN_PATH, LoginResponse, TokenHandle};
pub use error::ClientError;
pub use pagination::{PAGE_PARAM, PAGE_SIZE_PARAM, PageWalker};
pub use request::{AquaClient, ApiRequest, Headers, Method, Query, RestClient};
