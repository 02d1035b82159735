//! # aquarest-common
//!
//! Shared, network-free types for the Aqua REST client.
//!
//! This crate provides the building blocks the client is assembled from:
//! - Client configuration with environment-sourced defaults
//! - An encrypted in-memory credential cell for tokens and login payloads
//! - Response-shape classification used to walk paginated endpoints
//!
//! ## Example
//!
//! ```
//! use aquarest_common::{ClientConfig, Secret, SecretBox};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new()
//!     .with_instance("https://aqua.example.com")?
//!     .with_per_page_max(500)?;
//!
//! let mut token = SecretBox::new();
//! token.store("eyJhbGciOi...")?;
//! assert!(token.has_data());
//! assert_eq!(token.fetch()?, Secret::from("eyJhbGciOi..."));
//! # Ok(())
//! # }
//! ```

/// Client configuration types.
///
/// Contains the instance URL, port override, page-size ceiling and transport flags.
pub mod config;
/// Encrypted credential storage.
///
/// Provides `SecretBox`, the cell that keeps a token or login payload encrypted at rest.
pub mod credentials;
/// Pagination shape inference.
pub mod pagination;

pub use config::{ClientConfig, ConfigError, DEFAULT_PER_PAGE_MAX};
pub use credentials::{CipherAlgorithm, CredentialError, LoginCredentials, Secret, SecretBox};
pub use pagination::{PagePlan, PageShape, PaginationAnalysis, ResponseKind};
