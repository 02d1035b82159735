//! Login and token caching.
//!
//! [`AuthSession`] posts decrypted credentials to the fixed login endpoint and,
//! when the response carries a token, stores it in the client's
//! [`TokenHandle`]. Every later request through the same client then carries
//! `Authorization: Bearer <token>`.
//!
//! # Example
//!
//! ```no_run
//! use aquarest_client::{AquaClient, AuthSession};
//! use aquarest_common::{ClientConfig, LoginCredentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AquaClient::new(ClientConfig::new().with_instance("https://aqua.example.com")?)?;
//!
//! let sealed = LoginCredentials::new("administrator", "Password1!").seal()?;
//! let token = AuthSession::new(&client).authenticate(&sealed).await?;
//! assert!(token.has_data().await);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde_json::Value;
use tokio::sync::RwLock;

use aquarest_common::{LoginCredentials, Secret, SecretBox};

use crate::error::ClientError;
use crate::request::{ApiRequest, Method, RestClient};

/// Path of the login endpoint.
pub const LOGIN_PATH: &str = "/api/v1/login";

const TOKEN_FIELD: &str = "token";
const MESSAGE_FIELD: &str = "message";

/// Shared handle to a client's cached bearer token.
///
/// Clones refer to the same [`SecretBox`]. A `store` replaces the token for
/// every later `fetch`; plaintext fetched earlier is unaffected.
#[derive(Clone, Default)]
pub struct TokenHandle {
    cell: Arc<RwLock<SecretBox>>,
}

impl fmt::Debug for TokenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenHandle").finish_non_exhaustive()
    }
}

impl TokenHandle {
    /// Creates a handle over an empty AES-256-CBC cell.
    #[must_use]
    pub fn new() -> Self {
        Self::from_box(SecretBox::new())
    }

    /// Creates a handle over an existing cell.
    #[must_use]
    pub fn from_box(cell: SecretBox) -> Self {
        Self {
            cell: Arc::new(RwLock::new(cell)),
        }
    }

    /// Whether a token is cached.
    pub async fn has_data(&self) -> bool {
        self.cell.read().await.has_data()
    }

    /// Decrypts the cached token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DecryptionError`] if no token is cached.
    pub async fn fetch(&self) -> Result<Secret, ClientError> {
        Ok(self.cell.read().await.fetch()?)
    }

    /// Encrypts and caches `secret`, replacing any previous token.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be encrypted.
    pub async fn store(&self, secret: impl Into<Secret> + Send) -> Result<(), ClientError> {
        self.cell.write().await.store(secret)?;
        Ok(())
    }
}

/// The parts of a login response the session reads. Other fields are ignored.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LoginResponse {
    /// The issued token, if any.
    pub token: Option<Value>,
    /// Server-provided explanation, usually present on failure.
    pub message: Option<String>,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("message", &self.message)
            .finish()
    }
}

impl LoginResponse {
    /// Reads `token` and `message` from a raw response.
    #[must_use]
    pub fn from_response(response: &Value) -> Self {
        Self {
            token: response.get(TOKEN_FIELD).cloned(),
            message: response
                .get(MESSAGE_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// The token as a secret.
    ///
    /// A string token is stored as plain text; any other non-null value is
    /// stored structured.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthenticationFailed`] with the server's message
    /// when the token is missing, null or empty.
    pub fn into_token(self) -> Result<Secret, ClientError> {
        match self.token {
            Some(Value::String(token)) if !token.is_empty() => Ok(Secret::PlainText(token)),
            Some(Value::Null | Value::String(_)) | None => {
                Err(ClientError::AuthenticationFailed(self.message))
            }
            Some(other) => Ok(Secret::Structured(other)),
        }
    }
}

/// Exchanges credentials for a bearer token.
pub struct AuthSession<'a, C: RestClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: RestClient + ?Sized> AuthSession<'a, C> {
    /// Creates a session over `client`.
    pub const fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Posts the decrypted credential payload to the login endpoint and returns
    /// the raw response.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be decrypted or the request fails.
    pub async fn fetch_token(&self, credentials: &SecretBox) -> Result<Value, ClientError> {
        let payload = credentials.fetch()?.into_value();
        self.client
            .request(
                ApiRequest::builder()
                    .method(Method::Post)
                    .endpoint(LOGIN_PATH)
                    .body(payload)
                    .build(),
            )
            .await
    }

    /// Logs in and caches the returned token.
    ///
    /// The cached token is left untouched when the login fails.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthenticationFailed`] carrying the server's
    /// `message` (if any) when the response has no token, or any error from
    /// [`fetch_token`](Self::fetch_token).
    pub async fn authenticate(&self, credentials: &SecretBox) -> Result<TokenHandle, ClientError> {
        let response = LoginResponse::from_response(&self.fetch_token(credentials).await?);
        let token = response.into_token()?;

        let handle = self.client.token();
        handle.store(token).await?;
        debug!("login succeeded, token cached");

        Ok(handle.clone())
    }

    /// Seals `credentials` and logs in with them.
    ///
    /// # Errors
    ///
    /// See [`authenticate`](Self::authenticate).
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<TokenHandle, ClientError> {
        let sealed = credentials.seal()?;
        self.authenticate(&sealed).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::request::{AquaClient, Query};
    use aquarest_common::ClientConfig;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_client(base_url: &str) -> AquaClient {
        let config = ClientConfig::new().with_instance(base_url).unwrap();
        AquaClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_token_handle_round_trip() {
        let handle = TokenHandle::new();
        assert!(!handle.has_data().await);
        assert!(matches!(
            handle.fetch().await,
            Err(ClientError::DecryptionError(_))
        ));

        handle.store("abc").await.unwrap();
        let clone = handle.clone();
        assert!(clone.has_data().await);
        assert_eq!(clone.fetch().await.unwrap(), Secret::from("abc"));
    }

    #[test]
    fn test_login_response_token_forms() {
        let response = LoginResponse::from_response(&json!({"token": "abc", "user": {}}));
        assert_eq!(response.into_token().unwrap(), Secret::from("abc"));

        let response = LoginResponse::from_response(&json!({"token": {"jwt": "abc"}}));
        assert_eq!(
            response.into_token().unwrap(),
            Secret::Structured(json!({"jwt": "abc"}))
        );

        let response = LoginResponse::from_response(&json!({"token": "", "message": "locked"}));
        assert!(matches!(
            response.into_token(),
            Err(ClientError::AuthenticationFailed(Some(_)))
        ));

        let response = LoginResponse::from_response(&json!([1, 2]));
        assert_eq!(response, LoginResponse::default());
    }

    #[test]
    fn test_login_response_debug_redacts_token() {
        let response = LoginResponse::from_response(&json!({"token": "s3cr3t"}));
        assert!(!format!("{response:?}").contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_fetch_token_posts_decrypted_payload() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({"username": "administrator", "password": "Password1!"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t0k3n"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let sealed = LoginCredentials::new("administrator", "Password1!")
            .seal()
            .unwrap();

        let response = AuthSession::new(&client)
            .fetch_token(&sealed)
            .await
            .unwrap();
        assert_eq!(response, json!({"token": "t0k3n"}));
        assert!(!client.token().has_data().await);
    }

    #[tokio::test]
    async fn test_authenticate_caches_token_for_later_requests() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "t0k3n",
                "user": {"id": "administrator"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v2/images"))
            .and(header("authorization", "Bearer t0k3n"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let handle = client
            .login(&LoginCredentials::new("administrator", "Password1!"))
            .await
            .unwrap();

        assert_eq!(handle.fetch().await.unwrap(), Secret::from("t0k3n"));
        assert!(client.token().has_data().await);

        let images = client.get("/api/v2/images", Query::new()).await.unwrap();
        assert_eq!(images, json!([]));
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_touching_cache() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let sealed = LoginCredentials::new("administrator", "wrong").seal().unwrap();

        let err = client.authenticate(&sealed).await.unwrap_err();
        assert!(
            matches!(&err, ClientError::AuthenticationFailed(Some(m)) if m == "Invalid credentials"),
            "unexpected error: {err}"
        );
        assert!(!client.token().has_data().await);
    }

    #[tokio::test]
    async fn test_failed_login_keeps_previous_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": null})))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        client.set_token("previous").await.unwrap();

        let sealed = LoginCredentials::new("administrator", "wrong").seal().unwrap();
        let err = client.authenticate(&sealed).await.unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailed(None)));
        assert_eq!(
            client.token().fetch().await.unwrap(),
            Secret::from("previous")
        );
    }

    #[tokio::test]
    async fn test_empty_credentials_cell_fails_before_network() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        let result = client.authenticate(&SecretBox::new()).await;
        assert!(matches!(result, Err(ClientError::DecryptionError(_))));
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }
}
