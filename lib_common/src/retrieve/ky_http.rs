//! # HTTP Retrieval
//!
//! The one place outbound HTTP happens. Timeout, TLS, redirect and
//! user-agent policy live in [`FetchOptions`]; the wire itself sits behind
//! the [`Transport`] trait so tests can swap it for a scripted one.
//!
//! There is no retry layer here: a failed call is reported once and the
//! caller decides what to do with it.

use async_trait::async_trait;
use reqwest::redirect::Policy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Browser-like agent string; the scraped site rejects obvious bots.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// HTTP Basic credentials, supplied per call and never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"*****")
            .finish()
    }
}

/// # Fetch Options
///
/// Per-call request policy. Both timeouts are always finite.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Total time allowed for the whole exchange.
    pub timeout_seconds: u64,
    /// Time allowed to establish the TCP/TLS connection.
    pub connect_timeout_seconds: u64,
    pub user_agent: String,
    pub follow_redirects: bool,
    pub verify_tls: bool,
    pub basic_auth: Option<Credentials>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 15,
            connect_timeout_seconds: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            follow_redirects: true,
            verify_tls: true,
            basic_auth: None,
        }
    }
}

impl FetchOptions {
    /// Same policy with Basic credentials attached.
    pub fn with_basic_auth(&self, credentials: Option<Credentials>) -> Self {
        Self {
            basic_auth: credentials,
            ..self.clone()
        }
    }
}

/// Status and body of a completed exchange, whatever the status was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Whether a response is usable as a page: status 200–399 and a body with
/// something other than whitespace in it.
pub fn check(response: &RawResponse) -> Result<(), FetchError> {
    if !(200..400).contains(&response.status) {
        return Err(FetchError::Status(response.status));
    }
    if response.body.trim().is_empty() {
        return Err(FetchError::EmptyBody(response.status));
    }
    Ok(())
}

/// Transport-level failures, plus the "response was not usable" cases of
/// [`Fetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered outside 200–399.
    #[error("upstream answered HTTP {0}")]
    Status(u16),

    /// The server answered 200–399 with nothing in the body.
    #[error("upstream answered HTTP {0} with an empty body")]
    EmptyBody(u16),

    /// The request timed out before a response arrived.
    #[error("no response: request timed out")]
    Timeout,

    /// Anything else that kept a response from arriving (DNS, refused, TLS).
    #[error("no response: {0}")]
    NoResponse(String),
}

impl FetchError {
    /// The HTTP status, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) | FetchError::EmptyBody(code) => Some(*code),
            FetchError::Timeout | FetchError::NoResponse(_) => None,
        }
    }
}

/// The wire under the [`Fetcher`]. Implementations must honour every field
/// of [`FetchOptions`] and return `Ok` for any status code.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, options: &FetchOptions) -> Result<RawResponse, FetchError>;
}

/// `reqwest`-backed transport. A client is built for each call and dropped
/// when the call returns, so its connection never outlives the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    fn build_client(options: &FetchOptions) -> Result<reqwest::Client, FetchError> {
        let redirect = if options.follow_redirects {
            Policy::limited(10)
        } else {
            Policy::none()
        };

        reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .connect_timeout(Duration::from_secs(options.connect_timeout_seconds))
            .user_agent(options.user_agent.as_str())
            .redirect(redirect)
            .danger_accept_invalid_certs(!options.verify_tls)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| FetchError::NoResponse(format!("client setup failed: {}", e)))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::NoResponse(err.without_url().to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, options: &FetchOptions) -> Result<RawResponse, FetchError> {
        let client = Self::build_client(options)?;

        let mut req = client.get(url);
        if let Some(creds) = &options.basic_auth {
            req = req.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = req.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(RawResponse { status, body })
    }
}

/// # Fetcher
///
/// Issues single GET requests under a [`FetchOptions`] policy.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    /// A fetcher on the real network.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport))
    }

    /// A fetcher on a caller-supplied transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetches `url` and returns the body.
    ///
    /// # Errors
    /// `FetchError::Status` outside 200–399, `FetchError::EmptyBody` for an
    /// empty body, and the transport errors otherwise.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let response = self.request(url, options).await?;

        if let Err(e) = check(&response) {
            tracing::warn!(url, status = response.status, error = %e, "fetch rejected");
            return Err(e);
        }

        Ok(response.body)
    }

    /// Performs the exchange and hands back status and body untouched. Only
    /// transport failures are errors.
    pub async fn request(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<RawResponse, FetchError> {
        tracing::debug!(url, authenticated = options.basic_auth.is_some(), "outbound GET");

        let result = self.transport.get(url, options).await;
        match &result {
            Ok(resp) => tracing::debug!(url, status = resp.status, bytes = resp.body.len(), "outbound GET done"),
            Err(e) => tracing::warn!(url, error = %e, "outbound GET failed"),
        }
        result
    }
}
