//! HTTP client with per-phase timeouts, cookie support, and failure classification

use crate::errors::AuthError;
use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Response};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Probe fetches are opportunistic: fail fast and move on
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Cookie-carrying HTTP client for one device session.
///
/// There is deliberately no retry logic here: a connection failure inside a
/// detection call is classified and handed to the orchestrator, which
/// advances to the next candidate instead of hammering the same device.
#[derive(Debug)]
pub struct DeviceClient {
    inner: Client,
    probe_timeout: Duration,
    timeout: Duration,
}

impl DeviceClient {
    pub fn new() -> Result<Self> {
        Self::with_timeouts(DEFAULT_TIMEOUT, CONNECT_TIMEOUT, PROBE_TIMEOUT)
    }

    pub fn with_timeouts(
        timeout: Duration,
        connect_timeout: Duration,
        probe_timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html, application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: client,
            probe_timeout,
            timeout,
        })
    }

    /// Unauthenticated probe of the device root. Returns the body on any
    /// completed response (even 401/403 pages carry branding) and `None` on
    /// a connection-level failure, so the pre-filter can degrade gracefully.
    pub async fn probe(&self, url: &str) -> Option<String> {
        let resp = self
            .inner
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .ok()?;
        resp.text().await.ok()
    }

    pub async fn get(&self, url: &str) -> Result<Response, AuthError> {
        self.get_with_timeout(url, self.timeout).await
    }

    /// GET with an explicit timeout, used when a caller deadline caps the
    /// remaining budget below the configured request timeout
    pub async fn get_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Response, AuthError> {
        self.inner
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)
    }

    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<Response, AuthError> {
        self.inner
            .get(url)
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)
    }

    pub async fn get_basic_auth(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<Response, AuthError> {
        self.inner
            .get(url)
            .basic_auth(username, Some(password))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)
    }

    pub async fn post_form<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
    ) -> Result<Response, AuthError> {
        self.inner
            .post(url)
            .form(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)
    }

    pub async fn post_json_with_headers<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        headers: HeaderMap,
    ) -> Result<Response, AuthError> {
        self.inner
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Requested-With", "XMLHttpRequest")
            .headers(headers)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)
    }
}

/// Map a transport error onto the failure taxonomy: anything that never
/// produced a response is a connection failure; a malformed exchange is a
/// protocol mismatch.
fn classify(err: reqwest::Error) -> AuthError {
    if err.is_timeout() || err.is_connect() {
        AuthError::Connection(err.to_string())
    } else if err.is_decode() || err.is_body() {
        AuthError::Protocol(err.to_string())
    } else {
        AuthError::Connection(err.to_string())
    }
}
