//! Authenticated device sessions
//!
//! The opaque success value of the authentication engine. It knows how to
//! fetch further pages the way the winning scheme requires (Basic header,
//! signed HNAP call, tokenized URL) and accumulates every fetched resource
//! for the data-extraction layer, which performs no network calls of its
//! own.

use crate::auth::hnap::{self, HnapKeys};
use crate::errors::AuthError;
use crate::http::DeviceClient;
use crate::models::Credentials;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sentinel resource key for a batched HNAP data response
pub const HNAP_BATCH_RESOURCE_KEY: &str = "hnap:batch";

/// Which authentication variant produced this session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    None,
    Basic,
    Form,
    Hnap,
    UrlToken,
}

impl AuthKind {
    pub fn name(&self) -> &'static str {
        match self {
            AuthKind::None => "none",
            AuthKind::Basic => "basic",
            AuthKind::Form => "form",
            AuthKind::Hnap => "hnap",
            AuthKind::UrlToken => "url_token",
        }
    }
}

/// Session state for the URL-token scheme
#[derive(Debug, Clone)]
pub struct UrlTokenState {
    pub data_path: String,
    pub token_prefix: String,
    pub token: Option<String>,
}

impl UrlTokenState {
    /// Data-page URL carrying the session token derived from the cookie
    fn data_url(&self, base_url: &str, path: &str) -> String {
        match &self.token {
            Some(token) if path == self.data_path => format!(
                "{}{}{}{}",
                base_url,
                path,
                self.token_prefix,
                urlencoding::encode(token)
            ),
            _ => format!("{}{}", base_url, path),
        }
    }
}

#[derive(Debug)]
pub struct AuthenticatedSession {
    client: Arc<DeviceClient>,
    base_url: String,
    kind: AuthKind,
    basic: Option<Credentials>,
    hnap: Option<HnapKeys>,
    url_token: Option<UrlTokenState>,
    logout_path: Option<String>,
    resources: BTreeMap<String, String>,
}

impl AuthenticatedSession {
    pub fn new(client: Arc<DeviceClient>, base_url: &str, kind: AuthKind) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            kind,
            basic: None,
            hnap: None,
            url_token: None,
            logout_path: None,
            resources: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> AuthKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn set_basic(&mut self, creds: Credentials) {
        self.basic = Some(creds);
    }

    pub(crate) fn set_hnap(&mut self, keys: HnapKeys) {
        self.hnap = Some(keys);
    }

    pub(crate) fn set_url_token(&mut self, state: UrlTokenState) {
        self.url_token = Some(state);
    }

    pub(crate) fn set_logout_path(&mut self, path: Option<String>) {
        self.logout_path = path;
    }

    /// Private key derived by the HNAP handshake, if that variant won
    pub fn hnap_keys(&self) -> Option<&HnapKeys> {
        self.hnap.as_ref()
    }

    /// Pages fetched so far, keyed by path (plus protocol sentinel keys)
    pub fn resources(&self) -> &BTreeMap<String, String> {
        &self.resources
    }

    pub fn add_resource(&mut self, key: &str, body: String) {
        self.resources.insert(key.to_string(), body);
    }

    /// Fetch a device page with whatever authentication this session
    /// carries, recording the body for the extraction layer
    pub async fn fetch_page(&mut self, path: &str) -> Result<String, AuthError> {
        let resp = match (&self.kind, &self.basic, &self.hnap, &self.url_token) {
            (AuthKind::Basic, Some(creds), _, _) => {
                let url = format!("{}{}", self.base_url, path);
                self.client
                    .get_basic_auth(&url, &creds.username, &creds.password)
                    .await?
            }
            (AuthKind::Hnap, _, Some(keys), _) => {
                let url = format!("{}{}", self.base_url, path);
                let mut headers = HeaderMap::new();
                headers.insert(
                    COOKIE,
                    HeaderValue::from_str(&keys.cookie_header())
                        .map_err(|e| AuthError::Protocol(e.to_string()))?,
                );
                self.client.get_with_headers(&url, headers).await?
            }
            (AuthKind::UrlToken, _, _, Some(state)) => {
                let url = state.data_url(&self.base_url, path);
                self.client.get(&url).await?
            }
            _ => {
                let url = format!("{}{}", self.base_url, path);
                self.client.get(&url).await?
            }
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Optimistic schemes (Basic) are only disproven here
            return Err(AuthError::Credentials {
                scheme: self.kind.name(),
                reason: format!("authenticated fetch of {} returned {}", path, status),
            });
        }
        if !status.is_success() {
            return Err(AuthError::Protocol(format!(
                "authenticated fetch of {} returned {}",
                path, status
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::Protocol(e.to_string()))?;
        self.add_resource(path, body.clone());
        Ok(body)
    }

    /// Signed HNAP call for a single action
    pub async fn hnap_call(
        &mut self,
        action: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, AuthError> {
        let keys = self
            .hnap
            .as_ref()
            .ok_or_else(|| AuthError::Protocol("not an HNAP session".to_string()))?;
        let url = format!("{}{}", self.base_url, keys.endpoint);
        let headers = keys.signed_headers(action)?;
        let resp = self
            .client
            .post_json_with_headers(&url, &body, headers)
            .await?;
        resp.json()
            .await
            .map_err(|e| AuthError::Protocol(format!("{} reply not JSON: {}", action, e)))
    }

    /// Batched `GetMultipleHNAPs` over the given actions. A firmware that
    /// dislikes the no-op shape omits sections from a 200 reply; the result
    /// is returned as-is so callers can treat missing sections as partial
    /// data.
    pub async fn hnap_call_many(
        &mut self,
        actions: &[String],
    ) -> Result<serde_json::Value, AuthError> {
        let noop = self
            .hnap
            .as_ref()
            .ok_or_else(|| AuthError::Protocol("not an HNAP session".to_string()))?
            .noop;
        let body = hnap::batch_body(actions, noop);
        let reply = self.hnap_call("GetMultipleHNAPs", body).await?;
        self.add_resource(HNAP_BATCH_RESOURCE_KEY, reply.to_string());
        Ok(reply)
    }

    /// Best-effort logout for schemes that declare one. Errors are
    /// swallowed: the session is being discarded either way.
    pub async fn close(self) {
        if let Some(path) = &self.logout_path {
            let url = format!("{}{}", self.base_url, path);
            if self.client.get(&url).await.is_err() {
                tracing::debug!("Logout request to {} failed", url);
            }
        }
    }
}
