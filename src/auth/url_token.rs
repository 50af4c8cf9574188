//! URL-embedded session-token authentication
//!
//! Some firmwares hand out a session cookie on the login page and then
//! expect data-page requests to repeat the session in the URL itself. The
//! exact URL construction is vendor-specific but always derives from the
//! cookie value, so the descriptor carries the prefixes and the cookie
//! name.

use crate::auth::AuthScheme;
use crate::errors::AuthError;
use crate::http::DeviceClient;
use crate::models::Credentials;
use crate::parser;
use crate::session::{AuthKind, AuthenticatedSession, UrlTokenState};
use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::{Response, StatusCode};
use std::sync::Arc;

pub struct UrlTokenScheme {
    pub login_path: String,
    pub data_path: String,
    pub link_prefix: String,
    pub token_prefix: String,
    pub cookie_name: String,
    pub success_marker: Option<String>,
}

/// Pull a named cookie value out of a response's Set-Cookie headers
fn extract_cookie(resp: &Response, name: &str) -> Option<String> {
    for header in resp.headers().get_all(SET_COOKIE) {
        let raw = header.to_str().ok()?;
        let pair = raw.split(';').next()?.trim();
        if let Some((key, value)) = pair.split_once('=') {
            if key.trim() == name {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

impl UrlTokenScheme {
    /// The session token normally arrives as a cookie, but some firmwares
    /// only stash it in an inline script variable or directly after the
    /// token prefix in a page link
    fn resolve_token(&self, cookie: Option<String>, body: &str) -> Option<String> {
        cookie
            .or_else(|| parser::extract_value(body, &self.cookie_name))
            .or_else(|| parser::extract_url_token(body, &self.token_prefix).ok())
    }

    /// The login page may embed a session-specific login link; prefer it
    /// over the configured path, like a dynamic form action
    fn find_login_link(&self, body: &str) -> Option<String> {
        if self.link_prefix.is_empty() {
            return None;
        }
        let start = body.find(&self.link_prefix)?;
        let tail = &body[start..];
        let end = tail
            .find(|c: char| c == '"' || c == '\'' || c == '<' || c.is_whitespace())
            .unwrap_or(tail.len());
        Some(tail[..end].to_string())
    }
}

#[async_trait]
impl AuthScheme for UrlTokenScheme {
    fn name(&self) -> &'static str {
        "url_token"
    }

    async fn authenticate(
        &self,
        client: Arc<DeviceClient>,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<AuthenticatedSession, AuthError> {
        let login_url = format!("{}{}", base_url, self.login_path);
        tracing::info!("[url_token] Fetching login page {}", self.login_path);
        let resp = client.get(&login_url).await?;
        let cookie = extract_cookie(&resp, &self.cookie_name);
        let body = resp.text().await.unwrap_or_default();
        let token = self.resolve_token(cookie, &body);

        // Detection probes run without credentials: hand back the session
        // as-is rather than failing, so fingerprinting can continue.
        let creds = match credentials {
            Some(creds) => creds,
            None => {
                let mut session =
                    AuthenticatedSession::new(client, base_url, AuthKind::UrlToken);
                session.set_url_token(UrlTokenState {
                    data_path: self.data_path.clone(),
                    token_prefix: self.token_prefix.clone(),
                    token,
                });
                session.add_resource(&self.login_path, body);
                return Ok(session);
            }
        };

        let token = token.ok_or_else(|| {
            AuthError::Protocol(format!(
                "login page exposed no '{}' session token",
                self.cookie_name
            ))
        })?;

        // Establish the session against the embedded login link when the
        // page provides one
        let link_url = match self.find_login_link(&body) {
            Some(link) if link.starts_with("http") => link,
            Some(link) => format!("{}{}", base_url, link),
            None => login_url,
        };
        tracing::info!("[url_token] Establishing session via {}", link_url);
        let resp = client
            .get_basic_auth(&link_url, &creds.username, &creds.password)
            .await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Credentials {
                scheme: "url_token",
                reason: format!("session request rejected with {}", status),
            });
        }
        if !status.is_success() {
            return Err(AuthError::Protocol(format!(
                "unexpected status {} establishing session",
                status
            )));
        }

        let confirm = resp.text().await.unwrap_or_default();
        if let Some(marker) = &self.success_marker {
            if !confirm.contains(marker.as_str()) {
                return Err(AuthError::Credentials {
                    scheme: "url_token",
                    reason: format!("response lacks success marker '{}'", marker),
                });
            }
        }

        let mut session = AuthenticatedSession::new(client, base_url, AuthKind::UrlToken);
        session.set_url_token(UrlTokenState {
            data_path: self.data_path.clone(),
            token_prefix: self.token_prefix.clone(),
            token: Some(token),
        });
        session.add_resource(&self.login_path, body);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> UrlTokenScheme {
        UrlTokenScheme {
            login_path: "/login.html".to_string(),
            data_path: "/data/status.asp".to_string(),
            link_prefix: "/goform/session".to_string(),
            token_prefix: "?id=".to_string(),
            cookie_name: "SESSION".to_string(),
            success_marker: None,
        }
    }

    #[test]
    fn test_find_login_link() {
        let body = r#"<a href="/goform/session?n=42">continue</a>"#;
        assert_eq!(
            scheme().find_login_link(body).as_deref(),
            Some("/goform/session?n=42")
        );
        assert_eq!(scheme().find_login_link("<html>nothing</html>"), None);
    }

    #[test]
    fn test_find_login_link_stops_at_quote() {
        let body = r#"url = '/goform/session';"#;
        assert_eq!(
            scheme().find_login_link(body).as_deref(),
            Some("/goform/session")
        );
    }

    #[test]
    fn test_resolve_token_prefers_cookie_then_scrapes() {
        let s = scheme();
        let body = r#"
            var SESSION = "fromscript";
            <a href="/data/status.asp?id=fromlink">status</a>
        "#;
        assert_eq!(
            s.resolve_token(Some("fromcookie".into()), body).as_deref(),
            Some("fromcookie")
        );
        assert_eq!(s.resolve_token(None, body).as_deref(), Some("fromscript"));

        let linked_only = r#"<a href="/data/status.asp?id=fromlink">status</a>"#;
        assert_eq!(
            s.resolve_token(None, linked_only).as_deref(),
            Some("fromlink")
        );
        assert_eq!(s.resolve_token(None, "<html></html>"), None);
    }
}
