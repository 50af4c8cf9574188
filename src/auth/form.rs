//! Form POST login

use crate::auth::AuthScheme;
use crate::errors::AuthError;
use crate::http::DeviceClient;
use crate::models::{Credentials, PasswordEncoding};
use crate::parser;
use crate::session::{AuthKind, AuthenticatedSession};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Classic embedded-web login form: POST the configured fields, hope for a
/// 200. Some firmwares rotate a one-time token into the form's action URL,
/// so the login page is fetched first and its action wins over the
/// configured path when present.
pub struct FormScheme {
    pub path: String,
    pub method: String,
    pub username_field: String,
    pub password_field: String,
    pub password_encoding: PasswordEncoding,
    pub hidden: BTreeMap<String, String>,
    pub success_marker: Option<String>,
    pub logout_path: Option<String>,
}

impl FormScheme {
    pub fn encode_password(&self, password: &str) -> String {
        match self.password_encoding {
            PasswordEncoding::Plain => password.to_string(),
            PasswordEncoding::Base64 => BASE64.encode(password.as_bytes()),
        }
    }

    /// Fetch the login page; its form action URL (which may carry a
    /// one-time token) wins over the configured path
    async fn fetch_login_page(
        &self,
        client: &DeviceClient,
        base_url: &str,
    ) -> Result<(String, String), AuthError> {
        let login_url = format!("{}{}", base_url, self.path);
        let resp = client.get(&login_url).await?;
        let body = resp.text().await.unwrap_or_default();

        let action = match parser::extract_form_action(&body) {
            Some(action) if action.starts_with("http") => action,
            Some(action) if action.starts_with('/') => format!("{}{}", base_url, action),
            Some(action) => format!("{}/{}", base_url, action),
            None => login_url,
        };
        Ok((action, body))
    }

    /// Assemble the POST fields. A hidden field configured with an empty
    /// value is dynamic: its real value (a nonce, a CSRF token) lives in
    /// the login page and is harvested from there.
    fn build_fields(&self, login_page: &str, creds: &Credentials) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = Vec::new();
        for (name, value) in &self.hidden {
            let value = if value.is_empty() {
                parser::extract_input_value(login_page, name).unwrap_or_default()
            } else {
                value.clone()
            };
            fields.push((name.clone(), value));
        }
        fields.push((self.username_field.clone(), creds.username.clone()));
        fields.push((
            self.password_field.clone(),
            self.encode_password(&creds.password),
        ));
        fields
    }
}

#[async_trait]
impl AuthScheme for FormScheme {
    fn name(&self) -> &'static str {
        "form"
    }

    async fn authenticate(
        &self,
        client: Arc<DeviceClient>,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<AuthenticatedSession, AuthError> {
        let creds = credentials.ok_or_else(|| AuthError::Credentials {
            scheme: "form",
            reason: "no credentials supplied for a protected device".to_string(),
        })?;

        tracing::info!("[form] Fetching login page {}", self.path);
        let (action, login_page) = self.fetch_login_page(&client, base_url).await?;
        let fields = self.build_fields(&login_page, creds);

        tracing::info!("[form] Submitting credentials to {}", action);
        let resp = if self.method.eq_ignore_ascii_case("get") {
            // A few firmwares take the login fields as a query string
            let query = fields
                .iter()
                .map(|(name, value)| {
                    format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
                })
                .collect::<Vec<_>>()
                .join("&");
            client.get(&format!("{}?{}", action, query)).await?
        } else {
            client.post_form(&action, &fields).await?
        };
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Credentials {
                scheme: "form",
                reason: format!("login rejected with {}", status),
            });
        }
        if !status.is_success() && !status.is_redirection() {
            return Err(AuthError::Protocol(format!(
                "unexpected status {} from login form",
                status
            )));
        }

        let body = resp.text().await.unwrap_or_default();
        if let Some(marker) = &self.success_marker {
            if !body.contains(marker.as_str()) {
                // A login page echoed back means the credentials did not take
                return Err(AuthError::Credentials {
                    scheme: "form",
                    reason: format!("response lacks success marker '{}'", marker),
                });
            }
        }

        let mut session = AuthenticatedSession::new(client, base_url, AuthKind::Form);
        session.set_logout_path(self.logout_path.clone());
        session.add_resource(&self.path, body);
        Ok(session)
    }
}
