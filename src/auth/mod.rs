//! Authentication scheme dispatch
//!
//! Each of the five mutually exclusive authentication protocols implements
//! the `AuthScheme` trait; `scheme_for` is the explicit descriptor-to-scheme
//! constructor map. There is no runtime discovery or registration: a new
//! scheme means a new arm here.

pub mod form;
pub mod hnap;
pub mod url_token;

pub use form::FormScheme;
pub use hnap::HnapScheme;
pub use url_token::UrlTokenScheme;

use crate::errors::AuthError;
use crate::http::DeviceClient;
use crate::models::{AuthDescriptor, Credentials};
use crate::session::{AuthKind, AuthenticatedSession};
use async_trait::async_trait;
use std::sync::Arc;

/// One authentication protocol against one device.
///
/// Implementations establish a session or fail with a classified error:
/// `Connection` (unreachable), `Credentials` (device said no), or
/// `Protocol` (this descriptor does not match this device).
#[async_trait]
pub trait AuthScheme: Send + Sync {
    /// Short scheme name for logs and error messages
    fn name(&self) -> &'static str;

    /// Run the handshake and hand back an authenticated session
    async fn authenticate(
        &self,
        client: Arc<DeviceClient>,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<AuthenticatedSession, AuthError>;
}

/// Build the scheme for a descriptor's active variant. Nothing outside that
/// variant is ever read.
pub fn scheme_for(descriptor: &AuthDescriptor) -> Box<dyn AuthScheme> {
    match descriptor {
        AuthDescriptor::None => Box::new(NoneScheme),
        AuthDescriptor::Basic => Box::new(BasicScheme),
        AuthDescriptor::Form {
            path,
            method,
            username_field,
            password_field,
            password_encoding,
            hidden,
            success_marker,
            logout_path,
        } => Box::new(FormScheme {
            path: path.clone(),
            method: method.clone(),
            username_field: username_field.clone(),
            password_field: password_field.clone(),
            password_encoding: *password_encoding,
            hidden: hidden.clone(),
            success_marker: success_marker.clone(),
            logout_path: logout_path.clone(),
        }),
        AuthDescriptor::Hnap {
            endpoint,
            namespace,
            hmac,
            noop,
        } => Box::new(HnapScheme {
            endpoint: endpoint.clone(),
            namespace: namespace.clone(),
            algorithm: *hmac,
            noop: *noop,
        }),
        AuthDescriptor::UrlToken {
            login_path,
            data_path,
            link_prefix,
            token_prefix,
            cookie_name,
            success_marker,
        } => Box::new(UrlTokenScheme {
            login_path: login_path.clone(),
            data_path: data_path.clone(),
            link_prefix: link_prefix.clone(),
            token_prefix: token_prefix.clone(),
            cookie_name: cookie_name.clone(),
            success_marker: success_marker.clone(),
        }),
    }
}

/// Open management interfaces: nothing to do
pub struct NoneScheme;

#[async_trait]
impl AuthScheme for NoneScheme {
    fn name(&self) -> &'static str {
        "none"
    }

    /// Succeeds immediately with no network calls; calling it twice
    /// produces two independent successes.
    async fn authenticate(
        &self,
        client: Arc<DeviceClient>,
        base_url: &str,
        _credentials: Option<&Credentials>,
    ) -> Result<AuthenticatedSession, AuthError> {
        Ok(AuthenticatedSession::new(client, base_url, AuthKind::None))
    }
}

/// HTTP Basic: credentials ride along on every later request.
///
/// Success here is optimistic - the device only proves or disproves the
/// credentials on the first authenticated page fetch.
pub struct BasicScheme;

#[async_trait]
impl AuthScheme for BasicScheme {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn authenticate(
        &self,
        client: Arc<DeviceClient>,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<AuthenticatedSession, AuthError> {
        let creds = credentials.ok_or_else(|| AuthError::Credentials {
            scheme: "basic",
            reason: "no credentials supplied for a protected device".to_string(),
        })?;

        let mut session = AuthenticatedSession::new(client, base_url, AuthKind::Basic);
        session.set_basic(creds.clone());
        Ok(session)
    }
}
