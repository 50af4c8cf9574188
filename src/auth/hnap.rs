//! HNAP challenge-response authentication
//!
//! The handshake is two Login calls against a fixed endpoint: the first
//! returns a challenge, a public key, and a session cookie; the second
//! carries a login credential derived by HMAC-signing the challenge. Every
//! request after that is signed with the derived private key. The HMAC
//! algorithm (MD5 vs SHA-256) varies by firmware and comes from the
//! profile - the wrong choice yields a handshake that fails at the confirm
//! step, never a hang.

use crate::auth::AuthScheme;
use crate::errors::AuthError;
use crate::http::DeviceClient;
use crate::models::{Credentials, HmacAlgorithm, NoopShape};
use crate::session::{AuthKind, AuthenticatedSession};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use md5::Md5;
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacMd5 = Hmac<Md5>;
type HmacSha256 = Hmac<Sha256>;

pub const SOAP_ACTION_HEADER: &str = "SOAPAction";
pub const HNAP_AUTH_HEADER: &str = "HNAP_AUTH";
/// Sentinel resource key for the raw login exchange handed to extraction
pub const LOGIN_RESOURCE_KEY: &str = "hnap:login";

/// HMAC over `message`, uppercase hex, with the profile's algorithm
pub fn hmac_hex(
    algorithm: HmacAlgorithm,
    key: &[u8],
    message: &[u8],
) -> Result<String, AuthError> {
    let bytes = match algorithm {
        HmacAlgorithm::Md5 => {
            let mut mac = HmacMd5::new_from_slice(key)
                .map_err(|e| AuthError::Protocol(format!("hmac-md5 key: {}", e)))?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(key)
                .map_err(|e| AuthError::Protocol(format!("hmac-sha256 key: {}", e)))?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(hex_upper(&bytes))
}

fn hex_upper(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

fn timestamp() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    millis % 2_000_000_000
}

/// Session keys derived by a completed handshake. Needed to sign every
/// subsequent request to the endpoint.
#[derive(Debug, Clone)]
pub struct HnapKeys {
    pub endpoint: String,
    pub namespace: String,
    pub algorithm: HmacAlgorithm,
    pub noop: NoopShape,
    pub private_key: String,
    pub cookie: String,
}

impl HnapKeys {
    fn soap_action(&self, action: &str) -> String {
        format!("\"{}{}\"", self.namespace, action)
    }

    /// SOAPAction + HNAP_AUTH + session cookies for one signed call.
    /// HNAP_AUTH is `HMAC(private_key, timestamp + soap_action)` plus the
    /// timestamp itself.
    pub fn signed_headers(&self, action: &str) -> Result<HeaderMap, AuthError> {
        let soap_action = self.soap_action(action);
        let ts = timestamp();
        let digest = hmac_hex(
            self.algorithm,
            self.private_key.as_bytes(),
            format!("{}{}", ts, soap_action).as_bytes(),
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(
            SOAP_ACTION_HEADER,
            HeaderValue::from_str(&soap_action)
                .map_err(|e| AuthError::Protocol(e.to_string()))?,
        );
        headers.insert(
            HNAP_AUTH_HEADER,
            HeaderValue::from_str(&format!("{} {}", digest, ts))
                .map_err(|e| AuthError::Protocol(e.to_string()))?,
        );
        headers.insert(
            reqwest::header::COOKIE,
            HeaderValue::from_str(&self.cookie_header())
                .map_err(|e| AuthError::Protocol(e.to_string()))?,
        );
        Ok(headers)
    }

    pub fn cookie_header(&self) -> String {
        format!("uid={}; PrivateKey={}", self.cookie, self.private_key)
    }
}

/// Fill a batched `GetMultipleHNAPs` body. Action slots that carry no
/// parameters get the firmware's expected no-op shape; the wrong shape
/// makes the device silently omit that section from a 200 response, which
/// callers must treat as partial data rather than an error.
pub fn batch_body(actions: &[String], noop: NoopShape) -> serde_json::Value {
    let slot = match noop {
        NoopShape::EmptyString => serde_json::json!(""),
        NoopShape::EmptyObject => serde_json::json!({}),
    };
    let mut map = serde_json::Map::new();
    for action in actions {
        map.insert(action.clone(), slot.clone());
    }
    serde_json::Value::Object(
        [("GetMultipleHNAPs".to_string(), serde_json::Value::Object(map))]
            .into_iter()
            .collect(),
    )
}

pub struct HnapScheme {
    pub endpoint: String,
    pub namespace: String,
    pub algorithm: HmacAlgorithm,
    pub noop: NoopShape,
}

impl HnapScheme {
    fn endpoint_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.endpoint)
    }

    fn login_headers(&self) -> Result<HeaderMap, AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            SOAP_ACTION_HEADER,
            HeaderValue::from_str(&format!("\"{}Login\"", self.namespace))
                .map_err(|e| AuthError::Protocol(e.to_string()))?,
        );
        Ok(headers)
    }

    fn login_body(username: &str, action: &str, login_password: &str) -> serde_json::Value {
        serde_json::json!({
            "Login": {
                "Action": action,
                "Username": username,
                "LoginPassword": login_password,
                "Captcha": "",
                "PrivateLogin": "LoginPassword"
            }
        })
    }
}

/// Challenge fields of the first Login response
#[derive(Debug)]
struct ChallengeReply {
    challenge: String,
    public_key: String,
    cookie: String,
}

fn parse_challenge(body: &serde_json::Value) -> Result<ChallengeReply, AuthError> {
    let reply = body
        .get("LoginResponse")
        .ok_or_else(|| AuthError::Protocol("no LoginResponse in reply".to_string()))?;

    let field = |name: &str| -> Result<String, AuthError> {
        reply
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AuthError::Protocol(format!("LoginResponse missing {}", name)))
    };

    Ok(ChallengeReply {
        challenge: field("Challenge")?,
        public_key: field("PublicKey")?,
        cookie: field("Cookie")?,
    })
}

#[async_trait]
impl AuthScheme for HnapScheme {
    fn name(&self) -> &'static str {
        "hnap"
    }

    async fn authenticate(
        &self,
        client: Arc<DeviceClient>,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<AuthenticatedSession, AuthError> {
        let creds = credentials.ok_or_else(|| AuthError::Credentials {
            scheme: "hnap",
            reason: "no credentials supplied for a protected device".to_string(),
        })?;
        let url = self.endpoint_url(base_url);

        tracing::info!("[hnap] Step 1: Requesting challenge from {}", self.endpoint);
        let resp = client
            .post_json_with_headers(
                &url,
                &Self::login_body(&creds.username, "request", ""),
                self.login_headers()?,
            )
            .await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AuthError::Protocol(format!("challenge reply not JSON: {}", e)))?;
        let reply = parse_challenge(&body)?;

        tracing::info!("[hnap] Step 2: Deriving keys ({:?})", self.algorithm);
        let private_key = hmac_hex(
            self.algorithm,
            format!("{}{}", reply.public_key, creds.password).as_bytes(),
            reply.challenge.as_bytes(),
        )?;
        let login_password = hmac_hex(
            self.algorithm,
            private_key.as_bytes(),
            reply.challenge.as_bytes(),
        )?;

        let keys = HnapKeys {
            endpoint: self.endpoint.clone(),
            namespace: self.namespace.clone(),
            algorithm: self.algorithm,
            noop: self.noop,
            private_key,
            cookie: reply.cookie,
        };

        tracing::info!("[hnap] Step 3: Confirming login");
        let resp = client
            .post_json_with_headers(
                &url,
                &Self::login_body(&creds.username, "login", &login_password),
                keys.signed_headers("Login")?,
            )
            .await?;
        let raw = resp
            .text()
            .await
            .map_err(|e| AuthError::Protocol(format!("confirm reply unreadable: {}", e)))?;
        let body: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| AuthError::Protocol(format!("confirm reply not JSON: {}", e)))?;

        let result = body
            .get("LoginResponse")
            .and_then(|r| r.get("LoginResult"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthError::Protocol("confirm reply has no LoginResult".to_string()))?;

        if !result.eq_ignore_ascii_case("success") && !result.eq_ignore_ascii_case("ok") {
            return Err(AuthError::Credentials {
                scheme: "hnap",
                reason: format!("device reported LoginResult '{}'", result),
            });
        }

        tracing::info!("[hnap] Authenticated");
        let mut session = AuthenticatedSession::new(client, base_url, AuthKind::Hnap);
        session.set_hnap(keys);
        session.add_resource(LOGIN_RESOURCE_KEY, raw);
        Ok(session)
    }
}
