//! Data models for device profiles and detection results

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Login credentials supplied by the caller
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Lifecycle status of a device profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    InDevelopment,
    Released,
    Verified,
    Unsupported,
}

/// Password encoding used by form-based logins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordEncoding {
    Plain,
    Base64,
}

/// HMAC algorithm for the HNAP handshake.
///
/// Varies by firmware and is never auto-detected: the wrong algorithm
/// produces a handshake that looks fine and fails later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HmacAlgorithm {
    Md5,
    Sha256,
}

/// Shape of the "no-op" slot in batched HNAP requests.
///
/// Some firmwares want `""`, others `{}`. Sending the wrong one makes the
/// server silently drop that section from an otherwise-200 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoopShape {
    EmptyString,
    EmptyObject,
}

/// How a device expects to be authenticated. Exactly one variant applies
/// per profile; nothing outside the active variant is ever read.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AuthDescriptor {
    None,
    Basic,
    Form {
        path: String,
        #[serde(default = "default_form_method")]
        method: String,
        username_field: String,
        password_field: String,
        #[serde(default = "default_password_encoding")]
        password_encoding: PasswordEncoding,
        #[serde(default)]
        hidden: BTreeMap<String, String>,
        #[serde(default)]
        success_marker: Option<String>,
        #[serde(default)]
        logout_path: Option<String>,
    },
    Hnap {
        #[serde(default = "default_hnap_endpoint")]
        endpoint: String,
        #[serde(default = "default_hnap_namespace")]
        namespace: String,
        hmac: HmacAlgorithm,
        #[serde(default = "default_noop_shape")]
        noop: NoopShape,
    },
    UrlToken {
        login_path: String,
        data_path: String,
        link_prefix: String,
        token_prefix: String,
        cookie_name: String,
        #[serde(default)]
        success_marker: Option<String>,
    },
}

fn default_form_method() -> String {
    "POST".to_string()
}

fn default_password_encoding() -> PasswordEncoding {
    PasswordEncoding::Plain
}

fn default_hnap_endpoint() -> String {
    "/HNAP1/".to_string()
}

fn default_hnap_namespace() -> String {
    "http://purenetworks.com/HNAP1/".to_string()
}

fn default_noop_shape() -> NoopShape {
    NoopShape::EmptyString
}

impl AuthDescriptor {
    /// Short name of the active variant, for logs and error messages
    pub fn strategy_name(&self) -> &'static str {
        match self {
            AuthDescriptor::None => "none",
            AuthDescriptor::Basic => "basic",
            AuthDescriptor::Form { .. } => "form",
            AuthDescriptor::Hnap { .. } => "hnap",
            AuthDescriptor::UrlToken { .. } => "url_token",
        }
    }

    /// Whether two descriptors use the same strategy variant
    pub fn same_strategy(&self, other: &AuthDescriptor) -> bool {
        self.strategy_name() == other.strategy_name()
    }
}

/// Pages a profile knows how to reach
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMap {
    #[serde(default)]
    pub public: Vec<String>,
    #[serde(default)]
    pub protected: Vec<String>,
    /// capability tag -> page path holding that capability's readings
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl PageMap {
    /// The page most likely to carry model-identifying content after login
    pub fn post_auth_page(&self) -> Option<&str> {
        self.protected
            .first()
            .map(String::as_str)
            .or_else(|| self.data.values().next().map(String::as_str))
            .or_else(|| self.public.first().map(String::as_str))
    }
}

/// Marker strings used to fingerprint a device
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectionHints {
    /// Visible on the login page without a session (branding, protocol tells)
    #[serde(default)]
    pub pre_auth: Vec<String>,
    /// Visible only behind authentication (exact model strings)
    #[serde(default)]
    pub post_auth: Vec<String>,
    #[serde(default)]
    pub model_aliases: Vec<String>,
}

/// Everything the engine knows about one device model
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDescriptor {
    #[serde(default)]
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub status: DeviceStatus,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub pages: PageMap,
    pub auth: AuthDescriptor,
    #[serde(default)]
    pub detection: DetectionHints,
}

impl ProfileDescriptor {
    /// True for catch-all profiles that should rank after specific models
    pub fn is_generic(&self) -> bool {
        self.name.to_lowercase().contains("generic")
    }
}

/// Which fingerprinting phase produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Markers readable without a session
    Pre,
    /// Markers readable only after authentication
    Post,
}

/// One fingerprinting finding: a profile plus the evidence for it
#[derive(Debug, Clone)]
pub struct HintMatch {
    pub profile: String,
    pub phase: MatchPhase,
    pub matched: Vec<String>,
    /// Position of the profile in catalog order, used as the tie-break
    pub catalog_rank: usize,
}

impl HintMatch {
    /// More evidence first; catalog order decides ties.
    ///
    /// Markers are unweighted: a generic manufacturer string counts the
    /// same as an exact model number. Known limitation until the catalog
    /// format grows a marker-strength field.
    pub fn sort(matches: &mut [HintMatch]) {
        matches.sort_by(|a, b| {
            b.matched
                .len()
                .cmp(&a.matched.len())
                .then(a.catalog_rank.cmp(&b.catalog_rank))
        });
    }
}
