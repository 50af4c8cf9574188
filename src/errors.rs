//! Error taxonomy for detection and authentication

use std::time::Duration;
use thiserror::Error;

/// Failure of a single authentication attempt against one candidate profile
#[derive(Error, Debug)]
pub enum AuthError {
    /// Device unreachable: timeout, refused, TLS failure. Retryable on a
    /// later poll cycle, never within the same detection call.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The exchange completed and the device rejected the credentials
    #[error("{scheme} login rejected: {reason}")]
    Credentials { scheme: &'static str, reason: String },

    /// The response shape didn't match the attempted descriptor. This means
    /// "wrong candidate", not "wrong password" - the orchestrator moves on
    /// to the next profile.
    #[error("protocol mismatch: {0}")]
    Protocol(String),
}

impl AuthError {
    pub fn is_connection(&self) -> bool {
        matches!(self, AuthError::Connection(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, AuthError::Protocol(_))
    }
}

/// Terminal outcome of a full detection call
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("device unreachable: {0}")]
    Connection(String),

    #[error("{scheme} authentication rejected: {reason}")]
    Auth { scheme: &'static str, reason: String },

    /// No candidate profile produced an authenticated session
    #[error("no matching device profile ({} candidates tried)", tried.len())]
    ParserNotFound {
        tried: Vec<String>,
        page_title: Option<String>,
    },

    /// Attempt or time budget exceeded mid-candidate-list
    #[error("detection budget exceeded: {attempts} attempts in {elapsed:?}")]
    BreakerTripped { attempts: u32, elapsed: Duration },

    /// The caller's deadline expired. Distinct from a breaker trip so
    /// "caller gave up" and "we gave up" stay distinguishable.
    #[error("detection cancelled by caller deadline")]
    Cancelled,
}

impl DetectError {
    /// Ordered, user-facing troubleshooting steps for this failure.
    ///
    /// The setup layer renders these instead of a stack trace.
    pub fn troubleshooting(&self) -> Vec<String> {
        match self {
            DetectError::Connection(_) => vec![
                "Check that the modem is powered on and its IP is correct (usually 192.168.100.1)."
                    .to_string(),
                "Verify this machine can reach the modem subnet (no VPN or VLAN in the way)."
                    .to_string(),
                "Some modems pause their web interface while provisioning; wait a minute and retry."
                    .to_string(),
            ],
            DetectError::Auth { scheme, .. } => {
                let mut steps = Vec::new();
                match *scheme {
                    "basic" => {
                        steps.push(
                            "Try the factory defaults for this vendor, commonly admin/password."
                                .to_string(),
                        );
                    }
                    "form" | "hnap" => {
                        steps.push(
                            "Verify the username and password, often printed on the modem label."
                                .to_string(),
                        );
                        steps.push(
                            "If the password was changed in the modem UI, use the changed one here."
                                .to_string(),
                        );
                    }
                    _ => {
                        steps.push("Verify the configured credentials.".to_string());
                    }
                }
                steps.push(
                    "Too many failed logins can lock the interface; power-cycle the modem to clear it."
                        .to_string(),
                );
                steps
            }
            DetectError::ParserNotFound { tried, page_title } => {
                let mut steps = vec![
                    "This device model is not in the profile catalog yet.".to_string(),
                    format!("Profiles tried: {}.", tried.join(", ")),
                ];
                if let Some(title) = page_title {
                    steps.push(format!(
                        "Device page title was '{}'; include it when reporting a new model.",
                        title
                    ));
                }
                steps
            }
            DetectError::BreakerTripped { attempts, elapsed } => vec![
                format!(
                    "Gave up after {} attempts over {:.0?} to avoid hammering the device.",
                    attempts, elapsed
                ),
                "The modem may be rate-limiting logins; wait a few minutes before retrying."
                    .to_string(),
                "If this repeats, the device likely needs a profile not yet in the catalog."
                    .to_string(),
            ],
            DetectError::Cancelled => vec![
                "Detection was cancelled before completing; rerun with a longer deadline."
                    .to_string(),
            ],
        }
    }
}
