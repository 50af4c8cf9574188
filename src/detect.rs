//! Detection orchestrator and circuit breaker
//!
//! One detection call narrows the catalog to plausible candidates, tries
//! their authentication descriptors strictly in sequence, and confirms the
//! winner with post-auth fingerprinting. The circuit breaker bounds the
//! whole call: a device that looks almost-but-not-quite right produces a
//! classified failure, never an endless retry loop.

use crate::auth;
use crate::catalog::CatalogIndex;
use crate::errors::{AuthError, DetectError};
use crate::hints;
use crate::http::DeviceClient;
use crate::models::{Credentials, ProfileDescriptor};
use crate::parser;
use crate::prefilter;
use crate::session::{AuthKind, AuthenticatedSession};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Attempt and wall-clock budgets for one detection call
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub max_attempts: u32,
    pub max_elapsed: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_elapsed: Duration::from_secs(60),
        }
    }
}

/// Per-invocation attempt/time guard. The broken flag only ever goes one
/// way: once a budget is exceeded, every later `should_continue` answers
/// false for the remainder of this detection call.
pub struct CircuitBreaker {
    config: BreakerConfig,
    attempts: u32,
    started: Instant,
    broken: bool,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            attempts: 0,
            started: Instant::now(),
            broken: false,
        }
    }

    pub fn should_continue(&mut self) -> bool {
        if self.broken {
            return false;
        }
        if self.attempts >= self.config.max_attempts
            || self.started.elapsed() >= self.config.max_elapsed
        {
            self.broken = true;
            tracing::warn!(
                "Circuit breaker tripped: {} attempts, {:?} elapsed",
                self.attempts,
                self.started.elapsed()
            );
            return false;
        }
        true
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn trip_error(&self) -> DetectError {
        DetectError::BreakerTripped {
            attempts: self.attempts,
            elapsed: self.started.elapsed(),
        }
    }
}

/// A confirmed device: the profile that matched and the live session
#[derive(Debug)]
pub struct Detection {
    pub profile: Arc<ProfileDescriptor>,
    pub session: AuthenticatedSession,
}

/// Detection orchestrator over a read-only catalog.
///
/// One `detect` call per device, strictly sequential inside; run separate
/// calls on separate tasks for multiple devices - the catalog is the only
/// shared state and it is read-only.
pub struct Detector<'a> {
    catalog: &'a CatalogIndex,
    breaker: BreakerConfig,
    deadline: Option<Instant>,
    timeout: Duration,
    connect_timeout: Duration,
    probe_timeout: Duration,
}

impl<'a> Detector<'a> {
    pub fn new(catalog: &'a CatalogIndex) -> Self {
        Self {
            catalog,
            breaker: BreakerConfig::default(),
            deadline: None,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(3),
        }
    }

    pub fn with_breaker(mut self, config: BreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    /// Caller deadline. Exceeding it yields `Cancelled`, which is always
    /// distinct from a breaker trip.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeouts(
        mut self,
        timeout: Duration,
        connect_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        self.timeout = timeout;
        self.connect_timeout = connect_timeout;
        self.probe_timeout = probe_timeout;
        self
    }

    /// Identify the device at `base_url` and authenticate against it.
    ///
    /// A cached hint from a previous successful detection is tried before
    /// anything else; otherwise the order is pre-filter ranking refined by
    /// phase-1 hint matches.
    pub async fn detect(
        &self,
        base_url: &str,
        credentials: Option<&Credentials>,
        cached_hint: Option<&str>,
    ) -> Result<Detection, DetectError> {
        let base_url = base_url.trim_end_matches('/');
        let client = Arc::new(
            DeviceClient::with_timeouts(self.timeout, self.connect_timeout, self.probe_timeout)
                .map_err(|e| DetectError::Connection(e.to_string()))?,
        );

        let mut breaker = CircuitBreaker::new(self.breaker.clone());
        let mut tried: Vec<String> = Vec::new();
        let mut credential_rejection: Option<(&'static str, String)> = None;
        let mut last_connection_error: Option<String> = None;
        let mut saw_non_connection = false;

        let mut ordered: Vec<Arc<ProfileDescriptor>> = Vec::new();
        if let Some(hint) = cached_hint {
            match self.catalog.lookup(hint) {
                Some(profile) => {
                    tracing::info!("Trying cached profile hint '{}' first", hint);
                    ordered.push(profile);
                }
                None => tracing::warn!("Cached profile hint '{}' is not in the catalog", hint),
            }
        }

        tracing::info!("Probing {} for branding", base_url);
        let probe_body = client.probe(&format!("{}/", base_url)).await;
        let page_title = probe_body.as_deref().and_then(parser::extract_title);
        if let Some(title) = &page_title {
            tracing::info!("Device page title: '{}'", title);
        }

        let all = self.catalog.list_all();
        if all.is_empty() {
            tracing::warn!("Profile catalog is empty; nothing to try");
        }
        let rest: Vec<Arc<ProfileDescriptor>> = all
            .iter()
            .filter(|p| Some(p.name.as_str()) != cached_hint)
            .cloned()
            .collect();
        let ranked = prefilter::rank_by_likelihood(probe_body.as_deref(), rest);
        ordered.extend(match probe_body.as_deref() {
            Some(body) => reorder_by_hints(ranked, body),
            None => ranked,
        });

        for candidate in &ordered {
            if self.deadline_exceeded() {
                return Err(DetectError::Cancelled);
            }
            if !breaker.should_continue() {
                return Err(breaker.trip_error());
            }
            breaker.record_attempt();
            tried.push(candidate.name.clone());

            let scheme = auth::scheme_for(&candidate.auth);
            tracing::info!(
                "Attempt {}: '{}' via {}",
                breaker.attempts(),
                candidate.name,
                scheme.name()
            );

            let attempt = scheme.authenticate(Arc::clone(&client), base_url, credentials);
            let result = match self.remaining() {
                Some(remaining) => match tokio::time::timeout(remaining, attempt).await {
                    Ok(result) => result,
                    Err(_) => return Err(DetectError::Cancelled),
                },
                None => attempt.await,
            };

            match result {
                Ok(session) => {
                    tracing::info!("'{}' authenticated; confirming", candidate.name);
                    match self.confirm(candidate, session, &all).await {
                        Ok(detection) => return Ok(detection),
                        // The post-auth fetch disproved an optimistic
                        // handshake; treat it like any credential rejection
                        Err(AuthError::Credentials { scheme, reason }) => {
                            saw_non_connection = true;
                            tracing::info!(
                                "'{}' rejected the authenticated fetch: {}",
                                candidate.name,
                                reason
                            );
                            if credential_rejection.is_none() {
                                credential_rejection = Some((scheme, reason));
                            }
                        }
                        Err(err) => {
                            saw_non_connection = true;
                            tracing::debug!("'{}' confirm failed: {}", candidate.name, err);
                        }
                    }
                }
                Err(AuthError::Protocol(msg)) => {
                    // Wrong candidate, not wrong credentials: move on
                    saw_non_connection = true;
                    tracing::debug!("'{}' descriptor mismatch: {}", candidate.name, msg);
                }
                Err(AuthError::Connection(msg)) => {
                    tracing::debug!("'{}' unreachable: {}", candidate.name, msg);
                    last_connection_error = Some(msg);
                }
                Err(AuthError::Credentials { scheme, reason }) => {
                    saw_non_connection = true;
                    tracing::info!("'{}' rejected credentials: {}", candidate.name, reason);
                    if credential_rejection.is_none() {
                        credential_rejection = Some((scheme, reason));
                    }
                }
            }
        }

        if !breaker.should_continue() {
            return Err(breaker.trip_error());
        }
        if let Some((scheme, reason)) = credential_rejection {
            return Err(DetectError::Auth { scheme, reason });
        }
        if !saw_non_connection {
            if let Some(msg) = last_connection_error {
                return Err(DetectError::Connection(msg));
            }
        }
        Err(DetectError::ParserNotFound { tried, page_title })
    }

    /// Phase-2 fingerprinting after a successful handshake: fetch a page
    /// only a session can see and let the more specific evidence win. A
    /// phase-1 candidate may be superseded by a different profile sharing
    /// the same auth strategy, since the established session stays valid
    /// for it.
    async fn confirm(
        &self,
        candidate: &Arc<ProfileDescriptor>,
        mut session: AuthenticatedSession,
        all: &[Arc<ProfileDescriptor>],
    ) -> Result<Detection, AuthError> {
        let fetched = if session.kind() == AuthKind::Hnap {
            let actions: Vec<String> = candidate.pages.data.values().cloned().collect();
            if actions.is_empty() {
                Ok(None)
            } else {
                session
                    .hnap_call_many(&actions)
                    .await
                    .map(|reply| Some(reply.to_string()))
            }
        } else {
            match candidate.pages.post_auth_page() {
                Some(path) => session.fetch_page(path).await.map(Some),
                None => Ok(None),
            }
        };

        let body = match fetched {
            Ok(body) => body,
            // A rejection here disproves the handshake; anything else just
            // means no phase-2 evidence is available
            Err(err @ AuthError::Credentials { .. }) => return Err(err),
            Err(err) => {
                tracing::debug!("Post-auth fetch failed, skipping phase 2: {}", err);
                None
            }
        };

        let confirmed = match body {
            Some(body) => {
                let phase2 = hints::match_post_auth(all, &body);
                let own_evidence = phase2
                    .iter()
                    .find(|m| m.profile == candidate.name)
                    .map(|m| m.matched.len())
                    .unwrap_or(0);
                let better = phase2.iter().find(|m| {
                    m.profile != candidate.name
                        && m.matched.len() > own_evidence
                        && self
                            .catalog
                            .lookup(&m.profile)
                            .map(|p| p.auth.same_strategy(&candidate.auth))
                            .unwrap_or(false)
                });
                match better.and_then(|m| self.catalog.lookup(&m.profile)) {
                    Some(superseding) => {
                        tracing::info!(
                            "Post-auth markers narrow '{}' to '{}'",
                            candidate.name,
                            superseding.name
                        );
                        superseding
                    }
                    None => Arc::clone(candidate),
                }
            }
            None => Arc::clone(candidate),
        };

        tracing::info!("Detected device: '{}'", confirmed.name);
        Ok(Detection {
            profile: confirmed,
            session,
        })
    }

    fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Put phase-1 hint-matched profiles first, in evidence order, without
/// dropping anything: matching is a reorder, never a filter
fn reorder_by_hints(
    ranked: Vec<Arc<ProfileDescriptor>>,
    body: &str,
) -> Vec<Arc<ProfileDescriptor>> {
    let matches = hints::match_pre_auth(&ranked, body);
    if matches.is_empty() {
        return ranked;
    }

    let mut ordered = Vec::with_capacity(ranked.len());
    for m in &matches {
        if let Some(profile) = ranked.iter().find(|p| p.name == m.profile) {
            ordered.push(Arc::clone(profile));
        }
    }
    for profile in ranked {
        if !ordered.iter().any(|p| p.name == profile.name) {
            ordered.push(profile);
        }
    }
    ordered
}
