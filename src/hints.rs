//! Two-phase device fingerprinting
//!
//! Phase 1 matches markers visible on an unauthenticated login page
//! (branding strings, protocol tells like an HNAP namespace). Phase 2
//! matches model-identifying strings that only appear behind a session.
//! Phase 1 alone can be ambiguous - two vendors sharing a protocol share
//! its markers - and is expected to be settled by phase 2 after one of the
//! candidates authenticates.

use crate::models::{HintMatch, MatchPhase, ProfileDescriptor};
use std::sync::Arc;

/// Match pre-authentication markers against an unauthenticated page body
pub fn match_pre_auth(profiles: &[Arc<ProfileDescriptor>], body: &str) -> Vec<HintMatch> {
    match_markers(profiles, body, MatchPhase::Pre)
}

/// Match post-authentication markers (exact model strings and aliases)
/// against an authenticated page body
pub fn match_post_auth(profiles: &[Arc<ProfileDescriptor>], body: &str) -> Vec<HintMatch> {
    match_markers(profiles, body, MatchPhase::Post)
}

fn match_markers(
    profiles: &[Arc<ProfileDescriptor>],
    body: &str,
    phase: MatchPhase,
) -> Vec<HintMatch> {
    let body = body.to_lowercase();
    let mut matches = Vec::new();

    for (rank, profile) in profiles.iter().enumerate() {
        let matched: Vec<String> = markers_for(profile, phase)
            .filter(|marker| !marker.is_empty() && body.contains(&marker.to_lowercase()))
            .cloned()
            .collect();

        if !matched.is_empty() {
            matches.push(HintMatch {
                profile: profile.name.clone(),
                phase,
                matched,
                catalog_rank: rank,
            });
        }
    }

    HintMatch::sort(&mut matches);
    matches
}

fn markers_for(
    profile: &ProfileDescriptor,
    phase: MatchPhase,
) -> Box<dyn Iterator<Item = &String> + '_> {
    match phase {
        MatchPhase::Pre => Box::new(profile.detection.pre_auth.iter()),
        MatchPhase::Post => Box::new(
            profile
                .detection
                .post_auth
                .iter()
                .chain(profile.detection.model_aliases.iter()),
        ),
    }
}
