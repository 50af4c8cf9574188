//! Heuristic pre-filter over catalog profiles
//!
//! One unauthenticated page fetch is enough to put the plausible profiles
//! at the front of the candidate list. This is strictly a reorder: nothing
//! is ever eliminated, so a wrong guess only costs round-trips, not a
//! missed device.

use crate::models::ProfileDescriptor;
use crate::parser;
use std::sync::Arc;

/// How much of the body (beyond the title) counts for manufacturer matching
const HEAD_WINDOW: usize = 1000;

/// Reorder `profiles` so "likely" candidates come first.
///
/// `body` is the unauthenticated root page; `None` means the probe fetch
/// failed, in which case the input order is returned untouched so the
/// caller can still try everything.
pub fn rank_by_likelihood(
    body: Option<&str>,
    profiles: Vec<Arc<ProfileDescriptor>>,
) -> Vec<Arc<ProfileDescriptor>> {
    let body = match body {
        Some(body) => body.to_lowercase(),
        None => return profiles,
    };

    let title = parser::extract_title(&body).unwrap_or_default();
    let head_end = body
        .char_indices()
        .nth(HEAD_WINDOW)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    let head = &body[..head_end];

    let (likely, unlikely): (Vec<_>, Vec<_>) =
        profiles.into_iter().partition(|p| is_likely(p, &body, &title, head));

    if !likely.is_empty() {
        tracing::debug!(
            "Pre-filter: {} likely, {} unlikely",
            likely.len(),
            unlikely.len()
        );
    }

    let mut ranked = likely;
    ranked.extend(unlikely);
    ranked
}

fn is_likely(profile: &ProfileDescriptor, body: &str, title: &str, head: &str) -> bool {
    let manufacturer = profile.manufacturer.trim().to_lowercase();
    if !manufacturer.is_empty()
        && !manufacturer.eq_ignore_ascii_case("unknown")
        && (title.contains(&manufacturer) || head.contains(&manufacturer))
    {
        return true;
    }

    profile
        .detection
        .model_aliases
        .iter()
        .any(|alias| body.contains(&alias.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthDescriptor, DeviceStatus, DetectionHints};

    fn profile(name: &str, manufacturer: &str, aliases: &[&str]) -> Arc<ProfileDescriptor> {
        Arc::new(ProfileDescriptor {
            name: name.to_string(),
            manufacturer: manufacturer.to_string(),
            model: name.to_string(),
            status: DeviceStatus::Released,
            capabilities: Default::default(),
            pages: Default::default(),
            auth: AuthDescriptor::None,
            detection: DetectionHints {
                model_aliases: aliases.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        })
    }

    #[test]
    fn test_manufacturer_in_title_ranks_first() {
        let profiles = vec![
            profile("Netgear CM1000", "Netgear", &[]),
            profile("ARRIS SB6183", "ARRIS", &[]),
        ];
        let body = "<html><title>ARRIS Residential Gateway</title><body></body></html>";
        let ranked = rank_by_likelihood(Some(body), profiles);
        assert_eq!(ranked[0].name, "ARRIS SB6183");
        assert_eq!(ranked[1].name, "Netgear CM1000");
    }

    #[test]
    fn test_alias_matches_anywhere_in_body() {
        let filler = "x".repeat(3000);
        let body = format!("<html><title>Login</title><body>{}model MB8600 here</body></html>", filler);
        let profiles = vec![
            profile("ARRIS SB6183", "ARRIS", &[]),
            profile("Motorola MB8600", "Motorola", &["MB8600"]),
        ];
        let ranked = rank_by_likelihood(Some(&body), profiles);
        assert_eq!(ranked[0].name, "Motorola MB8600");
    }

    #[test]
    fn test_manufacturer_deep_in_body_is_not_likely() {
        let filler = "x".repeat(3000);
        let body = format!("<html><title>Login</title><body>{}netgear</body></html>", filler);
        let profiles = vec![
            profile("Netgear CM1000", "Netgear", &[]),
            profile("ARRIS SB6183", "ARRIS", &[]),
        ];
        let ranked = rank_by_likelihood(Some(&body), profiles);
        // Neither matched: original order preserved
        assert_eq!(ranked[0].name, "Netgear CM1000");
        assert_eq!(ranked[1].name, "ARRIS SB6183");
    }

    #[test]
    fn test_failed_probe_returns_full_input_unchanged() {
        let profiles = vec![
            profile("Netgear CM1000", "Netgear", &[]),
            profile("ARRIS SB6183", "ARRIS", &[]),
        ];
        let ranked = rank_by_likelihood(None, profiles);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name, "Netgear CM1000");
    }

    #[test]
    fn test_reorder_never_filters() {
        let profiles = vec![
            profile("A", "VendorA", &[]),
            profile("B", "VendorB", &[]),
            profile("C", "VendorC", &[]),
        ];
        let ranked = rank_by_likelihood(Some("<title>vendorb</title>"), profiles);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].name, "B");
    }
}
