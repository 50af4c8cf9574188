//! HTML scraping utilities for device pages

use anyhow::{anyhow, Result};
use regex::Regex;

/// Extract the page title, trimmed, if the page has one
pub fn extract_title(html: &str) -> Option<String> {
    let re = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
    re.captures(html)?
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract the action URL of the first form on a login page.
///
/// Some devices embed a one-time token in the action URL, so the configured
/// login path cannot always be trusted over what the page actually says.
pub fn extract_form_action(html: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)<form[^>]*action=["']([^"']+)["']"#).ok()?;
    re.captures(html)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Extract the value of a named hidden input from form HTML
pub fn extract_input_value(html: &str, name: &str) -> Option<String> {
    // Try: <input ... name="xxx" ... value="yyy" ...>
    let pattern1 = format!(
        r#"<input[^>]*name=["']{}["'][^>]*value=["']([^"']*)["']"#,
        regex::escape(name)
    );
    if let Some(caps) = Regex::new(&pattern1).ok()?.captures(html) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    // Try reverse: <input ... value="yyy" ... name="xxx" ...>
    let pattern2 = format!(
        r#"<input[^>]*value=["']([^"']*)["'][^>]*name=["']{}["']"#,
        regex::escape(name)
    );
    Regex::new(&pattern2)
        .ok()?
        .captures(html)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Extract a named value from inline script or attribute soup, matching
/// `key = "value"`, `key: "value"`, and quoted-key variants
pub fn extract_value(html: &str, key: &str) -> Option<String> {
    let pattern = format!(
        r#"["']?{}["']?\s*[:=]\s*["']([^"']+)["']"#,
        regex::escape(key)
    );
    Regex::new(&pattern)
        .ok()?
        .captures(html)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Extract a session token appearing directly after a known URL prefix,
/// e.g. `/goform/Docsis_system?id=<token>` with prefix `?id=`
pub fn extract_url_token(html: &str, prefix: &str) -> Result<String> {
    let pattern = format!(r#"{}([A-Za-z0-9_\-]+)"#, regex::escape(prefix));
    Regex::new(&pattern)?
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| anyhow!("no token after prefix '{}'", prefix))
}
