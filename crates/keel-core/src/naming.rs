//! Name derivation for cluster objects

use once_cell::sync::Lazy;
use regex::Regex;

static INVALID_SUBDOMAIN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9._-]+").expect("static regex"));

/// Maximum length of a DNS subdomain name
pub const MAX_SUBDOMAIN_LEN: usize = 253;

/// Convert an arbitrary string into a DNS-subdomain-safe name.
///
/// Lowercases the input, collapses every run of disallowed characters into a
/// single `-`, and trims separators from both ends.
pub fn to_rfc1123_subdomain(input: &str) -> String {
    let lowered = input.to_lowercase();
    let replaced = INVALID_SUBDOMAIN_CHARS.replace_all(&lowered, "-");
    let mut name: String = replaced
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string();

    if name.len() > MAX_SUBDOMAIN_LEN {
        name.truncate(MAX_SUBDOMAIN_LEN);
        name = name
            .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_string();
    }
    name
}

/// Name of the resource tracker owning a feature's objects.
///
/// The joined name is sanitised as a whole, so it is always a valid,
/// length-capped subdomain. A feature name with nothing left after
/// sanitising adds nothing to the namespace part; builders reject those.
pub fn tracker_name(app_namespace: &str, feature: &str) -> String {
    to_rfc1123_subdomain(&format!("{}-{}", app_namespace, feature))
}
