//! Centralized validation for domain names and redirect addresses.
//!
//! This module provides unified validation for:
//! - Domain tokens extracted from blocklists
//! - Reserved host names that must never be blacklisted
//! - IPv4 redirect addresses

use std::net::Ipv4Addr;

use crate::error::ConfigError;

/// Maximum length of a fully qualified domain name.
pub const MAX_DOMAIN_LEN: usize = 253;

/// Host names found in hosts files that refer to the local machine.
pub const RESERVED_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
    "0.0.0.0",
];

/// Check whether a name is a reserved local host alias.
///
/// # Examples
/// ```
/// use blacklist::validation::is_reserved_name;
/// assert!(is_reserved_name("localhost"));
/// assert!(is_reserved_name("IP6-Loopback"));
/// assert!(!is_reserved_name("ads.example.com"));
/// ```
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Normalize a raw domain token.
///
/// Lower-cases, trims whitespace and surrounding quotes, drops a trailing dot,
/// then validates the result. Returns `None` for tokens that are not usable
/// domain names.
///
/// # Examples
/// ```
/// use blacklist::validation::normalize_domain;
/// assert_eq!(normalize_domain(" Ads.Example.COM. "), Some("ads.example.com".to_string()));
/// assert_eq!(normalize_domain("\"zone.example.net\""), Some("zone.example.net".to_string()));
/// assert_eq!(normalize_domain("not a domain"), None);
/// assert_eq!(normalize_domain(""), None);
/// ```
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('"').trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    let lowered = trimmed.to_ascii_lowercase();
    if is_valid_domain(&lowered) {
        Some(lowered)
    } else {
        None
    }
}

/// Validate an already-normalized domain name.
///
/// Only ASCII alphanumerics, `-`, `_` and `.` are allowed, at least two
/// labels are required and no label may be empty.
///
/// # Examples
/// ```
/// use blacklist::validation::is_valid_domain;
/// assert!(is_valid_domain("ads.example.com"));
/// assert!(is_valid_domain("192-168-0-255.com"));
/// assert!(!is_valid_domain("example"));
/// assert!(!is_valid_domain("bad..example.com"));
/// assert!(!is_valid_domain("white space.com"));
/// ```
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN || !domain.contains('.') {
        return false;
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return false;
    }

    domain.split('.').all(|label| !label.is_empty())
}

/// Parse a `dns-redirect-ip` value.
///
/// # Examples
/// ```
/// use blacklist::validation::validate_redirect_ip;
/// assert!(validate_redirect_ip("0.0.0.0").is_ok());
/// assert!(validate_redirect_ip("192.168.168.1").is_ok());
/// assert!(validate_redirect_ip("::1").is_err());
/// assert!(validate_redirect_ip("256.0.0.1").is_err());
/// ```
pub fn validate_redirect_ip(value: &str) -> Result<Ipv4Addr, ConfigError> {
    value
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| ConfigError::InvalidIp(value.to_string()))
}

/// Return the domain followed by each of its parent domains, most specific first.
///
/// Single-label suffixes (TLDs) are not returned.
///
/// # Examples
/// ```
/// use blacklist::validation::domain_and_parents;
/// let chain: Vec<&str> = domain_and_parents("a.b.example.com").collect();
/// assert_eq!(chain, vec!["a.b.example.com", "b.example.com", "example.com"]);
/// ```
pub fn domain_and_parents(domain: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(domain);
    std::iter::from_fn(move || {
        let current = rest?;
        if !current.contains('.') {
            rest = None;
            return None;
        }
        rest = current.split_once('.').map(|(_, parent)| parent);
        Some(current)
    })
}
