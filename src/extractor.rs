//! Domain extraction from heterogeneous blocklist formats.
//!
//! Recognized line shapes, first match wins:
//! - hosts syntax: `127.0.0.1 ads.example.com [# comment]`
//! - bind zone syntax: `zone "ads.example.com" {type master; ...};`
//! - plain syntax: `ads.example.com`
//!
//! Comments (`#`, `//`, `!`) and blank lines are skipped.

use std::net::IpAddr;

use crate::error::ExtractionWarning;
use crate::validation::{is_reserved_name, normalize_domain};

/// Result of extracting domains from one body of content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Normalized domains in line order (not deduplicated)
    pub domains: Vec<String>,
    /// Tokens rejected by normalization
    pub dropped: usize,
    /// Reserved local names skipped (localhost and friends)
    pub reserved: usize,
    /// Lines skipped because they lack the configured prefix
    pub boilerplate: usize,
}

impl Extracted {
    /// Describe why nothing was extracted, if that is the case.
    pub fn warning(&self, content: &[u8], descriptor: &str) -> Option<ExtractionWarning> {
        if !self.domains.is_empty() {
            return None;
        }
        if content.iter().all(u8::is_ascii_whitespace) {
            Some(ExtractionWarning::EmptyBody(descriptor.to_string()))
        } else {
            Some(ExtractionWarning::NoRecognizableLines(descriptor.to_string()))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineShape<'a> {
    Hosts(Vec<&'a str>),
    Zone(&'a str),
    Plain(&'a str),
}

/// Extract domains from raw bytes. Invalid UTF-8 is replaced, not rejected.
pub fn extract_bytes(content: &[u8], prefix: Option<&str>) -> Extracted {
    extract(&String::from_utf8_lossy(content), prefix)
}

/// Extract normalized domains from blocklist text.
///
/// When `prefix` is set, lines that do not start with it exactly (trailing
/// separator included) are treated as boilerplate and skipped; the prefix
/// is stripped from the others.
pub fn extract(content: &str, prefix: Option<&str>) -> Extracted {
    let prefix = prefix.filter(|p| !p.trim().is_empty());
    let mut out = Extracted::default();

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || is_comment(line) {
            continue;
        }

        let body = match prefix {
            Some(p) => match line.strip_prefix(p) {
                Some(rest) => rest,
                None => {
                    out.boilerplate += 1;
                    continue;
                }
            },
            None => line,
        };

        let body = strip_inline_comment(body).trim();
        let Some(shape) = classify(body) else {
            out.dropped += 1;
            continue;
        };

        let names = match shape {
            LineShape::Hosts(names) => names,
            LineShape::Zone(name) | LineShape::Plain(name) => vec![name],
        };

        for name in names {
            if is_reserved_name(name.trim_matches('"')) {
                out.reserved += 1;
                continue;
            }
            match normalize_domain(name) {
                Some(domain) => out.domains.push(domain),
                None => out.dropped += 1,
            }
        }
    }

    out
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("//") || line.starts_with('!')
}

fn strip_inline_comment(body: &str) -> &str {
    match body.find('#') {
        Some(idx) => &body[..idx],
        None => body,
    }
}

fn classify(body: &str) -> Option<LineShape<'_>> {
    let mut tokens = body.split_whitespace();
    let first = tokens.next()?;

    if first.parse::<IpAddr>().is_ok() {
        let names: Vec<&str> = tokens.collect();
        return if names.is_empty() {
            None
        } else {
            Some(LineShape::Hosts(names))
        };
    }

    if first == "zone" {
        let rest = body["zone".len()..].trim_start();
        if let Some(quoted) = rest.strip_prefix('"') {
            return quoted.split('"').next().map(LineShape::Zone);
        }
        return rest.split_whitespace().next().map(LineShape::Zone);
    }

    Some(LineShape::Plain(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE_DATA: &str = r#"
// This bind zone is intended to be included in a running dns server for a local net
// Last updated 2016-03-09

zone "192-168-0-255.com"  {type master; file "/etc/namedb/blockeddomain.hosts";};
zone "asi-37.fr"  {type master; file "/etc/namedb/blockeddomain.hosts";};
zone "byxon.com"  {type master; file "/etc/namedb/blockeddomain.hosts";};
zone "byxon.com"  {type master; file "/etc/namedb/blockeddomain.hosts";};
"#;

    const HOSTS_DATA: &str = "# AdAway default blocklist
#
127.0.0.1  localhost
::1  localhost

# [General]
127.0.0.1 lb.usemaxserver.de
127.0.0.1 tracking.klickthru.com
127.0.0.1 mobile.Banzai.it
127.0.0.1 ad.leadboltapps.net ## another airpush style ad#
0.0.0.0\tgemini.yahoo.com
";

    #[test]
    fn test_extract_zone_syntax() {
        let out = extract(ZONE_DATA, None);
        assert_eq!(
            out.domains,
            vec!["192-168-0-255.com", "asi-37.fr", "byxon.com", "byxon.com"]
        );
    }

    #[test]
    fn test_extract_zone_with_prefix() {
        let out = extract(ZONE_DATA, Some("zone "));
        assert_eq!(out.domains.len(), 4);
        assert_eq!(out.boilerplate, 0);
    }

    #[test]
    fn test_extract_prefix_keeps_separator() {
        let out = extract(
            "zones.example.com\nzone \"a.com\" {type master;};\n",
            Some("zone "),
        );
        assert_eq!(out.domains, vec!["a.com"]);
        assert_eq!(out.boilerplate, 1);
    }

    #[test]
    fn test_extract_prefix_address_not_partially_matched() {
        let out = extract(
            "127.0.0.10 ads.example.com\n127.0.0.1 tracker.example.com\n",
            Some("127.0.0.1 "),
        );
        assert_eq!(out.domains, vec!["tracker.example.com"]);
        assert_eq!(out.boilerplate, 1);
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn test_extract_hosts_syntax() {
        let out = extract(HOSTS_DATA, None);
        assert_eq!(
            out.domains,
            vec![
                "lb.usemaxserver.de",
                "tracking.klickthru.com",
                "mobile.banzai.it",
                "ad.leadboltapps.net",
                "gemini.yahoo.com",
            ]
        );
        assert_eq!(out.reserved, 2);
    }

    #[test]
    fn test_extract_hosts_prefix_filters_boilerplate() {
        let out = extract(HOSTS_DATA, Some("127.0.0.1 "));
        assert_eq!(out.domains.len(), 4);
        assert!(!out.domains.contains(&"gemini.yahoo.com".to_string()));
        // "::1 localhost" and the 0.0.0.0 line lack the prefix
        assert_eq!(out.boilerplate, 2);
    }

    #[test]
    fn test_extract_localhost_and_one_host() {
        let out = extract("127.0.0.1 localhost\n127.0.0.1 beap.gemini.yahoo.com\n", None);
        assert_eq!(out.domains, vec!["beap.gemini.yahoo.com"]);
    }

    #[test]
    fn test_extract_plain_syntax() {
        let out = extract("Ads.Example.com.\n\n! adblock comment\ntracker.example.net\n", None);
        assert_eq!(out.domains, vec!["ads.example.com", "tracker.example.net"]);
    }

    #[test]
    fn test_extract_multiple_host_aliases() {
        let out = extract("0.0.0.0 a.example.com b.example.com\n", None);
        assert_eq!(out.domains, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_extract_drops_invalid_tokens() {
        let out = extract("not_a_domain\nbad..dots.com\n127.0.0.1\nhttp://x.com/path\n", None);
        assert!(out.domains.is_empty());
        assert_eq!(out.dropped, 4);
    }

    #[test]
    fn test_warning_empty_body() {
        let out = extract("", None);
        assert_eq!(
            out.warning(b"", "http://example.com/"),
            Some(ExtractionWarning::EmptyBody("http://example.com/".to_string()))
        );
    }

    #[test]
    fn test_warning_no_recognizable_lines() {
        let content = b"# only comments\n# here\n";
        let out = extract_bytes(content, None);
        assert!(matches!(
            out.warning(content, "list"),
            Some(ExtractionWarning::NoRecognizableLines(_))
        ));
    }

    #[test]
    fn test_warning_none_when_domains_found() {
        let content = b"ads.example.com\n";
        let out = extract_bytes(content, None);
        assert!(out.warning(content, "list").is_none());
    }

    #[test]
    fn test_extract_bytes_invalid_utf8() {
        let content = b"ads.example.com\n\xff\xfe\nother.example.com\n";
        let out = extract_bytes(content, None);
        assert_eq!(out.domains, vec!["ads.example.com", "other.example.com"]);
    }
}
