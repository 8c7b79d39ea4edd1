//! URL match patterns
//!
//! A pattern is `<scheme>://<host><path>` where:
//! - scheme is an explicit scheme or `*` (http and https only)
//! - host is `*`, `*.<domain>` or an exact host, optionally with `:port`
//! - path is a glob where `*` matches any run of characters
//!
//! `<all_urls>` matches every URL whose scheme the pattern's mask allows.
//! Equality, ordering and hashing use the canonical text only; the scheme
//! mask travels along as metadata.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use url::{Host, Url};

use super::origin::SiteOrigin;
use super::registry::is_public_suffix;
use super::scheme::{supports_port, uses_short_separator, SchemeMask, FILE_SCHEME};
use crate::core::{PermissionError, PermissionResult};

/// The pattern matching every URL with a valid scheme
pub const ALL_URLS_PATTERN: &str = "<all_urls>";

const WILDCARD: &str = "*";

/// A parsed URL match pattern
#[derive(Clone)]
pub struct UrlPattern {
    valid_schemes: SchemeMask,
    match_all_urls: bool,
    scheme: String,
    host: String,
    match_subdomains: bool,
    port: String,
    path: String,
    path_matcher: glob::Pattern,
    spec: String,
}

impl UrlPattern {
    /// Parse `pattern`, accepting only schemes in `valid_schemes`
    pub fn parse(valid_schemes: SchemeMask, pattern: &str) -> PermissionResult<Self> {
        let invalid = |reason: &str| PermissionError::invalid_pattern(pattern, reason);
        let trimmed = pattern.trim();

        if trimmed == ALL_URLS_PATTERN {
            return Self::build(valid_schemes, true, WILDCARD, "", true, WILDCARD, "/*");
        }

        let colon = trimmed
            .find(':')
            .ok_or_else(|| invalid("missing scheme separator"))?;
        let scheme = trimmed[..colon].to_ascii_lowercase();
        let mut valid = valid_schemes;
        if scheme == WILDCARD {
            valid = valid & (SchemeMask::HTTP | SchemeMask::HTTPS);
            if valid.is_empty() {
                return Err(invalid("invalid scheme"));
            }
        } else if !valid.allows(&scheme) {
            return Err(invalid("invalid scheme"));
        }

        let rest = &trimmed[colon + 1..];
        if uses_short_separator(&scheme) {
            if !rest.starts_with('/') {
                return Err(invalid("empty path"));
            }
            return Self::build(valid, false, &scheme, "", false, WILDCARD, rest);
        }

        let rest = rest
            .strip_prefix("//")
            .ok_or_else(|| invalid("wrong scheme separator"))?;
        if rest.is_empty() {
            return Err(invalid("empty host"));
        }
        let path_start = rest.find('/').ok_or_else(|| invalid("empty path"))?;
        let (host_and_port, path) = rest.split_at(path_start);

        let (host_part, port_part) = split_port(host_and_port).ok_or_else(|| invalid("invalid host"))?;

        let port = match port_part {
            None => WILDCARD.to_string(),
            Some(_) if scheme == FILE_SCHEME => WILDCARD.to_string(),
            Some(p) if !supports_port(&scheme) => {
                return Err(invalid(&format!("port '{}' not allowed for scheme", p)));
            }
            Some(WILDCARD) => WILDCARD.to_string(),
            Some(p) => match p.parse::<u16>() {
                Ok(_) if p.chars().all(|c| c.is_ascii_digit()) => p.to_string(),
                _ => return Err(invalid("invalid port")),
            },
        };

        let (match_subdomains, host_body) = if host_part == WILDCARD {
            (true, "")
        } else if let Some(body) = host_part.strip_prefix("*.") {
            if body.is_empty() {
                return Err(invalid("empty host"));
            }
            (true, body)
        } else {
            (false, host_part)
        };

        if host_body.contains('*') {
            return Err(invalid("invalid host wildcard"));
        }

        let host = if host_body.is_empty() {
            String::new()
        } else {
            canonicalize_host(host_body).ok_or_else(|| invalid("invalid host"))?
        };

        if host.is_empty() && !match_subdomains && scheme != FILE_SCHEME {
            return Err(invalid("empty host"));
        }

        Self::build(valid, false, &scheme, &host, match_subdomains, &port, path)
    }

    /// The `scheme://host[:port]/*` pattern for an origin
    pub fn for_origin(valid_schemes: SchemeMask, origin: &SiteOrigin) -> PermissionResult<Self> {
        Self::parse(valid_schemes, &format!("{}/*", origin))
    }

    fn build(
        valid_schemes: SchemeMask,
        match_all_urls: bool,
        scheme: &str,
        host: &str,
        match_subdomains: bool,
        port: &str,
        path: &str,
    ) -> PermissionResult<Self> {
        let spec = if match_all_urls {
            ALL_URLS_PATTERN.to_string()
        } else {
            let mut spec = String::from(scheme);
            spec.push_str(if uses_short_separator(scheme) { ":" } else { "://" });
            if match_subdomains {
                spec.push('*');
                if !host.is_empty() {
                    spec.push('.');
                }
            }
            spec.push_str(host);
            if port != WILDCARD {
                spec.push(':');
                spec.push_str(port);
            }
            spec.push_str(path);
            spec
        };

        Ok(Self {
            valid_schemes,
            match_all_urls,
            scheme: scheme.to_string(),
            host: host.to_string(),
            match_subdomains,
            port: port.to_string(),
            path: path.to_string(),
            path_matcher: compile_path(&spec, path)?,
            spec,
        })
    }

    pub fn valid_schemes(&self) -> SchemeMask {
        self.valid_schemes
    }

    pub fn match_all_urls(&self) -> bool {
        self.match_all_urls
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn match_subdomains(&self) -> bool {
        self.match_subdomains
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Canonical text form
    pub fn as_str(&self) -> &str {
        &self.spec
    }

    /// Same pattern with a different scheme mask, `None` if nothing remains
    pub fn with_valid_schemes(&self, valid_schemes: SchemeMask) -> Option<Self> {
        let mut copy = self.clone();
        copy.valid_schemes = if self.scheme == WILDCARD && !self.match_all_urls {
            valid_schemes & (SchemeMask::HTTP | SchemeMask::HTTPS)
        } else {
            valid_schemes
        };

        if copy.valid_schemes.is_empty() {
            return None;
        }
        if !self.match_all_urls && self.scheme != WILDCARD && !copy.valid_schemes.allows(&self.scheme) {
            return None;
        }
        Some(copy)
    }

    /// Whether `scheme` is matched
    pub fn matches_scheme(&self, scheme: &str) -> bool {
        if !self.valid_schemes.allows(scheme) {
            return false;
        }
        self.scheme == WILDCARD || self.scheme == scheme
    }

    /// Whether `host` is matched, honoring subdomain wildcards
    pub fn matches_host(&self, host: &str) -> bool {
        let test = host.trim_end_matches('.').to_ascii_lowercase();
        if test == self.host {
            return true;
        }
        if !self.match_subdomains {
            return false;
        }
        if self.host.is_empty() {
            return true;
        }
        if test.starts_with('[') || test.parse::<IpAddr>().is_ok() {
            return false;
        }
        test.len() > self.host.len()
            && test.ends_with(&self.host)
            && test[..test.len() - self.host.len()].ends_with('.')
    }

    fn matches_port(&self, port: Option<u16>) -> bool {
        if self.port == WILDCARD {
            return true;
        }
        port.is_some_and(|p| p.to_string() == self.port)
    }

    fn matches_port_pattern(&self, port: &str) -> bool {
        self.port == WILDCARD || self.port == port
    }

    /// Whether `test` is matched by the path glob
    ///
    /// `/foo/*` also matches `/foo`.
    pub fn matches_path(&self, test: &str) -> bool {
        if self.path_matcher.matches(test) {
            return true;
        }
        self.path.ends_with("/*") && !test.ends_with('/') && self.path_matcher.matches(&format!("{}/", test))
    }

    /// Whether the URL is matched
    pub fn matches_url(&self, url: &Url) -> bool {
        if !self.matches_scheme(url.scheme()) {
            return false;
        }
        if self.match_all_urls {
            return true;
        }
        if !self.matches_host(url.host_str().unwrap_or("")) {
            return false;
        }
        if !self.matches_port(url.port_or_known_default()) {
            return false;
        }
        match url.query() {
            Some(query) => self.matches_path(&format!("{}?{}", url.path(), query)),
            None => self.matches_path(url.path()),
        }
    }

    /// Whether the origin is matched; the path is ignored
    pub fn matches_security_origin(&self, origin: &SiteOrigin) -> bool {
        if !self.matches_scheme(origin.scheme()) {
            return false;
        }
        if self.match_all_urls {
            return true;
        }
        self.matches_host(origin.host()) && self.matches_port(origin.effective_port())
    }

    /// Whether this pattern can only match URLs of one origin
    pub fn matches_single_origin(&self) -> bool {
        !self.match_all_urls && self.scheme != WILDCARD && !self.match_subdomains
    }

    /// Whether the host wildcard is broad enough to mean "all sites"
    ///
    /// True for `<all_urls>`, any `*` host and wildcards sitting directly on a
    /// public suffix such as `*.com` or `*.co.uk`.
    pub fn matches_effective_tld(&self) -> bool {
        if self.match_all_urls || (self.match_subdomains && self.host.is_empty()) {
            return true;
        }
        self.match_subdomains && is_public_suffix(&self.host)
    }

    /// Schemes this pattern matches, listed individually
    pub fn explicit_schemes(&self) -> Vec<&str> {
        if !self.match_all_urls && self.scheme != WILDCARD {
            return vec![self.scheme.as_str()];
        }
        self.valid_schemes
            .scheme_names()
            .filter(|s| self.matches_scheme(s))
            .collect()
    }

    /// Whether every URL matched by `other` is matched here
    pub fn contains(&self, other: &UrlPattern) -> bool {
        if self.match_all_urls && self.valid_schemes.contains(other.valid_schemes) {
            return true;
        }
        other.explicit_schemes().iter().all(|s| self.matches_scheme(s))
            && self.matches_host(&other.host)
            && (!other.match_subdomains || self.match_subdomains)
            && self.matches_port_pattern(&other.port)
            && self.matches_path(&other.path)
    }

    /// Whether some URL could be matched by both patterns
    pub fn overlaps(&self, other: &UrlPattern) -> bool {
        if self.match_all_urls || other.match_all_urls {
            return true;
        }
        let schemes = other.explicit_schemes().iter().any(|s| self.matches_scheme(s))
            || self.explicit_schemes().iter().any(|s| other.matches_scheme(s));
        let hosts = self.matches_host(&other.host) || other.matches_host(&self.host);
        let ports = self.matches_port_pattern(&other.port) || other.matches_port_pattern(&self.port);
        let paths = self.matches_path(other.path.trim_end_matches('*'))
            || other.matches_path(self.path.trim_end_matches('*'));
        schemes && hosts && ports && paths
    }

    /// The pattern matching exactly what both patterns match, when one exists
    ///
    /// Paths are intersected on a best-effort basis: `/*a*` and `/*b*`
    /// technically overlap but yield no intersection.
    pub fn create_intersection(&self, other: &UrlPattern) -> Option<UrlPattern> {
        let schemes = if self.valid_schemes.is_all() {
            other.valid_schemes
        } else if other.valid_schemes.is_all() {
            self.valid_schemes
        } else {
            self.valid_schemes & other.valid_schemes
        };
        if schemes.is_empty() {
            return None;
        }

        if self.contains(other) {
            return other.with_valid_schemes(schemes);
        }
        if other.contains(self) {
            return self.with_valid_schemes(schemes);
        }

        let scheme = if self.scheme == other.scheme || other.scheme == WILDCARD {
            self.scheme.as_str()
        } else if self.scheme == WILDCARD {
            other.scheme.as_str()
        } else {
            return None;
        };
        let host = if self.matches_host(&other.host) {
            other.host.as_str()
        } else if other.matches_host(&self.host) {
            self.host.as_str()
        } else {
            return None;
        };
        let port = if self.matches_port_pattern(&other.port) {
            other.port.as_str()
        } else if other.matches_port_pattern(&self.port) {
            self.port.as_str()
        } else {
            return None;
        };
        let path = if self.matches_path(&other.path) {
            other.path.as_str()
        } else if other.matches_path(&self.path) {
            self.path.as_str()
        } else {
            return None;
        };

        let match_subdomains = self.match_subdomains && other.match_subdomains;
        Self::build(schemes, false, scheme, host, match_subdomains, port, path)
            .ok()
            .and_then(|p| p.with_valid_schemes(schemes))
    }
}

/// Split `host[:port]`, handling bracketed IPv6 literals
fn split_port(host_and_port: &str) -> Option<(&str, Option<&str>)> {
    if host_and_port.starts_with('[') {
        let end = host_and_port.find(']')?;
        let (host, rest) = host_and_port.split_at(end + 1);
        return match rest {
            "" => Some((host, None)),
            _ => rest.strip_prefix(':').map(|port| (host, Some(port))),
        };
    }
    Some(match host_and_port.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (host_and_port, None),
    })
}

/// Lowercase, IDNA-encode and strip the trailing dot of a host
fn canonicalize_host(host: &str) -> Option<String> {
    let host = host.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }
    Host::parse(host).ok().map(|parsed| parsed.to_string())
}

/// Compile a path glob where only `*` and `?` are wildcards
fn compile_path(spec: &str, path: &str) -> PermissionResult<glob::Pattern> {
    let mut escaped = String::with_capacity(path.len());
    let mut previous_star = false;
    for c in path.chars() {
        match c {
            '*' if previous_star => continue,
            '[' => escaped.push_str("[[]"),
            ']' => escaped.push_str("[]]"),
            _ => escaped.push(c),
        }
        previous_star = c == '*';
    }
    glob::Pattern::new(&escaped).map_err(|e| PermissionError::invalid_pattern(spec, e.msg))
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

impl Eq for UrlPattern {}

impl PartialOrd for UrlPattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UrlPattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.spec.cmp(&other.spec)
    }
}

impl Hash for UrlPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.spec.hash(state);
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

impl fmt::Debug for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlPattern")
            .field("spec", &self.spec)
            .field("valid_schemes", &self.valid_schemes)
            .finish()
    }
}
