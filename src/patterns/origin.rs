//! Site origins
//!
//! A `SiteOrigin` is the scheme/host/port triple the user site lists are
//! keyed by. Default ports are dropped so `https://a.com` and
//! `https://a.com:443` are the same origin.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::core::{PermissionError, PermissionResult};

/// A tuple origin (scheme, host, non-default port)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiteOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl SiteOrigin {
    /// Take the origin of a parsed URL
    pub fn from_url(url: &Url) -> PermissionResult<Self> {
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PermissionError::InvalidOrigin(url.to_string()))?;

        let port = match (url.port(), default_port(url.scheme())) {
            (Some(port), Some(default)) if port == default => None,
            (port, _) => port,
        };

        Ok(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
        })
    }

    /// Parse a URL string and take its origin
    pub fn parse(input: &str) -> PermissionResult<Self> {
        let url = Url::parse(input)?;
        Self::from_url(&url)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, `None` for the scheme default
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Explicit port, or the scheme's default when it has one
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| default_port(&self.scheme))
    }

    /// The origin as a URL with an empty path
    pub fn to_url(&self) -> PermissionResult<Url> {
        Ok(Url::parse(&format!("{}/", self))?)
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    }
}

impl fmt::Display for SiteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

impl FromStr for SiteOrigin {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SiteOrigin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SiteOrigin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SiteOrigin::parse(&raw).map_err(serde::de::Error::custom)
    }
}
