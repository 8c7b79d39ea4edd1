//! URL scheme bit masks
//!
//! Every pattern carries a mask of the schemes it is allowed to match. The
//! mask is metadata: two patterns with the same text compare equal even when
//! their masks differ.

use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Bit mask of URL schemes a pattern may match
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SchemeMask(u32);

impl SchemeMask {
    pub const NONE: SchemeMask = SchemeMask(0);
    pub const HTTP: SchemeMask = SchemeMask(1 << 0);
    pub const HTTPS: SchemeMask = SchemeMask(1 << 1);
    pub const FILE: SchemeMask = SchemeMask(1 << 2);
    pub const FTP: SchemeMask = SchemeMask(1 << 3);
    pub const CHROME_UI: SchemeMask = SchemeMask(1 << 4);
    pub const EXTENSION: SchemeMask = SchemeMask(1 << 5);
    pub const FILESYSTEM: SchemeMask = SchemeMask(1 << 6);
    pub const WS: SchemeMask = SchemeMask(1 << 7);
    pub const WSS: SchemeMask = SchemeMask(1 << 8);
    pub const DATA: SchemeMask = SchemeMask(1 << 9);
    pub const UUID_IN_PACKAGE: SchemeMask = SchemeMask(1 << 10);
    pub const ALL: SchemeMask = SchemeMask(u32::MAX);

    /// Schemes a content script may run on
    pub const USER_SCRIPT: SchemeMask = SchemeMask(
        Self::HTTP.0 | Self::HTTPS.0 | Self::FILE.0 | Self::FTP.0 | Self::WS.0 | Self::WSS.0,
    );

    /// Schemes a host permission may name
    pub const HOST_PERMISSION: SchemeMask = SchemeMask(Self::USER_SCRIPT.0 | Self::CHROME_UI.0);

    /// Look up the bit for a scheme name
    pub fn from_scheme(scheme: &str) -> Option<SchemeMask> {
        KNOWN_SCHEMES
            .iter()
            .find(|(name, _)| *name == scheme)
            .map(|(_, mask)| *mask)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }

    /// True when every bit of `other` is set here
    pub fn contains(&self, other: SchemeMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when `scheme` is a known scheme allowed by this mask
    pub fn allows(&self, scheme: &str) -> bool {
        match Self::from_scheme(scheme) {
            Some(bit) => self.contains(bit),
            None => false,
        }
    }

    /// Remove `other`'s bits
    pub fn without(&self, other: SchemeMask) -> SchemeMask {
        SchemeMask(self.0 & !other.0)
    }

    /// Known scheme names allowed by this mask, in canonical order
    pub fn scheme_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        KNOWN_SCHEMES
            .iter()
            .filter(move |(_, mask)| self.contains(*mask))
            .map(|(name, _)| *name)
    }
}

impl BitOr for SchemeMask {
    type Output = SchemeMask;

    fn bitor(self, rhs: SchemeMask) -> SchemeMask {
        SchemeMask(self.0 | rhs.0)
    }
}

impl BitAnd for SchemeMask {
    type Output = SchemeMask;

    fn bitand(self, rhs: SchemeMask) -> SchemeMask {
        SchemeMask(self.0 & rhs.0)
    }
}

impl fmt::Debug for SchemeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return write!(f, "SchemeMask(ALL)");
        }
        let names: Vec<&str> = self.scheme_names().collect();
        write!(f, "SchemeMask({})", names.join("|"))
    }
}

pub const CHROME_UI_SCHEME: &str = "chrome";
pub const EXTENSION_SCHEME: &str = "chrome-extension";
pub const FILE_SCHEME: &str = "file";

/// Known schemes and their bits
const KNOWN_SCHEMES: &[(&str, SchemeMask)] = &[
    ("http", SchemeMask::HTTP),
    ("https", SchemeMask::HTTPS),
    (FILE_SCHEME, SchemeMask::FILE),
    ("ftp", SchemeMask::FTP),
    (CHROME_UI_SCHEME, SchemeMask::CHROME_UI),
    (EXTENSION_SCHEME, SchemeMask::EXTENSION),
    ("filesystem", SchemeMask::FILESYSTEM),
    ("ws", SchemeMask::WS),
    ("wss", SchemeMask::WSS),
    ("data", SchemeMask::DATA),
    ("uuid-in-package", SchemeMask::UUID_IN_PACKAGE),
];

/// Schemes written as `scheme:path` instead of `scheme://host/path`
pub(crate) fn uses_short_separator(scheme: &str) -> bool {
    matches!(scheme, "data" | "uuid-in-package")
}

/// Schemes whose patterns may carry a port
pub(crate) fn supports_port(scheme: &str) -> bool {
    matches!(scheme, "*" | "http" | "https" | "ftp" | "ws" | "wss")
}
