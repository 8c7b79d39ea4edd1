//! URL patterns and pattern sets
//!
//! This module provides host matching used by every permission check:
//! - `SchemeMask` - Which URL schemes a pattern may match
//! - `UrlPattern` - A single `scheme://host/path` match pattern
//! - `UrlPatternSet` - Set algebra over patterns
//! - `SiteOrigin` - Scheme/host/port origin for the user site lists

pub mod origin;
pub mod pattern_set;
pub mod registry;
pub mod scheme;
pub mod url_pattern;

pub use origin::SiteOrigin;
pub use pattern_set::{IntersectionBehavior, UrlPatternSet};
pub use scheme::SchemeMask;
pub use url_pattern::{UrlPattern, ALL_URLS_PATTERN};
