//! URL pattern sets
//!
//! An ordered set of patterns keyed by canonical text. Set operations are
//! pure and return new sets.
//!
//! Union keeps the left operand's copy of a pattern present on both sides,
//! so the left side's scheme mask survives. Callers that need a particular
//! mask to win put that set on the left.

use std::collections::btree_set::{self, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};
use url::Url;

use super::origin::SiteOrigin;
use super::scheme::SchemeMask;
use super::url_pattern::UrlPattern;
use crate::core::PermissionResult;

/// How two pattern sets are intersected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionBehavior {
    /// Keep patterns whose text appears in both sets
    StringComparison,
    /// Keep patterns from either side contained by some pattern of the other
    PatternsContainedByBoth,
    /// Keep the most specific overlap of every pattern pair
    Detailed,
}

/// A set of URL patterns
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct UrlPatternSet {
    patterns: BTreeSet<UrlPattern>,
}

impl UrlPatternSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every string with `valid_schemes`
    pub fn parse_all<I, S>(valid_schemes: SchemeMask, patterns: I) -> PermissionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for pattern in patterns {
            set.add_pattern(UrlPattern::parse(valid_schemes, pattern.as_ref())?);
        }
        Ok(set)
    }

    /// Insert a pattern; an equal pattern already present is kept
    pub fn add_pattern(&mut self, pattern: UrlPattern) -> bool {
        self.patterns.insert(pattern)
    }

    /// Insert the `scheme://host/*` pattern for an origin
    pub fn add_origin(&mut self, valid_schemes: SchemeMask, origin: &SiteOrigin) -> PermissionResult<bool> {
        Ok(self.add_pattern(UrlPattern::for_origin(valid_schemes, origin)?))
    }

    pub fn remove_pattern(&mut self, pattern: &UrlPattern) -> bool {
        self.patterns.remove(pattern)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, UrlPattern> {
        self.patterns.iter()
    }

    /// Whether some pattern contains `pattern`
    pub fn contains_pattern(&self, pattern: &UrlPattern) -> bool {
        self.patterns.iter().any(|p| p.contains(pattern))
    }

    /// Whether every pattern of `other` is contained by some pattern here
    pub fn contains(&self, other: &UrlPatternSet) -> bool {
        other.patterns.iter().all(|p| self.contains_pattern(p))
    }

    /// Whether any pattern overlaps any pattern of `other`
    pub fn overlaps(&self, other: &UrlPatternSet) -> bool {
        self.patterns
            .iter()
            .any(|p| other.patterns.iter().any(|q| p.overlaps(q)))
    }

    pub fn matches_url(&self, url: &Url) -> bool {
        self.patterns.iter().any(|p| p.matches_url(url))
    }

    pub fn matches_security_origin(&self, origin: &SiteOrigin) -> bool {
        self.patterns.iter().any(|p| p.matches_security_origin(origin))
    }

    /// Whether any pattern is broad enough to mean "all sites"
    pub fn should_warn_all_hosts(&self) -> bool {
        self.patterns.iter().any(|p| p.matches_effective_tld())
    }

    /// Whether any pattern matches every host
    pub fn matches_all_hosts(&self) -> bool {
        self.patterns
            .iter()
            .any(|p| p.match_all_urls() || (p.match_subdomains() && p.host().is_empty()))
    }

    /// Union of the sets; on equal text the left copy wins
    pub fn union(&self, other: &UrlPatternSet) -> UrlPatternSet {
        let mut result = self.clone();
        for pattern in &other.patterns {
            result.patterns.insert(pattern.clone());
        }
        result
    }

    /// Patterns of `self` whose text is absent from `other`
    pub fn difference(&self, other: &UrlPatternSet) -> UrlPatternSet {
        UrlPatternSet {
            patterns: self.patterns.difference(&other.patterns).cloned().collect(),
        }
    }

    /// Intersection of the sets using `behavior`
    pub fn intersection(&self, other: &UrlPatternSet, behavior: IntersectionBehavior) -> UrlPatternSet {
        let mut result = UrlPatternSet::new();
        match behavior {
            IntersectionBehavior::StringComparison => {
                result.patterns = self.patterns.intersection(&other.patterns).cloned().collect();
            }
            IntersectionBehavior::PatternsContainedByBoth => {
                for pattern in &self.patterns {
                    if other.contains_pattern(pattern) {
                        result.add_pattern(pattern.clone());
                    }
                }
                for pattern in &other.patterns {
                    if self.contains_pattern(pattern) {
                        result.add_pattern(pattern.clone());
                    }
                }
            }
            IntersectionBehavior::Detailed => {
                for pattern in &self.patterns {
                    for candidate in &other.patterns {
                        if let Some(overlap) = pattern.create_intersection(candidate) {
                            result.add_pattern(overlap);
                        }
                    }
                }
            }
        }
        result
    }

    /// Same set with every pattern re-masked, dropping patterns left empty
    pub fn with_valid_schemes(&self, valid_schemes: SchemeMask) -> UrlPatternSet {
        UrlPatternSet {
            patterns: self
                .patterns
                .iter()
                .filter_map(|p| p.with_valid_schemes(valid_schemes))
                .collect(),
        }
    }

    /// Canonical text of every pattern, sorted
    pub fn to_strings(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a UrlPatternSet {
    type Item = &'a UrlPattern;
    type IntoIter = btree_set::Iter<'a, UrlPattern>;

    fn into_iter(self) -> Self::IntoIter {
        self.patterns.iter()
    }
}

impl FromIterator<UrlPattern> for UrlPatternSet {
    fn from_iter<T: IntoIterator<Item = UrlPattern>>(iter: T) -> Self {
        UrlPatternSet {
            patterns: iter.into_iter().collect(),
        }
    }
}

impl Serialize for UrlPatternSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.patterns.iter().map(|p| p.as_str()))
    }
}

impl fmt::Debug for UrlPatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.patterns.iter().map(|p| p.as_str())).finish()
    }
}
