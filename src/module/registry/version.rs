//! Semantic version matching
//!
//! Parses `major.minor.patch` versions and the dependency range forms used in
//! manifests: `*`, `latest`, `^x.y.z`, `~x.y.z`, `>=x.y.z` and exact `x.y.z`.
//! Anything unparsable fails closed.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Parsed `major.minor.patch` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading `X.Y.Z` of a version string.
    ///
    /// Trailing text after the triple (`1.2.3-beta`, `1.2.3+build`) is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut parts = s.splitn(3, '.');
        let major = parse_component(parts.next()?, false)?;
        let minor = parse_component(parts.next()?, false)?;
        let patch = parse_component(parts.next()?, true)?;
        Some(Self::new(major, minor, patch))
    }
}

/// Parse a numeric component; the last one may carry a non-digit suffix.
fn parse_component(part: &str, allow_suffix: bool) -> Option<u64> {
    let digits_end = part
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(part.len());
    if digits_end == 0 || (!allow_suffix && digits_end != part.len()) {
        return None;
    }
    part[..digits_end].parse().ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A `name@range` dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,
    pub range: String,
}

impl DependencySpec {
    /// Split a dependency string into name and range.
    ///
    /// A leading `@` belongs to the name (scoped names); the range starts
    /// after the next `@`. Without one the range is `*`.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        let search_from = usize::from(spec.starts_with('@'));
        match spec[search_from..].find('@') {
            Some(offset) => {
                let at = search_from + offset;
                let range = spec[at + 1..].trim();
                Self {
                    name: spec[..at].trim().to_string(),
                    range: if range.is_empty() {
                        "*".to_string()
                    } else {
                        range.to_string()
                    },
                }
            }
            None => Self {
                name: spec.to_string(),
                range: "*".to_string(),
            },
        }
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.range)
    }
}

/// Parsed dependency range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRange {
    Any,
    Caret(Version),
    Tilde(Version),
    AtLeast(Version),
    Exact(Version),
}

impl VersionRange {
    pub fn parse(range: &str) -> Option<Self> {
        let range = range.trim();
        if range == "*" || range == "latest" {
            return Some(VersionRange::Any);
        }
        if let Some(rest) = range.strip_prefix(">=") {
            return Version::parse(rest).map(VersionRange::AtLeast);
        }
        if let Some(rest) = range.strip_prefix('^') {
            return Version::parse(rest).map(VersionRange::Caret);
        }
        if let Some(rest) = range.strip_prefix('~') {
            return Version::parse(rest).map(VersionRange::Tilde);
        }
        Version::parse(range).map(VersionRange::Exact)
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionRange::Any => true,
            VersionRange::Caret(base) => {
                if version.major != base.major {
                    return false;
                }
                if base.major == 0 {
                    // 0.x: every minor bump is breaking
                    version.minor == base.minor && version.patch >= base.patch
                } else {
                    version.minor > base.minor
                        || (version.minor == base.minor && version.patch >= base.patch)
                }
            }
            VersionRange::Tilde(base) => {
                version.major == base.major
                    && version.minor == base.minor
                    && version.patch >= base.patch
            }
            VersionRange::AtLeast(base) => version.cmp(base) != Ordering::Less,
            VersionRange::Exact(base) => version == base,
        }
    }
}

/// Check whether `version` satisfies `range`.
pub fn satisfies_range(version: &str, range: &str) -> bool {
    let Some(range) = VersionRange::parse(range) else {
        return false;
    };
    if range == VersionRange::Any {
        return true;
    }
    match Version::parse(version) {
        Some(v) => range.matches(&v),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(Version::parse("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(Version::parse("10.0.7-beta.1"), Some(Version::new(10, 0, 7)));
        assert_eq!(Version::parse("1.2"), None);
        assert_eq!(Version::parse("v1.2.3"), None);
        assert_eq!(Version::parse("1.x.3"), None);
        assert_eq!(Version::parse(""), None);
    }

    #[test]
    fn test_parse_dependency() {
        assert_eq!(
            DependencySpec::parse("auth@^1.0.0"),
            DependencySpec {
                name: "auth".into(),
                range: "^1.0.0".into()
            }
        );
        assert_eq!(DependencySpec::parse("auth").range, "*");
        let scoped = DependencySpec::parse("@acme/auth@~2.1.0");
        assert_eq!(scoped.name, "@acme/auth");
        assert_eq!(scoped.range, "~2.1.0");
        assert_eq!(DependencySpec::parse("@acme/auth").range, "*");
    }

    #[test]
    fn test_wildcards() {
        assert!(satisfies_range("0.0.1", "*"));
        assert!(satisfies_range("9.9.9", "latest"));
        assert!(satisfies_range("garbage", "*"));
    }

    #[test]
    fn test_caret() {
        assert!(satisfies_range("1.0.0", "^1.0.0"));
        assert!(satisfies_range("1.4.0", "^1.2.3"));
        assert!(satisfies_range("1.2.5", "^1.2.3"));
        assert!(!satisfies_range("1.2.2", "^1.2.3"));
        assert!(!satisfies_range("2.0.0", "^1.2.3"));
        assert!(!satisfies_range("0.5.0", "^1.0.0"));
    }

    #[test]
    fn test_caret_zero_major() {
        assert!(satisfies_range("0.3.4", "^0.3.1"));
        assert!(!satisfies_range("0.4.0", "^0.3.1"));
        assert!(!satisfies_range("0.3.0", "^0.3.1"));
    }

    #[test]
    fn test_tilde_and_at_least() {
        assert!(satisfies_range("1.2.9", "~1.2.3"));
        assert!(!satisfies_range("1.3.0", "~1.2.3"));
        assert!(satisfies_range("3.0.0", ">=1.2.3"));
        assert!(satisfies_range("1.2.3", ">=1.2.3"));
        assert!(!satisfies_range("1.2.2", ">=1.2.3"));
    }

    #[test]
    fn test_exact_and_fail_closed() {
        assert!(satisfies_range("1.2.3", "1.2.3"));
        assert!(!satisfies_range("1.2.4", "1.2.3"));
        assert!(!satisfies_range("not-a-version", "^1.0.0"));
        assert!(!satisfies_range("1.0.0", "^one"));
        assert!(!satisfies_range("1.0.0", "<2.0.0"));
    }

    proptest! {
        #[test]
        fn caret_accepts_same_major_line(
            major in 1u64..50, minor in 0u64..50, patch in 0u64..50,
            dminor in 0u64..10, dpatch in 0u64..10,
        ) {
            let range = format!("^{}.{}.{}", major, minor, patch);
            let same_minor = format!("{}.{}.{}", major, minor, patch + dpatch);
            let newer_minor = format!("{}.{}.0", major, minor + dminor + 1);
            prop_assert!(satisfies_range(&same_minor, &range));
            prop_assert!(satisfies_range(&newer_minor, &range));
        }

        #[test]
        fn caret_rejects_across_major(
            major in 0u64..50, minor in 0u64..50, patch in 0u64..50,
        ) {
            let range = format!("^{}.{}.{}", major, minor, patch);
            let next_major = format!("{}.{}.{}", major + 1, minor, patch);
            prop_assert!(!satisfies_range(&next_major, &range));
        }

        #[test]
        fn caret_zero_major_pins_minor(
            minor in 0u64..50, patch in 0u64..50, dpatch in 0u64..10,
        ) {
            let range = format!("^0.{}.{}", minor, patch);
            let same = format!("0.{}.{}", minor, patch + dpatch);
            let bumped = format!("0.{}.{}", minor + 1, patch);
            prop_assert!(satisfies_range(&same, &range));
            prop_assert!(!satisfies_range(&bumped, &range));
        }
    }
}
