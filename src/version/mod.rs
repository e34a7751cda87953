// src/version/mod.rs

//! Package versions and version ranges
//!
//! Versions follow the `major.minor.patch[.revision][-prerelease][+metadata]`
//! shape. Comparison is a total order: numeric parts first, then a release
//! sorts above any prerelease of the same numbers, then prerelease labels are
//! compared with semver precedence, case-insensitively. Build metadata never
//! takes part in comparison or equality.
//!
//! Ranges use interval notation:
//! - `1.0` → `[1.0, )` (minimum, inclusive)
//! - `[1.0]` → exactly 1.0
//! - `[1.0, 2.0)` → 1.0 inclusive up to 2.0 exclusive
//! - `(, 2.0]` → anything up to 2.0
//! - `*` or empty → any version

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A parsed package version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NuGetVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    /// Prerelease label without the leading dash, empty for releases
    pub release: String,
    /// Build metadata without the leading plus, empty when absent
    pub metadata: String,
}

impl NuGetVersion {
    /// Create a release version from its numeric parts
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            release: String::new(),
            metadata: String::new(),
        }
    }

    /// Parse a version string
    ///
    /// Accepts one to four numeric parts; missing parts default to zero.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseError("Empty version string".to_string()));
        }

        let (rest, metadata) = match s.split_once('+') {
            Some((r, m)) => (r, m.to_string()),
            None => (s, String::new()),
        };
        let (numbers, release) = match rest.split_once('-') {
            Some((n, r)) => {
                if r.is_empty() {
                    return Err(Error::ParseError(format!(
                        "Empty prerelease label in version '{}'",
                        s
                    )));
                }
                (n, r.to_string())
            }
            None => (rest, String::new()),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(Error::ParseError(format!("Invalid version '{}'", s)));
        }

        let mut values = [0u64; 4];
        for (i, part) in parts.iter().enumerate() {
            values[i] = part.parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid version component '{}' in '{}': {}", part, s, e))
            })?;
        }

        Ok(Self {
            major: values[0],
            minor: values[1],
            patch: values[2],
            revision: values[3],
            release,
            metadata,
        })
    }

    /// True when the version carries a prerelease label
    pub fn is_prerelease(&self) -> bool {
        !self.release.is_empty()
    }

    /// Canonical string: three parts (four when revision is non-zero),
    /// prerelease label kept, metadata dropped
    pub fn to_normalized_string(&self) -> String {
        let mut s = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            s.push_str(&format!(".{}", self.revision));
        }
        if self.is_prerelease() {
            s.push('-');
            s.push_str(&self.release);
        }
        s
    }

    fn compare_release(&self, other: &Self) -> Ordering {
        match (self.release.is_empty(), other.release.is_empty()) {
            (true, true) => Ordering::Equal,
            // A release is always greater than a prerelease of the same numbers
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let left = self.release.to_ascii_lowercase();
                let right = other.release.to_ascii_lowercase();
                match (
                    semver::Prerelease::new(&left),
                    semver::Prerelease::new(&right),
                ) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => left.cmp(&right),
                }
            }
        }
    }
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.revision)
            .cmp(&(other.major, other.minor, other.patch, other.revision))
            .then_with(|| self.compare_release(other))
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

impl Hash for NuGetVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.revision.hash(state);
        self.release.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_normalized_string())
    }
}

impl TryFrom<String> for NuGetVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<NuGetVersion> for String {
    fn from(value: NuGetVersion) -> Self {
        value.to_normalized_string()
    }
}

impl std::str::FromStr for NuGetVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// An interval of acceptable versions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    pub min: Option<NuGetVersion>,
    pub min_inclusive: bool,
    pub max: Option<NuGetVersion>,
    pub max_inclusive: bool,
}

impl VersionRange {
    /// Range accepting every version
    pub fn all() -> Self {
        Self {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
        }
    }

    /// `[version, )`
    pub fn at_least(version: NuGetVersion) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// `[version]`
    pub fn exact(version: NuGetVersion) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    /// Parse a range in interval notation
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::all());
        }

        let first = s.chars().next().unwrap_or_default();
        if first != '[' && first != '(' {
            return Ok(Self::at_least(NuGetVersion::parse(s)?));
        }

        let last = s.chars().last().unwrap_or_default();
        if s.len() < 3 || (last != ']' && last != ')') {
            return Err(Error::ParseError(format!("Invalid version range '{}'", s)));
        }

        let min_inclusive = first == '[';
        let max_inclusive = last == ']';
        let inner = &s[1..s.len() - 1];

        match inner.split_once(',') {
            None => {
                // "[1.0]" is the only legal single-version interval
                if !(min_inclusive && max_inclusive) {
                    return Err(Error::ParseError(format!(
                        "Invalid exact version range '{}'",
                        s
                    )));
                }
                Ok(Self::exact(NuGetVersion::parse(inner)?))
            }
            Some((lo, hi)) => {
                let lo = lo.trim();
                let hi = hi.trim();
                if hi.contains(',') {
                    return Err(Error::ParseError(format!("Invalid version range '{}'", s)));
                }
                let min = if lo.is_empty() {
                    None
                } else {
                    Some(NuGetVersion::parse(lo)?)
                };
                let max = if hi.is_empty() {
                    None
                } else {
                    Some(NuGetVersion::parse(hi)?)
                };

                if let (Some(lo_v), Some(hi_v)) = (&min, &max) {
                    let ok = match lo_v.cmp(hi_v) {
                        Ordering::Less => true,
                        Ordering::Equal => min_inclusive && max_inclusive,
                        Ordering::Greater => false,
                    };
                    if !ok {
                        return Err(Error::ParseError(format!(
                            "Version range '{}' is empty",
                            s
                        )));
                    }
                }

                Ok(Self {
                    min_inclusive: min_inclusive && min.is_some(),
                    max_inclusive: max_inclusive && max.is_some(),
                    min,
                    max,
                })
            }
        }
    }

    /// Check whether a version lies inside the range
    pub fn satisfies(&self, version: &NuGetVersion) -> bool {
        if let Some(ref min) = self.min {
            match version.cmp(min) {
                Ordering::Less => return false,
                Ordering::Equal if !self.min_inclusive => return false,
                _ => {}
            }
        }
        if let Some(ref max) = self.max {
            match version.cmp(max) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.max_inclusive => return false,
                _ => {}
            }
        }
        true
    }

    /// True for `[x]`
    pub fn is_exact(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(lo), Some(hi)) => self.min_inclusive && self.max_inclusive && lo == hi,
            _ => false,
        }
    }

    /// True when no bound is set
    pub fn is_all(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// True if either bound is a prerelease, which lets prerelease
    /// candidates through prerelease pruning
    pub fn has_prerelease_bounds(&self) -> bool {
        self.min.as_ref().is_some_and(|v| v.is_prerelease())
            || self.max.as_ref().is_some_and(|v| v.is_prerelease())
    }

    /// Lowest version in `versions` that satisfies the range
    pub fn find_best_match<'a, I>(&self, versions: I) -> Option<&'a NuGetVersion>
    where
        I: IntoIterator<Item = &'a NuGetVersion>,
    {
        versions
            .into_iter()
            .filter(|v| self.satisfies(v))
            .min()
    }

    /// Human-oriented form, e.g. `(>= 1.0.0 && < 2.0.0)`
    pub fn pretty_print(&self) -> String {
        if self.is_exact() {
            if let Some(ref v) = self.min {
                return format!("(= {})", v);
            }
        }

        let mut parts = Vec::new();
        if let Some(ref min) = self.min {
            let op = if self.min_inclusive { ">=" } else { ">" };
            parts.push(format!("{} {}", op, min));
        }
        if let Some(ref max) = self.max {
            let op = if self.max_inclusive { "<=" } else { "<" };
            parts.push(format!("{} {}", op, max));
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("({})", parts.join(" && "))
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return write!(f, "*");
        }
        if self.is_exact() {
            if let Some(ref v) = self.min {
                return write!(f, "[{}]", v);
            }
        }
        if self.min_inclusive && self.max.is_none() {
            if let Some(ref v) = self.min {
                return write!(f, "{}", v);
            }
        }

        let open = if self.min_inclusive { '[' } else { '(' };
        let close = if self.max_inclusive { ']' } else { ')' };
        let lo = self.min.as_ref().map(|v| v.to_string()).unwrap_or_default();
        let hi = self.max.as_ref().map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}{}, {}{}", open, lo, hi, close)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Which parts of an installed version an update must keep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionConstraints {
    pub exact_major: bool,
    pub exact_minor: bool,
    pub exact_patch: bool,
    pub exact_release: bool,
}

impl VersionConstraints {
    /// No constraint: any newer version may be chosen
    pub fn none() -> Self {
        Self::default()
    }

    /// Every part locked, which turns an update into a reinstall
    pub fn exact() -> Self {
        Self {
            exact_major: true,
            exact_minor: true,
            exact_patch: true,
            exact_release: true,
        }
    }

    /// True when the constraints pin the installed version exactly
    pub fn is_exact(&self) -> bool {
        self.exact_major && self.exact_minor && self.exact_patch && self.exact_release
    }

    /// Whether `candidate` keeps the locked parts of `installed`
    pub fn allows(&self, installed: &NuGetVersion, candidate: &NuGetVersion) -> bool {
        (!self.exact_major || installed.major == candidate.major)
            && (!self.exact_minor || installed.minor == candidate.minor)
            && (!self.exact_patch || installed.patch == candidate.patch)
            && (!self.exact_release
                || installed.release.eq_ignore_ascii_case(&candidate.release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> NuGetVersion {
        NuGetVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_simple() {
        let ver = v("1.2.3");
        assert_eq!((ver.major, ver.minor, ver.patch, ver.revision), (1, 2, 3, 0));
        assert!(!ver.is_prerelease());
    }

    #[test]
    fn test_parse_short_and_long() {
        assert_eq!(v("1").to_string(), "1.0.0");
        assert_eq!(v("1.2").to_string(), "1.2.0");
        assert_eq!(v("1.2.3.4").to_string(), "1.2.3.4");
        assert_eq!(v("1.2.3.0").to_string(), "1.2.3");
    }

    #[test]
    fn test_parse_prerelease_and_metadata() {
        let ver = v("2.0.0-beta.1+build.5");
        assert!(ver.is_prerelease());
        assert_eq!(ver.release, "beta.1");
        assert_eq!(ver.metadata, "build.5");
        assert_eq!(ver.to_string(), "2.0.0-beta.1");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(NuGetVersion::parse("").is_err());
        assert!(NuGetVersion::parse("a.b").is_err());
        assert!(NuGetVersion::parse("1.2.3.4.5").is_err());
        assert!(NuGetVersion::parse("1.0-").is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-alpha.2") < v("1.0.0-alpha.10"));
        assert!(v("1.0.0.1") > v("1.0.0"));
    }

    #[test]
    fn test_equality_ignores_case_and_metadata() {
        assert_eq!(v("1.0.0-BETA"), v("1.0.0-beta"));
        assert_eq!(v("1.0.0+abc"), v("1.0"));
    }

    #[test]
    fn test_range_bare_version_is_minimum() {
        let r = VersionRange::parse("1.0").unwrap();
        assert!(r.satisfies(&v("1.0.0")));
        assert!(r.satisfies(&v("5.0.0")));
        assert!(!r.satisfies(&v("0.9.0")));
    }

    #[test]
    fn test_range_intervals() {
        let r = VersionRange::parse("[1.0, 2.0)").unwrap();
        assert!(r.satisfies(&v("1.0.0")));
        assert!(r.satisfies(&v("1.9.9")));
        assert!(!r.satisfies(&v("2.0.0")));

        let r = VersionRange::parse("(1.0, 2.0]").unwrap();
        assert!(!r.satisfies(&v("1.0.0")));
        assert!(r.satisfies(&v("2.0.0")));

        let r = VersionRange::parse("(, 2.0]").unwrap();
        assert!(r.satisfies(&v("0.1.0")));
        assert!(!r.satisfies(&v("2.0.1")));
    }

    #[test]
    fn test_range_exact() {
        let r = VersionRange::parse("[1.5.0]").unwrap();
        assert!(r.is_exact());
        assert!(r.satisfies(&v("1.5")));
        assert!(!r.satisfies(&v("1.5.1")));
        assert_eq!(r.pretty_print(), "(= 1.5.0)");
    }

    #[test]
    fn test_range_invalid() {
        assert!(VersionRange::parse("(1.0)").is_err());
        assert!(VersionRange::parse("[2.0, 1.0]").is_err());
        assert!(VersionRange::parse("[1.0, 2.0").is_err());
    }

    #[test]
    fn test_range_display() {
        assert_eq!(VersionRange::parse("1.0").unwrap().to_string(), "1.0.0");
        assert_eq!(VersionRange::parse("*").unwrap().to_string(), "*");
        assert_eq!(
            VersionRange::parse("[1.0,2.0)").unwrap().to_string(),
            "[1.0.0, 2.0.0)"
        );
        assert_eq!(
            VersionRange::parse("[1.0,2.0)").unwrap().pretty_print(),
            "(>= 1.0.0 && < 2.0.0)"
        );
    }

    #[test]
    fn test_find_best_match_is_lowest() {
        let r = VersionRange::parse("1.0").unwrap();
        let versions = [v("2.0.0"), v("1.5.0"), v("0.5.0")];
        assert_eq!(r.find_best_match(versions.iter()), Some(&v("1.5.0")));
    }

    #[test]
    fn test_version_constraints() {
        let c = VersionConstraints {
            exact_major: true,
            ..Default::default()
        };
        assert!(c.allows(&v("1.0.0"), &v("1.9.0")));
        assert!(!c.allows(&v("1.0.0"), &v("2.0.0")));
        assert!(VersionConstraints::exact().is_exact());
        assert!(!VersionConstraints::none().is_exact());
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let json = serde_json::to_string(&v("1.2.3-rc")).unwrap();
        assert_eq!(json, "\"1.2.3-rc\"");
        let range: VersionRange = serde_json::from_str("\"[1.0, 2.0)\"").unwrap();
        assert!(range.satisfies(&v("1.5")));
    }
}
