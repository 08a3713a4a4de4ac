//! Semantic version types with npm range semantics.
//!
//! Provides `Version` (major.minor.patch-prerelease+build) and `VersionReq`, a
//! parsed npm range such as `^1.2.0`, `~2.3`, `1.x || >=3.0.0 <4`, or
//! `1.2.3 - 2.0`. Ranges are desugared into primitive comparators the way the
//! npm registry tooling does, so matching is a plain bounds check.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Semantic version (major.minor.patch-prerelease+build)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

/// Version requirement: a union (`||`) of comparator sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReq {
    pub sets: Vec<ComparatorSet>,
}

/// Comparators that must all match (whitespace-separated in the range string).
/// An empty set matches every release version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComparatorSet {
    pub comparators: Vec<Comparator>,
}

/// Individual version comparator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub op: Op,
    pub version: Version,
}

/// Primitive comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Exact,     // =1.0.0
    Greater,   // >1.0.0
    GreaterEq, // >=1.0.0
    Less,      // <1.0.0
    LessEq,    // <=1.0.0
}

/// Partial version as written in a range (`1`, `1.2`, `1.x`, `*`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialVersion {
    pub major: Option<u64>,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    pub prerelease: Option<String>,
}

/// Version parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },

    #[error("Invalid prerelease identifier: {prerelease}")]
    InvalidPrerelease { prerelease: String },

    #[error("Invalid build metadata: {build}")]
    InvalidBuild { build: String },

    #[error("Invalid version range: {input}")]
    InvalidRange { input: String },
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    fn with_floor_prerelease(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: Some("0".to_string()),
            build: None,
        }
    }

    fn same_release(&self, other: &Self) -> bool {
        (self.major, self.minor, self.patch) == (other.major, other.minor, other.patch)
    }

    /// Get the precedence for comparison (ignores build metadata)
    fn precedence_cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            },
            other => other,
        }
    }
}

/// Compare dot-separated prerelease identifiers: numeric identifiers compare
/// numerically and sort before alphanumeric ones.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Largest component npm accepts (`Number.MAX_SAFE_INTEGER`). Keeping
/// components below it leaves room to bump any of them when desugaring.
const MAX_COMPONENT: u64 = (1 << 53) - 1;

fn parse_number(component: &str) -> Result<u64, VersionError> {
    let invalid = || VersionError::InvalidNumber {
        component: component.to_string(),
    };
    if component.is_empty() || (component.len() > 1 && component.starts_with('0')) {
        return Err(invalid());
    }
    if !component.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    component
        .parse()
        .ok()
        .filter(|number| *number <= MAX_COMPONENT)
        .ok_or_else(invalid)
}

fn valid_identifiers(input: &str) -> bool {
    !input.is_empty()
        && input.split('.').all(|ident| {
            !ident.is_empty() && ident.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

fn split_prerelease_and_build(
    input: &str,
) -> Result<(&str, Option<String>, Option<String>), VersionError> {
    let (version_part, build) = match input.split_once('+') {
        Some((v, b)) => {
            if !valid_identifiers(b) {
                return Err(VersionError::InvalidBuild {
                    build: b.to_string(),
                });
            }
            (v, Some(b.to_string()))
        }
        None => (input, None),
    };

    let (core_part, prerelease) = match version_part.split_once('-') {
        Some((c, p)) => {
            if !valid_identifiers(p) {
                return Err(VersionError::InvalidPrerelease {
                    prerelease: p.to_string(),
                });
            }
            (c, Some(p.to_string()))
        }
        None => (version_part, None),
    };

    Ok((core_part, prerelease, build))
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let stripped = input.strip_prefix('v').unwrap_or(input);

        let (core_part, prerelease, build) = split_prerelease_and_build(stripped)?;

        let parts: Vec<&str> = core_part.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        Ok(Version {
            major: parse_number(parts[0])?,
            minor: parse_number(parts[1])?,
            patch: parse_number(parts[2])?,
            prerelease,
            build,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;

        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }

        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }

        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
    }
}

impl PartialVersion {
    fn is_wildcard(component: &str) -> bool {
        matches!(component, "x" | "X" | "*")
    }

    /// Parse a partial version, allowing `x`/`X`/`*` and missing components
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();
        let input = input.strip_prefix('=').unwrap_or(input);
        let input = input.strip_prefix('v').unwrap_or(input);

        if input.is_empty() {
            return Ok(Self::any());
        }

        let (core_part, prerelease, _build) = split_prerelease_and_build(input)?;
        let parts: Vec<&str> = core_part.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionError::InvalidRange {
                input: input.to_string(),
            });
        }

        let mut numbers = [None; 3];
        let mut seen_wildcard = false;
        for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
            if Self::is_wildcard(part) {
                seen_wildcard = true;
            } else if seen_wildcard {
                // `1.x.3` is not meaningful
                return Err(VersionError::InvalidRange {
                    input: input.to_string(),
                });
            } else {
                *slot = Some(parse_number(part)?);
            }
        }

        let [major, minor, patch] = numbers;
        Ok(Self {
            major,
            minor,
            patch,
            prerelease: if patch.is_some() { prerelease } else { None },
        })
    }

    fn any() -> Self {
        Self {
            major: None,
            minor: None,
            patch: None,
            prerelease: None,
        }
    }

    /// Fill missing components with zero
    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            prerelease: self.prerelease.clone(),
            build: None,
        }
    }

    fn is_full(&self) -> bool {
        self.patch.is_some()
    }
}

fn cmp(op: Op, version: Version) -> Comparator {
    Comparator { op, version }
}

/// Comparators that can never match
fn nothing() -> Vec<Comparator> {
    vec![cmp(Op::Less, Version::with_floor_prerelease(0, 0, 0))]
}

/// `>=lower <upper-0`
fn between(lower: Version, upper: (u64, u64, u64)) -> Vec<Comparator> {
    vec![
        cmp(Op::GreaterEq, lower),
        cmp(Op::Less, Version::with_floor_prerelease(upper.0, upper.1, upper.2)),
    ]
}

fn desugar_caret(p: &PartialVersion) -> Vec<Comparator> {
    let lower = p.floor();
    match (p.major, p.minor, p.patch) {
        (None, _, _) => Vec::new(),
        (Some(major), None, _) => between(lower, (major + 1, 0, 0)),
        (Some(0), Some(minor), None) => between(lower, (0, minor + 1, 0)),
        (Some(major), Some(_), None) => between(lower, (major + 1, 0, 0)),
        (Some(0), Some(0), Some(patch)) => between(lower, (0, 0, patch + 1)),
        (Some(0), Some(minor), Some(_)) => between(lower, (0, minor + 1, 0)),
        (Some(major), Some(_), Some(_)) => between(lower, (major + 1, 0, 0)),
    }
}

fn desugar_tilde(p: &PartialVersion) -> Vec<Comparator> {
    let lower = p.floor();
    match (p.major, p.minor) {
        (None, _) => Vec::new(),
        (Some(major), None) => between(lower, (major + 1, 0, 0)),
        (Some(major), Some(minor)) => between(lower, (major, minor + 1, 0)),
    }
}

fn desugar_primitive(op: Op, p: &PartialVersion) -> Vec<Comparator> {
    if p.is_full() {
        return vec![cmp(op, p.floor())];
    }

    match (op, p.major, p.minor) {
        (Op::Exact, None, _) => Vec::new(),
        (Op::Exact, Some(major), None) => between(p.floor(), (major + 1, 0, 0)),
        (Op::Exact, Some(major), Some(minor)) => between(p.floor(), (major, minor + 1, 0)),

        (Op::Greater, None, _) => nothing(),
        (Op::Greater, Some(major), None) => vec![cmp(Op::GreaterEq, Version::new(major + 1, 0, 0))],
        (Op::Greater, Some(major), Some(minor)) => {
            vec![cmp(Op::GreaterEq, Version::new(major, minor + 1, 0))]
        }

        (Op::GreaterEq, None, _) => Vec::new(),
        (Op::GreaterEq, Some(_), _) => vec![cmp(Op::GreaterEq, p.floor())],

        (Op::Less, None, _) => nothing(),
        (Op::Less, Some(major), minor) => vec![cmp(
            Op::Less,
            Version::with_floor_prerelease(major, minor.unwrap_or(0), 0),
        )],

        (Op::LessEq, None, _) => Vec::new(),
        (Op::LessEq, Some(major), None) => {
            vec![cmp(Op::Less, Version::with_floor_prerelease(major + 1, 0, 0))]
        }
        (Op::LessEq, Some(major), Some(minor)) => {
            vec![cmp(Op::Less, Version::with_floor_prerelease(major, minor + 1, 0))]
        }
    }
}

fn desugar_hyphen(from: &PartialVersion, to: &PartialVersion) -> Vec<Comparator> {
    let mut comparators = Vec::new();

    if from.major.is_some() {
        comparators.push(cmp(Op::GreaterEq, from.floor()));
    }

    match (to.major, to.minor, to.patch) {
        (None, _, _) => {}
        (Some(major), None, _) => {
            comparators.push(cmp(Op::Less, Version::with_floor_prerelease(major + 1, 0, 0)))
        }
        (Some(major), Some(minor), None) => comparators.push(cmp(
            Op::Less,
            Version::with_floor_prerelease(major, minor + 1, 0),
        )),
        (Some(_), Some(_), Some(_)) => comparators.push(cmp(Op::LessEq, to.floor())),
    }

    comparators
}

/// Split a single comparator token into its operator and version text
fn split_operator(token: &str) -> (&str, &str) {
    for op in [">=", "<=", ">", "<", "=", "^", "~>", "~"] {
        if let Some(rest) = token.strip_prefix(op) {
            return (op, rest.trim_start());
        }
    }
    ("", token)
}

/// Glue operators separated from their version by whitespace (`>= 1.2.3`)
fn tokenize(set: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending: Option<String> = None;

    for word in set.split_whitespace() {
        match pending.take() {
            Some(op) => tokens.push(format!("{}{}", op, word)),
            None if matches!(word, ">=" | "<=" | ">" | "<" | "=" | "^" | "~" | "~>") => {
                pending = Some(word.to_string())
            }
            None => tokens.push(word.to_string()),
        }
    }

    if let Some(op) = pending {
        tokens.push(op);
    }

    tokens
}

impl ComparatorSet {
    fn parse(input: &str) -> Result<Self, VersionError> {
        let words: Vec<&str> = input.split_whitespace().collect();

        if words.len() == 3 && words[1] == "-" {
            let from = PartialVersion::parse(words[0])?;
            let to = PartialVersion::parse(words[2])?;
            return Ok(Self {
                comparators: desugar_hyphen(&from, &to),
            });
        }

        let mut comparators = Vec::new();
        for token in tokenize(input) {
            let (op, rest) = split_operator(&token);
            let partial = PartialVersion::parse(rest)?;
            let desugared = match op {
                "^" => desugar_caret(&partial),
                "~" | "~>" => desugar_tilde(&partial),
                ">=" => desugar_primitive(Op::GreaterEq, &partial),
                "<=" => desugar_primitive(Op::LessEq, &partial),
                ">" => desugar_primitive(Op::Greater, &partial),
                "<" => desugar_primitive(Op::Less, &partial),
                _ => desugar_primitive(Op::Exact, &partial),
            };
            comparators.extend(desugared);
        }

        Ok(Self { comparators })
    }

    /// Check if a version matches every comparator in this set.
    ///
    /// A prerelease version only matches when some comparator names a
    /// prerelease of the same `major.minor.patch`.
    pub fn matches(&self, version: &Version) -> bool {
        if !self.comparators.iter().all(|comp| comp.matches(version)) {
            return false;
        }

        if !version.is_prerelease() {
            return true;
        }

        self.comparators
            .iter()
            .any(|comp| comp.version.is_prerelease() && comp.version.same_release(version))
    }
}

impl VersionReq {
    /// Parse an npm version range
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let sets = input
            .split("||")
            .map(ComparatorSet::parse)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionError::InvalidRange {
                input: input.to_string(),
            })?;

        Ok(VersionReq { sets })
    }

    /// Check if a version matches this requirement
    pub fn matches(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| set.matches(version))
    }
}

impl Comparator {
    /// Check if a version matches this comparator
    pub fn matches(&self, version: &Version) -> bool {
        match self.op {
            Op::Exact => version == &self.version,
            Op::Greater => version > &self.version,
            Op::GreaterEq => version >= &self.version,
            Op::Less => version < &self.version,
            Op::LessEq => version <= &self.version,
        }
    }
}
