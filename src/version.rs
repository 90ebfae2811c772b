//! Project version parsing and range predicates
//!
//! Ranges compare by semver precedence with pre-releases included, so
//! `1.1.0-beta.1` satisfies `<1.1.0` and `0.17.0-dev` satisfies `<0.17.0`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::error::{ProjectError, Result};

/// The `appVersion` a project file was written by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectVersion {
    /// Parsed semantic version
    pub version: Version,
    /// The string exactly as stored in the file
    raw: String,
}

impl ProjectVersion {
    /// Parse an `appVersion` string, tolerating surrounding whitespace and a
    /// leading `v`
    pub fn parse(version_str: &str) -> std::result::Result<Self, semver::Error> {
        let trimmed = version_str.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let version = Version::parse(trimmed)?;
        Ok(Self {
            version,
            raw: version_str.to_string(),
        })
    }

    /// The string exactly as stored in the file
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this is the literal development sentinel
    pub fn is_sentinel(&self, sentinel: &str) -> bool {
        self.raw == sentinel
    }

    /// Check this version against a range
    pub fn satisfies(&self, range: &VersionRange) -> bool {
        range.matches(&self.version)
    }
}

impl fmt::Display for ProjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

/// Compare by semver precedence, ignoring build metadata
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Exact,
}

impl Op {
    fn symbol(&self) -> &'static str {
        match self {
            Op::Less => "<",
            Op::LessEq => "<=",
            Op::Greater => ">",
            Op::GreaterEq => ">=",
            Op::Exact => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn matches(&self, version: &Version) -> bool {
        let ord = cmp_precedence(version, &self.version);
        match self.op {
            Op::Less => ord == Ordering::Less,
            Op::LessEq => ord != Ordering::Greater,
            Op::Greater => ord == Ordering::Greater,
            Op::GreaterEq => ord != Ordering::Less,
            Op::Exact => ord == Ordering::Equal,
        }
    }
}

/// A conjunction of comparators such as `<0.17.1` or `>=0.14.0 <0.15.0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    comparators: Vec<Comparator>,
}

impl VersionRange {
    /// Range matching every version strictly below `version`
    pub fn below(version: Version) -> Self {
        Self {
            comparators: vec![Comparator {
                op: Op::Less,
                version,
            }],
        }
    }

    /// Whether `version` satisfies every comparator
    pub fn matches(&self, version: &Version) -> bool {
        self.comparators.iter().all(|c| c.matches(version))
    }

    /// The exclusive upper bound, when the range has one
    pub fn upper_bound(&self) -> Option<&Version> {
        self.comparators
            .iter()
            .find(|c| c.op == Op::Less)
            .map(|c| &c.version)
    }
}

impl FromStr for VersionRange {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self> {
        let mut comparators = Vec::new();
        for part in s.split_whitespace() {
            let (op, rest) = if let Some(rest) = part.strip_prefix("<=") {
                (Op::LessEq, rest)
            } else if let Some(rest) = part.strip_prefix(">=") {
                (Op::GreaterEq, rest)
            } else if let Some(rest) = part.strip_prefix('<') {
                (Op::Less, rest)
            } else if let Some(rest) = part.strip_prefix('>') {
                (Op::Greater, rest)
            } else if let Some(rest) = part.strip_prefix('=') {
                (Op::Exact, rest)
            } else {
                (Op::Exact, part)
            };
            let version = Version::parse(rest)
                .map_err(|e| ProjectError::InvalidRange(format!("{s:?}: {e}")))?;
            comparators.push(Comparator { op, version });
        }
        if comparators.is_empty() {
            return Err(ProjectError::InvalidRange(format!("{s:?}: empty range")));
        }
        Ok(Self { comparators })
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .comparators
            .iter()
            .map(|c| format!("{}{}", c.op.symbol(), c.version))
            .collect();
        f.write_str(&parts.join(" "))
    }
}
