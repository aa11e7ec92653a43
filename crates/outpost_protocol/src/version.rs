//! Version compatibility between origin and leaf.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// The major and minor components of a software version.
///
/// Patch levels and pre-release suffixes never affect compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
}

impl Version {
    /// Returns true when both sides may talk to each other.
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl FromStr for Version {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidVersion(s.to_string());
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let mut parts = trimmed.split(['.', '-', '+']);

        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        Ok(Self { major, minor })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Compares two version strings.
///
/// Unparseable versions are never compatible.
pub fn is_compatible(local: &str, remote: &str) -> bool {
    match (local.parse::<Version>(), remote.parse::<Version>()) {
        (Ok(local), Ok(remote)) => local.is_compatible_with(&remote),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_level_ignored() {
        assert!(is_compatible("1.4.0", "1.4.2"));
        assert!(is_compatible("v1.4.0", "1.4.9-rc1"));
    }

    #[test]
    fn minor_mismatch() {
        assert!(!is_compatible("1.3.0", "1.4.0"));
        assert!(!is_compatible("2.4.0", "1.4.0"));
    }

    #[test]
    fn garbage_is_incompatible() {
        assert!(!is_compatible("dev", "1.4.0"));
        assert!(!is_compatible("1", "1.4.0"));
        assert_eq!(
            "x.y".parse::<Version>(),
            Err(ProtocolError::InvalidVersion("x.y".into()))
        );
    }

    #[test]
    fn display() {
        let v: Version = "1.4.7".parse().unwrap();
        assert_eq!(v.to_string(), "1.4");
    }
}
