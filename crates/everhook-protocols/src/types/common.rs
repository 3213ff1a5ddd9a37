//! Common utility types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Metadata map type.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Semantic version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerelease: Option<String>,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    /// Whether `self` satisfies a minimum version requirement. Prerelease
    /// tags are ignored.
    pub fn satisfies(&self, minimum: &Version) -> bool {
        (self.major, self.minor, self.patch) >= (minimum.major, minimum.minor, minimum.patch)
    }
}

/// Error parsing a [`Version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(pub String);

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version: {}", self.0)
    }
}

impl std::error::Error for ParseVersionError {}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (core, prerelease) = match s.split_once('-') {
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (s, None),
        };
        let mut parts = core.split('.').map(|p| p.parse::<u32>());
        let mut next = || {
            parts
                .next()
                .unwrap_or(Ok(0))
                .map_err(|_| ParseVersionError(s.to_string()))
        };
        let (major, minor, patch) = (next()?, next()?, next()?);
        if core.split('.').count() > 3 || core.is_empty() {
            return Err(ParseVersionError(s.to_string()));
        }
        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
        })
    }
}
