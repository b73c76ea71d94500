//! Host Version Management
//!
//! A four-part host version (`major.minor.build.revision`) and the read-once
//! memoization used to select signature variants. The version is read from the
//! host a single time and then passed explicitly to every binding.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use super::error::{CompatError, CompatResult};

/// Running host version. Components beyond those given when parsing are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl HostVersion {
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self { major, minor, build, revision }
    }

    /// Whether this version is at or beyond `milestone`
    pub fn at_least(&self, milestone: &HostVersion) -> bool {
        self >= milestone
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}

impl FromStr for HostVersion {
    type Err = CompatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CompatError::invalid_version(s, "empty version string"));
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 4 {
            return Err(CompatError::invalid_version(s, "more than four components"));
        }

        let mut components = [0u32; 4];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part.parse().map_err(|_| {
                CompatError::invalid_version(s, format!("component '{}' is not a number", part))
            })?;
        }

        Ok(Self::new(components[0], components[1], components[2], components[3]))
    }
}

impl Serialize for HostVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Source of the running host's version
pub trait VersionReader: Send + Sync {
    fn read_version(&self) -> CompatResult<HostVersion>;
}

/// A reader that always reports the same version
#[derive(Debug, Clone, Copy)]
pub struct FixedVersion(pub HostVersion);

impl VersionReader for FixedVersion {
    fn read_version(&self) -> CompatResult<HostVersion> {
        Ok(self.0)
    }
}

/// Reads the host version once and hands out the cached value afterwards.
///
/// A failed read is remembered as `fallback` so that every binding in the
/// process agrees on the same version.
pub struct MemoizedVersion {
    reader: Arc<dyn VersionReader>,
    fallback: HostVersion,
    value: OnceLock<HostVersion>,
}

impl MemoizedVersion {
    pub fn new(reader: Arc<dyn VersionReader>) -> Self {
        Self::with_fallback(reader, HostVersion::default())
    }

    pub fn with_fallback(reader: Arc<dyn VersionReader>, fallback: HostVersion) -> Self {
        Self {
            reader,
            fallback,
            value: OnceLock::new(),
        }
    }

    /// Get the host version, reading it on first access
    pub fn get(&self) -> HostVersion {
        *self.value.get_or_init(|| match self.reader.read_version() {
            Ok(version) => {
                debug!("Host version resolved to {}", version);
                version
            }
            Err(e) => {
                warn!("Could not read host version ({}), assuming {}", e, self.fallback);
                self.fallback
            }
        })
    }

    /// Whether the version has been read yet
    pub fn is_resolved(&self) -> bool {
        self.value.get().is_some()
    }
}
