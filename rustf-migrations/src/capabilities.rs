//! Engine version and the capabilities gated on it
//!
//! The facade resolves an [`EngineCapabilities`] value once, when it is
//! constructed, and consults it for operations that only newer engines
//! support.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum engine version providing the interactive `edit` command
pub const EDIT_MIN_VERSION: EngineVersion = EngineVersion::new(0, 8, 0);

/// Minimum engine version accepting `indicate_current` on `history`
pub const INDICATE_CURRENT_MIN_VERSION: EngineVersion = EngineVersion::new(0, 9, 9);

/// Three-component engine version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for EngineVersion {
    type Err = Error;

    /// Parse the first three dotted components; anything after them
    /// (a fourth component, pre-release suffixes on the patch) is ignored.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = [0u32; 3];
        let mut components = s.trim().split('.');

        for (index, slot) in parts.iter_mut().enumerate() {
            let component = match components.next() {
                Some(c) => c,
                None if index > 0 => break,
                None => return Err(Error::config(format!("Invalid engine version: '{}'", s))),
            };

            let digits: String = component
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();

            *slot = digits
                .parse()
                .map_err(|_| Error::config(format!("Invalid engine version: '{}'", s)))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// What the installed engine can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCapabilities {
    version: EngineVersion,
}

impl EngineCapabilities {
    pub fn for_version(version: EngineVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> EngineVersion {
        self.version
    }

    pub fn supports_edit(&self) -> bool {
        self.version >= EDIT_MIN_VERSION
    }

    pub fn supports_indicate_current(&self) -> bool {
        self.version >= INDICATE_CURRENT_MIN_VERSION
    }
}
