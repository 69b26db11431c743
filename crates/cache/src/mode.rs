//! Cache read modes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CacheError;

/// Per-backend policy controlling participation in explicit store calls
///
/// The mode governs explicit stores only: a `ReadWrite` backend accepts
/// them, while `ReadOnly` and `PassThrough` backends are skipped. Fetches
/// are unaffected, and so is hit promotion inside a multi-tier cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheReadMode {
    /// Backend participates in explicit stores (default)
    #[default]
    ReadWrite,
    /// Backend serves fetches but is excluded from explicit stores
    ReadOnly,
    /// Backend is consulted but never an explicit store target
    PassThrough,
}

impl CacheReadMode {
    /// Whether explicit stores should target this backend
    #[must_use]
    pub fn is_writable(self) -> bool {
        matches!(self, CacheReadMode::ReadWrite)
    }
}

impl fmt::Display for CacheReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode_str = match self {
            CacheReadMode::ReadWrite => "read-write",
            CacheReadMode::ReadOnly => "read-only",
            CacheReadMode::PassThrough => "pass-through",
        };
        write!(f, "{mode_str}")
    }
}

impl FromStr for CacheReadMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read-write" | "readwrite" => Ok(CacheReadMode::ReadWrite),
            "read-only" | "readonly" => Ok(CacheReadMode::ReadOnly),
            "pass-through" | "passthrough" => Ok(CacheReadMode::PassThrough),
            other => Err(CacheError::configuration(format!(
                "unknown cache read mode '{other}'"
            ))),
        }
    }
}
