//! Rule keys identifying expected build-step output
//!
//! A rule key is an opaque, fixed-length hash computed by the build engine
//! from a build step's inputs. The cache never inspects its structure; it
//! only compares keys for exact byte equality and renders them as lowercase
//! hex on the wire and in paths.

use std::fmt;
use std::str::FromStr;

use crate::errors::CacheError;

/// Length of a rule key in raw bytes
pub const RULE_KEY_LEN: usize = 20;

/// Opaque deterministic hash identifying expected build-step output
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey([u8; RULE_KEY_LEN]);

impl RuleKey {
    /// Create a rule key from raw hash bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; RULE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; RULE_KEY_LEN] {
        &self.0
    }

    /// Lowercase hex rendering used on the wire and in cache paths
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleKey({})", self.to_hex())
    }
}

impl FromStr for RuleKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| CacheError::InvalidRuleKey {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        let bytes: [u8; RULE_KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CacheError::InvalidRuleKey {
                    value: s.to_string(),
                    reason: format!("expected {} hex characters", RULE_KEY_LEN * 2),
                })?;
        Ok(Self(bytes))
    }
}
