//! Artifact descriptions handed to `store`

use std::collections::BTreeMap;

use crate::errors::{CacheError, Result};
use crate::keys::RuleKey;

/// Description of an artifact being stored
///
/// An artifact may satisfy several rule keys at once (aliases for identical
/// output under different keys), so the key set is non-empty but unbounded.
/// Built once per store call and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactInfo {
    rule_keys: Vec<RuleKey>,
    metadata: BTreeMap<String, String>,
}

impl ArtifactInfo {
    /// Create artifact info for a set of rule keys
    ///
    /// Duplicate keys are dropped, preserving first-seen order. Returns an
    /// error if no keys remain.
    pub fn new(
        rule_keys: impl IntoIterator<Item = RuleKey>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut deduped: Vec<RuleKey> = Vec::new();
        for key in rule_keys {
            if !deduped.contains(&key) {
                deduped.push(key);
            }
        }
        if deduped.is_empty() {
            return Err(CacheError::EmptyRuleKeys);
        }
        Ok(Self {
            rule_keys: deduped,
            metadata,
        })
    }

    /// Artifact info for a single rule key with no metadata
    #[must_use]
    pub fn for_key(rule_key: RuleKey) -> Self {
        Self {
            rule_keys: vec![rule_key],
            metadata: BTreeMap::new(),
        }
    }

    /// Add one metadata entry, builder style
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Rule keys this artifact satisfies, in declaration order
    #[must_use]
    pub fn rule_keys(&self) -> &[RuleKey] {
        &self.rule_keys
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Whether this artifact claims the given rule key
    #[must_use]
    pub fn contains(&self, rule_key: &RuleKey) -> bool {
        self.rule_keys.contains(rule_key)
    }
}
