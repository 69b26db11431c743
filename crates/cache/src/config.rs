//! Cache configuration consumed from the embedding tool
//!
//! The build tool owns parsing and precedence; this module only defines the
//! shapes the cache subsystem consumes — an ordered backend list with
//! per-backend name, mode, and location — plus the factory that turns a
//! configuration into a ready [`MultiArtifactCache`].

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dir::DirArtifactCache;
use crate::errors::Result;
use crate::http::HttpArtifactCache;
use crate::mode::CacheReadMode;
use crate::multi::MultiArtifactCache;
use crate::traits::ArtifactCache;

/// Default user-facing failure template
pub const DEFAULT_ERROR_MESSAGE_FORMAT: &str = "{cache_name} encountered an error: {error_message}";

/// Default request timeout for remote backends, in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default bound on concurrent store uploads per backend
pub const DEFAULT_STORE_CONCURRENCY: usize = 4;

/// One backend in the ordered tier list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CacheTierConfig {
    /// Remote HTTP backend
    Http(HttpCacheConfig),
    /// Local directory backend
    Dir(DirCacheConfig),
}

/// Configuration for an HTTP cache backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCacheConfig {
    /// Display name used in diagnostics
    #[serde(default = "default_http_name")]
    pub name: String,
    /// Base URL of the cache server
    pub url: String,
    /// Explicit-store participation policy
    #[serde(default)]
    pub mode: CacheReadMode,
    /// Whole-request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Template for user-facing failure diagnostics, with `{cache_name}`
    /// and `{error_message}` placeholders
    #[serde(default = "default_error_message_format")]
    pub error_message_format: String,
    /// Bound on concurrent store uploads
    #[serde(default = "default_store_concurrency")]
    pub store_concurrency: usize,
}

/// Configuration for a local directory cache backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirCacheConfig {
    /// Display name used in diagnostics
    #[serde(default = "default_dir_name")]
    pub name: String,
    /// Root directory for cached artifacts
    pub dir: PathBuf,
    /// Explicit-store participation policy
    #[serde(default)]
    pub mode: CacheReadMode,
    /// Template for user-facing failure diagnostics, with `{cache_name}`
    /// and `{error_message}` placeholders
    #[serde(default = "default_error_message_format")]
    pub error_message_format: String,
    /// Bound on concurrent store writes
    #[serde(default = "default_store_concurrency")]
    pub store_concurrency: usize,
}

/// Ordered cache configuration, tier 0 = fastest/most local
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactCacheConfig {
    #[serde(default)]
    pub tiers: Vec<CacheTierConfig>,
}

impl ArtifactCacheConfig {
    /// Build the configured backends into one multi-tier cache
    ///
    /// An environment override from `QUARRY_CACHE_MODE` applies to every
    /// tier, matching how operators force a read-only build.
    pub fn build(&self) -> Result<MultiArtifactCache> {
        let mode_override = mode_from_env();
        let mut tiers: Vec<Arc<dyn ArtifactCache>> = Vec::new();
        for tier in &self.tiers {
            match tier {
                CacheTierConfig::Http(config) => {
                    let mut config = config.clone();
                    if let Some(mode) = mode_override {
                        config.mode = mode;
                    }
                    tiers.push(Arc::new(HttpArtifactCache::new(&config)?));
                }
                CacheTierConfig::Dir(config) => {
                    let mut config = config.clone();
                    if let Some(mode) = mode_override {
                        config.mode = mode;
                    }
                    tiers.push(Arc::new(DirArtifactCache::new(&config)));
                }
            }
        }
        Ok(MultiArtifactCache::new(tiers))
    }
}

/// Read a cache mode override from the environment
///
/// Unknown values are ignored with a warning rather than failing the build.
#[must_use]
pub fn mode_from_env() -> Option<CacheReadMode> {
    let value = std::env::var(quarry_core::QUARRY_CACHE_MODE_VAR).ok()?;
    match CacheReadMode::from_str(&value) {
        Ok(mode) => Some(mode),
        Err(_) => {
            tracing::warn!(
                "unknown {} value \"{}\", keeping configured cache modes",
                quarry_core::QUARRY_CACHE_MODE_VAR,
                value
            );
            None
        }
    }
}

/// Render the user-facing failure template for one backend error
#[must_use]
pub fn render_error_message(template: &str, cache_name: &str, error_message: &str) -> String {
    template
        .replace("{cache_name}", cache_name)
        .replace("{error_message}", error_message)
}

fn default_http_name() -> String {
    "http".to_string()
}

fn default_dir_name() -> String {
    "dir".to_string()
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_error_message_format() -> String {
    DEFAULT_ERROR_MESSAGE_FORMAT.to_string()
}

fn default_store_concurrency() -> usize {
    DEFAULT_STORE_CONCURRENCY
}
