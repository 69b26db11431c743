//! Artifact cache subsystem for quarry
//!
//! Before re-executing a build step, the engine asks this crate whether the
//! step's output already exists, keyed by a deterministic rule key; on a hit
//! the cached output is downloaded or copied instead of rebuilt. The crate
//! provides:
//! - The [`ArtifactCache`] abstraction and its result/mode data model
//! - A multi-tier composing cache with fallback and hit promotion
//! - An HTTP backend speaking a length-prefixed binary envelope with
//!   checksum and key verification
//! - A local directory backend that honors borrowable-path ownership
//!
//! Protocol failures never abort a build: they surface as error-typed
//! [`CacheResult`]s and a console warning naming the backend.

pub mod artifact;
pub mod config;
pub mod dir;
pub mod errors;
pub mod http;
pub mod keys;
pub mod mode;
pub mod multi;
pub mod paths;
pub mod result;
pub mod traits;
pub mod wire;

pub use artifact::ArtifactInfo;
pub use config::{ArtifactCacheConfig, CacheTierConfig, DirCacheConfig, HttpCacheConfig};
pub use dir::DirArtifactCache;
pub use errors::{CacheError, Result};
pub use http::HttpArtifactCache;
pub use keys::RuleKey;
pub use mode::CacheReadMode;
pub use multi::MultiArtifactCache;
pub use paths::{BorrowablePath, LazyPath};
pub use result::{CacheResult, CacheResultType};
pub use traits::{ArtifactCache, StoreHandle};
