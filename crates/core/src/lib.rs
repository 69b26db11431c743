//! Core domain types, errors, and constants for the `quarry` build tool.
//!
//! This crate establishes the foundational error handling and shared
//! constants used throughout the rest of the codebase.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the tool-wide `Error` enum and `Result` type
//!   alias, centralizing unrecoverable failure modes so the rest of the
//!   tool handles them predictably.
//! - **`constants`**: Shared static constants such as environment variable
//!   names and default paths.

pub mod constants;
pub mod errors;

pub use self::{
    constants::*,
    errors::{Error, Result},
};
