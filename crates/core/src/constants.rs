/// Constants used throughout the quarry codebase
// Tool identity
pub const TOOL_NAME: &str = "quarry";

// Environment variable names
pub const QUARRY_CACHE_MODE_VAR: &str = "QUARRY_CACHE_MODE";
pub const QUARRY_LOG_VAR: &str = "QUARRY_LOG";

// Default cache directory, relative to the project root
pub const DEFAULT_CACHE_DIR: &str = ".quarry/cache";
