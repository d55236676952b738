//! Process exit codes

/// Configuration could not be loaded or is invalid
pub const CONFIG_ERROR: i32 = 2;

/// The project file could not be planned
pub const VALIDATION_ERROR: i32 = 5;
