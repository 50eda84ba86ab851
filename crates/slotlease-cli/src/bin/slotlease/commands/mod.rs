//! Command implementations.

pub mod lease;
pub mod run;

/// Exit code when no slot could be acquired (`EX_TEMPFAIL`).
pub const EXIT_NO_SLOT: i32 = 75;
