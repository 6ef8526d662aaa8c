//! Exit codes of the `stepwise` binary.
//! These codes are part of the public contract; CI scripts branch on them.

pub const SUCCESS: i32 = 0;
pub const CASES_FAILED: i32 = 1; // At least one case failed or errored
pub const CONFIG_ERROR: i32 = 2; // Bad config, arguments or case sources
pub const RESOURCE_EXHAUSTED: i32 = 3; // A keyword provider became unavailable
pub const CANCELLED: i32 = 130; // Interrupted (Ctrl-C)
