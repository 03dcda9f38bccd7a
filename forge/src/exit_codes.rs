//! Stable exit codes for forge CLI commands.

/// Command succeeded; for `forge process`, the round converged.
pub const OK: i32 = 0;
/// Command failed due to invalid batch/store/config state or other errors.
pub const INVALID: i32 = 1;
/// `forge process` exits with the number of regenerations still needed so
/// shell loops can branch on convergence. Codes above 125 collide with
/// shell conventions, so the count saturates here; the exact number is
/// printed to stdout.
pub const MAX_REGENS_EXIT: i32 = 125;
