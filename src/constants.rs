// src/constants.rs

/// Environment variable overriding the manifest's ambiguity policy.
pub const ENV_AMBIGUITY: &str = "CMDTREE_AMBIGUITY";

/// Interval, in milliseconds, between cancellation checks while a handler runs.
pub const DEFAULT_CANCELLATION_POLL_MS: u64 = 50;

/// Exit code for any outcome other than a successful run.
pub const EXIT_FAILURE: i32 = 1;
