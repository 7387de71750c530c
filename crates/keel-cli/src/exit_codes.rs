//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// Configuration error - installer spec or feature set file is invalid
pub const CONFIG_ERROR: i32 = 2;

/// Template error - manifest rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Cluster error - the cluster could not be reached
pub const CLUSTER_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Feature error - one or more features failed to apply or clean up
pub const FEATURE_ERROR: i32 = 6;
