//! Logging setup for auto-refactor binaries.
//!
//! Log output always goes to stderr so stdout stays free for reports and
//! the streaming wire format.

pub mod logging;
