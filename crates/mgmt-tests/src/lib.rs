//! End-to-end tests for the management bridge
//!
//! Every test here drives the same bridge twice: once through the native
//! in-process connection and once through the bridged connection over HTTP,
//! and checks that callers observe the same results and the same failures.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mgmt-tests
//! ```
//!
//! # Test Structure
//!
//! - `parity_test.rs` - Native vs. bridged connection on one bridge
//! - `lifecycle_test.rs` - Self-registration and teardown seen over the wire

// This crate only contains tests, no library code
