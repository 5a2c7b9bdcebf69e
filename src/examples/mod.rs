//! Usage examples.
//!
//! These drive the whole core from a probe program to output lines and are
//! exercised by the test suite.

pub mod hello;
