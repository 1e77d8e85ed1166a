//! Scenario tests for the CV client SDK
//!
//! Unit tests live next to the code; these suites drive the client against
//! a mock backend.

pub mod discovery_tests;
pub mod interview_tests;
