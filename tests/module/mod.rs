//! Module system tests
//!
//! Tests for module lifecycle, isolation contexts and the module API.

pub mod test_utils;
pub mod lifecycle_tests;
pub mod isolation_tests;
