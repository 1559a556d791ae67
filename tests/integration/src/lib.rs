//! Integration tests across the namechain crates
//!
//! This test suite validates:
//! - Name service methods end to end, from dispatch through block application
//! - Index persistence and recovery across reopen
//! - Concurrent read dispatch while blocks are applied

pub mod test_utils;

#[cfg(test)]
mod name_service_flow_tests;

#[cfg(test)]
mod concurrent_dispatch_tests;
