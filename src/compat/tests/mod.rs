//! Compatibility Engine Tests
//!
//! Scenario tests for binding and tiered invocation against in-memory hosts.

pub mod mock_host;



#[cfg(test)]
pub mod concurrency_tests;

#[cfg(test)]
pub mod scenario_tests;
