pub mod dedup;
pub mod fetcher;
pub mod orchestrator;
pub mod parser;
pub mod search;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

#[cfg(test)]
mod orchestrator_tests;
