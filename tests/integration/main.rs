//! Integration test entry point

mod engine_test;
mod scenario_test;
