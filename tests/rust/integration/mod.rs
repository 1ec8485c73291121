//! Integration tests - the service driven end to end against a mocked engine
//!
//! The executor is a `mockall` double, so these tests run without a graph
//! database while still exercising authentication, compilation, execution
//! and result folding together.

mod schema_loading_tests;
mod service_tests;
