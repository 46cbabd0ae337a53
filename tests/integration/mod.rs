//! Integration tests for Backlink Scout
//!
//! Seller sites and the coordinator are replaced by wiremock servers where a
//! test only exercises one side; the end-to-end test runs the real
//! coordinator on a loopback port.

mod coordinator_tests;
mod end_to_end;
mod engine_tests;
mod site_crawl_tests;
