//! Load Test Engine - sequential load testing for reqforge
//!
//! The driver issues iterations strictly one after another, streaming
//! per-request results and running aggregates over a channel. Without a
//! target URL it simulates latency and status instead of doing real I/O.

pub mod driver;

pub use driver::{LoadTestAggregator, LoadTestConfig, LoadTestDriver, LoadTestStats, LoadTestUpdate, RequestResult};
