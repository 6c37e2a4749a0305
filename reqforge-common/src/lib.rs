//! Shared data types for the reqforge request engine
//!
//! This crate holds the HTTP request/response shapes and mock route
//! definitions used by every other crate in the workspace.

pub mod http;
pub mod mock;

pub use http::{status_text, KeyValueEntry, RequestData, ResponseData};
pub use mock::MockRoute;
