//! Core utilities shared across the recap pipeline
//!
//! - `http`: client construction (bounded requests and open-ended streams),
//!   ESPN session cookies, status classification and the single-retry policy
//!   for transient upstream failures

pub mod http;

pub use http::{
    build_client, build_streaming_client, decode, espn_cookie_header_map, get_json,
    streaming_client, RetryPolicy,
};
