//! REST client for the products/categories service.
//!
//! Every call resolves to an [`ApiResponse`] carrying the exact status code;
//! 4xx and 5xx answers are outcomes to inspect, not errors. Only transport
//! failures and deadline expiry are returned as `Err`.

pub mod client;
pub mod response;

pub use client::ApiClient;
pub use response::ApiResponse;
