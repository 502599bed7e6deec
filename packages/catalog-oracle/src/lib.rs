//! Database oracle for the catalog harness.
//!
//! Reads and writes the `categories` and `products` tables directly,
//! bypassing the service under test, so its answers can serve as ground
//! truth. Every operation runs in its own short-lived session.

pub mod oracle;
mod session;

pub use oracle::{unique_title, DbOracle};
