//! HTTP API module.
//!
//! The axum server, its request/response types, and the log broadcaster
//! every other module writes to.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server};
pub use types::*;
