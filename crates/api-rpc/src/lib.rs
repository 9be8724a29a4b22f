//! JSON-RPC API Layer
//!
//! Job status reporting, import/export submission and admin methods.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use rate_limiter::RateLimitConfig;
pub use server::{RpcServer, RpcServerConfig};
