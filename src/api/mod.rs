pub mod client;
pub mod error;
pub mod http;
pub mod mapper;
pub mod memory;
pub mod rate_limiter;

pub use client::{RateLimitConfig, RemoteOperation, RemoteRow, RemoteStore};
pub use error::ApiError;
pub use http::HttpRemoteStore;
pub use mapper::map_record_to_operation;
pub use memory::{InMemoryRemoteStore, RemoteCall};
pub use rate_limiter::RateLimiter;
