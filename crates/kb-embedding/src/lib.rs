pub mod client;
pub mod rate_limiter;

pub use client::EmbeddingClient;
pub use rate_limiter::RateLimiter;
