pub mod auth;
pub mod mcp_server;
pub mod rest;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests_mcp;
#[cfg(test)]
mod tests_rest;

pub use auth::AuthState;
pub use router::build_router;
pub use service::Service;
