//! Trust boundary between an API gateway and the services behind it.
//!
//! Inbound requests are checked for a gateway HMAC signature, their identity
//! headers are decrypted into a request-scoped [`services::context::SecurityContext`],
//! and HS256 tokens carrying that identity can be issued and verified.
//! A distributed lock keeps scheduled jobs to one instance at a time.
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
