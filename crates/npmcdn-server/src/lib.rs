//! # npmcdn-server
//!
//! HTTP front end of npmcdn: the request pipeline, response building,
//! directory index pages and the hyper accept loop.

pub mod index;
pub mod orchestrator;
pub mod respond;
pub mod server;

// Re-export main types
pub use orchestrator::{build_cache_backend, Outcome, RequestOrchestrator, ONE_YEAR};
pub use server::Server;
