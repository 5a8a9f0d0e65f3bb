//! Jamboree: a multi-tenant music-generation backend.
//!
//! The HTTP surface admits authenticated requests, the job store persists
//! them, and the worker pool drives the transcoder pipeline to stable asset
//! URLs. Library form exists for integration tests; the binary entry point
//! is `main.rs`.

pub mod api;
pub mod enrich;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod state;
pub mod telemetry;
