//! HTTP API for ChatNest
//!
//! JSON over axum. Every failure is returned as
//! `{ "origin": "<component> -> <operation>", "kind": ..., "errorMessage": ... }`.

pub mod api;
pub mod handlers;
pub mod server;
pub mod state;
pub mod types;

pub use api::build_router;
pub use server::{shutdown_signal, ApiServer, BoundServer};
pub use state::AppState;
