//! relayq — translation and account-scheduling core for a local
//! code-assistant proxy.
//!
//! This crate holds the engine: model resolution, the account pool and
//! credential store, the shared-file synchronizer, the request translator,
//! the degradation retry engine, the upstream HTTP call, and the
//! service-layer admin contract. The HTTP server binding these into a
//! chat-completions-compatible API is outside this crate's scope.

pub mod accounts;
pub mod admin;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod logs;
pub mod models;
pub mod refresh;
pub mod retry;
pub mod secret;
pub mod translate;
pub mod upstream;
