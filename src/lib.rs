//! Worldlink - game client session controller
//!
//! Owns the lifecycle of one world connection and the single surface through
//! which player actions are validated and forwarded to the server.

// ============================================
// Core Modules
// ============================================

/// Client configuration
pub mod config;
/// Cooperative event loop (tick rate, deferred events)
pub mod dispatcher;
/// Session state machine, action gateway, scripting bridge
pub mod game;
/// Protocol link seam and the in-process loopback link
pub mod network;

pub use game::{Game, SessionState};
