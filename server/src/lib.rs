//! Authoritative 8-ball match server.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod conn;
pub mod game_loop;
pub mod lobby;
pub mod matchmaker;
pub mod room;
pub mod ws;
