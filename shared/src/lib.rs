//! Shared eight-ball types and simulation.
//!
//! Everything here is pure and synchronous: table geometry, the physics
//! stepper, shot adjudication and the wire protocol used by the server and
//! browser client.

pub mod config;
pub mod physics;
pub mod protocol;
pub mod rules;
pub mod state;
pub mod vec2;
