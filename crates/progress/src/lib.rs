//! Job progress client for the CV backend.
//!
//! Provides the job-creation REST client, typed progress frame parsing,
//! the per-job state machine with its terminal latch, and the socket
//! connector with single-shot reconnect and keepalive handling.

pub mod api;
pub mod client;
pub mod connector;
pub mod driver;
pub mod events;
pub mod messages;
pub mod reconnect;
pub mod session;
pub mod state;
