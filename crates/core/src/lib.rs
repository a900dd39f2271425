//! Pure domain logic for the CV job progress client.
//!
//! Nothing in this crate performs I/O. The network-facing pieces live in
//! `cvflow-progress`, which builds on the stage table, upload validation,
//! wire constants and presentation mapping defined here.

pub mod channel;
pub mod error;
pub mod presentation;
pub mod stage;
pub mod types;
pub mod upload;
