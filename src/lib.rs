//! Session and driver management for Bluetooth game controllers.
//!
//! Hosts send [`service::commands::Command`]s and receive
//! [`domain::models::Envelope`]s through an injected event sink.

pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod service;

#[cfg(test)]
mod testing;
