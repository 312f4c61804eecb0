//! Session management
//!
//! ## Modules
//!
//! - [`registry`] - driver catalog and HID gating
//! - [`session_table`] - which driver each session holds
//! - [`orchestrator`] - connect / disconnect / feature / query
//! - [`commands`] - serialized command processing with preference fallback

pub mod commands;
pub mod orchestrator;
pub mod registry;
pub mod session_table;
