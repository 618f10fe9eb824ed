//! Shared types for the telemetry dashboard
//!
//! This crate contains the data model shared by the dashboard components:
//! stream values and the module tree they live in, stream identifiers,
//! widget descriptors and the JSON envelopes exchanged with the server.

pub mod data;
pub mod stream_id;
pub mod widget;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use data::*;
pub use stream_id::*;
pub use widget::*;
pub use protocol::*;
pub use state::*;
