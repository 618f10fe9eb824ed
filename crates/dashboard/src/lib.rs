//! Real-time telemetry dashboard.
//!
//! Keeps one supervised connection to a telemetry server, mirrors the streams
//! it publishes into a shared store and binds those streams to widgets placed
//! in a layout grid.

pub mod app;
pub mod binding;
pub mod config;
pub mod connection;
pub mod error;
pub mod manifest;
pub mod protocol;
pub mod status;
pub mod store;
pub mod widgets;

pub use app::Dashboard;
pub use config::{load_config, DashboardConfig};
pub use connection::ConnectionManager;
pub use protocol::{Dispatcher, MessageSink};
pub use status::{StatusEvent, StatusSink};
pub use store::{DataStore, StreamSource};
