//! ---
//! snet_section: "01-core-functionality"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Shared primitives and utilities for the SensorNet runtime."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
//! Core shared primitives for the SensorNet workspace.
//! This crate exposes configuration loading, tracing bootstrap and the
//! timestamp helpers consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, HistoryConfig, LoadedAppConfig, LoggingConfig, SessionConfig, SessionKind,
    WorkerConfig,
};
pub use logging::{init, init_tracing, LogFormat};
