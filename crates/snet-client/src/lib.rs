//! ---
//! snet_section: "04-client-session"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Connection session, receive loop and worker pool."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Client side of the SensorNet protocol.
//!
//! A [`Session`] owns one TCP connection to a broker, registers as a field
//! node or a control panel, and runs a named receive thread that feeds
//! [`snet_state::StateCache`], [`snet_state::HistoryAggregator`] and any
//! registered [`SessionObserver`]s. [`WorkerPool`] runs outbound work off the
//! caller's thread.

pub mod metrics;
pub mod pool;
pub mod session;

use snet_wire::WireError;

pub use metrics::SessionMetrics;
pub use pool::{PoolError, WorkerPool};
pub use session::{Session, SessionObserver, SessionOptions, SessionState};

/// Shared result type for session operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by [`Session`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The broker could not be reached.
    #[error("failed to connect to {addr}: {source}")]
    Connection {
        /// `host:port` that was dialled.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// Framing or socket failure on an established connection.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },
    /// The session has been closed.
    #[error("session closed")]
    Closed,
    /// The receive thread could not be started.
    #[error("failed to spawn receive thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// Work could not be handed to the worker pool.
    #[error(transparent)]
    Pool(#[from] PoolError),
}
