//! ---
//! snet_section: "02-wire-protocol"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Frame, flat object and message codecs."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Wire protocol for SensorNet.
//!
//! A connection carries length-prefixed frames ([`frame`]); each frame holds a
//! flat object in JSON-like text ([`flat`]) whose `type` field selects one of
//! the typed protocol messages ([`message`]).

pub mod flat;
pub mod frame;
pub mod logging;
pub mod message;

/// Shared result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Failures surfaced by the frame codec.
///
/// Payload-level problems never appear here: the flat object codec degrades to
/// an empty object and dispatch reports unroutable payloads as `None`.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Wrapper for IO errors raised by the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    Closed,
    /// The stream ended inside a frame header or payload.
    #[error("truncated frame: expected {expected} bytes, received {received}")]
    Truncated {
        /// Bytes the header (or payload length) required.
        expected: usize,
        /// Bytes actually read before end of stream.
        received: usize,
    },
    /// A declared payload length exceeded the caller supplied limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Declared payload length.
        size: usize,
        /// Limit imposed by the caller.
        limit: usize,
    },
}

impl WireError {
    /// True for errors that mean the peer went away rather than misbehaved.
    pub fn is_disconnect(&self) -> bool {
        match self {
            WireError::Closed => true,
            WireError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

pub use flat::FlatObject;
pub use frame::{encode_frame, read_frame, read_frame_limited, write_frame, HEADER_LEN};
pub use logging::{log_message, MessageDirection};
pub use message::{
    peek_type, ActuatorCommand, Heartbeat, Message, MessageType, RegisterAck, Registration,
    SensorData,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_and_disconnect_classification() {
        let err = WireError::Truncated {
            expected: 4,
            received: 2,
        };
        assert_eq!(
            format!("{err}"),
            "truncated frame: expected 4 bytes, received 2"
        );
        assert!(!err.is_disconnect());
        assert!(WireError::Closed.is_disconnect());
        let reset = WireError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());
    }
}
