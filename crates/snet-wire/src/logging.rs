//! ---
//! snet_section: "02-wire-protocol"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Frame, flat object and message codecs."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
use tracing::debug;

use crate::message::Message;

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Message written to the connection.
    Outbound,
    /// Message read from the connection.
    Inbound,
}

/// Emit a structured log entry for message activity.
pub fn log_message(direction: MessageDirection, message: &Message) {
    debug!(
        kind = message.kind(),
        direction = ?direction,
        payload = %message.to_flat(),
        "messaging activity"
    );
}
