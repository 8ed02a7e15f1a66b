//! ---
//! snet_section: "02-wire-protocol"
//! snet_subsection: "module"
//! snet_type: "source"
//! snet_scope: "code"
//! snet_description: "Frame, flat object and message codecs."
//! snet_version: "v0.0.0-prealpha"
//! snet_owner: "tbd"
//! ---
//! Typed protocol messages and the `type`-field dispatcher.
//!
//! Every field is optional at decode time: a field missing from the wire
//! object becomes `None`. Required fields in the protocol table are enforced
//! by the constructors used on the sending side, not by the decoder.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::flat::{self, FlatObject};

/// Key carrying the message discriminant.
pub const TYPE_FIELD: &str = "type";

/// Discriminant values of the `type` field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// A field node announcing itself to the broker.
    RegisterNode,
    /// A control panel announcing itself to the broker.
    RegisterControlPanel,
    /// Broker acknowledgement of a registration.
    RegisterAck,
    /// A sensor reading published by a node.
    SensorData,
    /// Liveness probe in either direction.
    Heartbeat,
    /// Command addressed to an actuator.
    ActuatorCommand,
}

impl MessageType {
    /// Wire spelling of the discriminant.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Implements flat object conversion for a struct of `Option<String>` fields.
macro_rules! flat_fields {
    ($ty:ident { $($field:ident => $wire:literal),+ $(,)? }) => {
        impl $ty {
            /// Wire field names in encoding order, excluding `type`.
            pub const FIELDS: &'static [&'static str] = &[$($wire),+];

            fn from_flat(object: &FlatObject) -> Self {
                Self {
                    $($field: object.get_owned($wire),)+
                }
            }

            fn write_flat(&self, object: &mut FlatObject) {
                $(object.insert_opt($wire, self.$field.as_deref());)+
            }
        }
    };
}

/// Registration payload shared by `REGISTER_NODE` and `REGISTER_CONTROL_PANEL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    /// Role announced by the registering peer.
    pub role: Option<String>,
    /// Identifier of the registering peer.
    pub node_id: Option<String>,
}

flat_fields!(Registration {
    role => "role",
    node_id => "nodeId",
});

/// `REGISTER_ACK` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterAck {
    /// Protocol version spoken by the broker.
    pub protocol_version: Option<String>,
    /// Role the broker recorded for the peer.
    pub role: Option<String>,
    /// Identifier the broker recorded for the peer.
    pub node_id: Option<String>,
    /// Free-form status text.
    pub message: Option<String>,
}

flat_fields!(RegisterAck {
    protocol_version => "protocolVersion",
    role => "role",
    node_id => "nodeId",
    message => "message",
});

/// `SENSOR_DATA` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorData {
    /// Publishing node.
    pub node_id: Option<String>,
    /// Sensor type on that node, e.g. `temperature`.
    pub sensor_key: Option<String>,
    /// Reading in textual form.
    pub value: Option<String>,
    /// Unit of the reading.
    pub unit: Option<String>,
    /// Epoch milliseconds or RFC 3339 text.
    pub timestamp: Option<String>,
}

flat_fields!(SensorData {
    node_id => "nodeId",
    sensor_key => "sensorKey",
    value => "value",
    unit => "unit",
    timestamp => "timestamp",
});

/// `HEARTBEAT` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heartbeat {
    /// Direction marker chosen by the sender.
    pub direction: Option<String>,
    /// Sending node, when known.
    pub node_id: Option<String>,
    /// Protocol version of the sender.
    pub protocol_version: Option<String>,
}

flat_fields!(Heartbeat {
    direction => "direction",
    node_id => "nodeId",
    protocol_version => "protocolVersion",
});

/// `ACTUATOR_COMMAND` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActuatorCommand {
    /// Node owning the actuator; absent for broadcast.
    pub target_node: Option<String>,
    /// Actuator type, e.g. `heater`.
    pub actuator: Option<String>,
    /// Action verb, e.g. `SET`.
    pub action: Option<String>,
    /// Action argument.
    pub value: Option<String>,
}

flat_fields!(ActuatorCommand {
    target_node => "targetNode",
    actuator => "actuator",
    action => "action",
    value => "value",
});

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `REGISTER_NODE`.
    RegisterNode(Registration),
    /// `REGISTER_CONTROL_PANEL`.
    RegisterControlPanel(Registration),
    /// `REGISTER_ACK`.
    RegisterAck(RegisterAck),
    /// `SENSOR_DATA`.
    SensorData(SensorData),
    /// `HEARTBEAT`.
    Heartbeat(Heartbeat),
    /// `ACTUATOR_COMMAND`.
    ActuatorCommand(ActuatorCommand),
}

impl Message {
    /// Build a `REGISTER_NODE` message.
    pub fn register_node(role: impl Into<String>, node_id: impl Into<String>) -> Self {
        Message::RegisterNode(Registration {
            role: Some(role.into()),
            node_id: Some(node_id.into()),
        })
    }

    /// Build a `REGISTER_CONTROL_PANEL` message.
    pub fn register_control_panel(role: impl Into<String>, node_id: impl Into<String>) -> Self {
        Message::RegisterControlPanel(Registration {
            role: Some(role.into()),
            node_id: Some(node_id.into()),
        })
    }

    /// Build a `SENSOR_DATA` message without unit or timestamp.
    pub fn sensor_data(
        node_id: impl Into<String>,
        sensor_key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Message::SensorData(SensorData {
            node_id: Some(node_id.into()),
            sensor_key: Some(sensor_key.into()),
            value: Some(value.into()),
            unit: None,
            timestamp: None,
        })
    }

    /// Build an `ACTUATOR_COMMAND` message.
    pub fn actuator_command(
        target_node: Option<String>,
        actuator: impl Into<String>,
        action: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        Message::ActuatorCommand(ActuatorCommand {
            target_node,
            actuator: Some(actuator.into()),
            action: Some(action.into()),
            value,
        })
    }

    /// Build a `HEARTBEAT` message carrying only its direction.
    pub fn heartbeat(direction: impl Into<String>) -> Self {
        Message::Heartbeat(Heartbeat {
            direction: Some(direction.into()),
            node_id: None,
            protocol_version: None,
        })
    }

    /// Discriminant of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::RegisterNode(_) => MessageType::RegisterNode,
            Message::RegisterControlPanel(_) => MessageType::RegisterControlPanel,
            Message::RegisterAck(_) => MessageType::RegisterAck,
            Message::SensorData(_) => MessageType::SensorData,
            Message::Heartbeat(_) => MessageType::Heartbeat,
            Message::ActuatorCommand(_) => MessageType::ActuatorCommand,
        }
    }

    /// Wire name of the discriminant, handy for log fields.
    pub fn kind(&self) -> &'static str {
        self.message_type().as_str()
    }

    /// Decode payload text; `None` when the `type` is missing or unknown.
    pub fn decode(text: &str) -> Option<Self> {
        Self::from_flat(&flat::decode(text))
    }

    /// Decode a frame payload; non UTF-8 bytes are treated as absent text.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        std::str::from_utf8(payload).ok().and_then(Self::decode)
    }

    /// Build the variant selected by `object`'s `type` field.
    pub fn from_flat(object: &FlatObject) -> Option<Self> {
        let message_type = object.get(TYPE_FIELD)?.parse::<MessageType>().ok()?;
        Some(match message_type {
            MessageType::RegisterNode => Message::RegisterNode(Registration::from_flat(object)),
            MessageType::RegisterControlPanel => {
                Message::RegisterControlPanel(Registration::from_flat(object))
            }
            MessageType::RegisterAck => Message::RegisterAck(RegisterAck::from_flat(object)),
            MessageType::SensorData => Message::SensorData(SensorData::from_flat(object)),
            MessageType::Heartbeat => Message::Heartbeat(Heartbeat::from_flat(object)),
            MessageType::ActuatorCommand => {
                Message::ActuatorCommand(ActuatorCommand::from_flat(object))
            }
        })
    }

    /// Flat object with `type` first followed by the variant's present fields.
    pub fn to_flat(&self) -> FlatObject {
        let mut object = FlatObject::new();
        object.insert(TYPE_FIELD, self.kind());
        match self {
            Message::RegisterNode(body) | Message::RegisterControlPanel(body) => {
                body.write_flat(&mut object)
            }
            Message::RegisterAck(body) => body.write_flat(&mut object),
            Message::SensorData(body) => body.write_flat(&mut object),
            Message::Heartbeat(body) => body.write_flat(&mut object),
            Message::ActuatorCommand(body) => body.write_flat(&mut object),
        }
        object
    }

    /// Encode as payload text.
    pub fn encode(&self) -> String {
        flat::encode(&self.to_flat())
    }

    /// Encode as frame payload bytes.
    pub fn to_payload(&self) -> Vec<u8> {
        self.encode().into_bytes()
    }
}

/// Recover the raw `type` value without materialising a message.
///
/// Returns the text even when it names no known variant, so callers can log
/// what they are skipping. `None` when the input is not an object or carries
/// no `type` key.
pub fn peek_type(text: &str) -> Option<String> {
    flat::raw_entries(text)
        .filter(|(key, _)| flat::unquote(key) == TYPE_FIELD)
        .last()
        .map(|(_, value)| flat::unquote(value))
}
