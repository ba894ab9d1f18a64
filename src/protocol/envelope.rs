//! Messages exchanged with the embedding host over a bridge.
//!
//! Two shapes share one line-oriented channel:
//! - envelopes tagged by `type` (`init`, `command`, `payload`)
//! - one-way notices tagged by `action` (`resize`)

use serde::{Deserialize, Serialize};

use super::command::Command;
use super::payload::Payload;

/// Protocol version announced in the readiness handshake
pub const HOST_PROTOCOL_VERSION: u32 = 1;

/// Request/response envelopes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostEnvelope {
    /// Host → page readiness signal; nothing else may be sent before it
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol: Option<u32>,
    },
    Command { command: Command },
    Payload { payload: Payload },
}

/// Fire-and-forget notices, never acknowledged
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostNotice {
    Resize { height: u32 },
}

/// Anything that travels over a bridge
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeMessage {
    Notice(HostNotice),
    Envelope(HostEnvelope),
}

impl BridgeMessage {
    pub fn init() -> Self {
        Self::Envelope(HostEnvelope::Init {
            protocol: Some(HOST_PROTOCOL_VERSION),
        })
    }

    pub fn command(command: Command) -> Self {
        Self::Envelope(HostEnvelope::Command { command })
    }

    pub fn payload(payload: Payload) -> Self {
        Self::Envelope(HostEnvelope::Payload { payload })
    }

    pub fn resize(height: u32) -> Self {
        Self::Notice(HostNotice::Resize { height })
    }

    pub fn is_init(&self) -> bool {
        matches!(self, Self::Envelope(HostEnvelope::Init { .. }))
    }

    pub fn is_notice(&self) -> bool {
        matches!(self, Self::Notice(_))
    }

    /// Short name used in logs
    pub fn kind(&self) -> &str {
        match self {
            Self::Notice(HostNotice::Resize { .. }) => "resize",
            Self::Envelope(HostEnvelope::Init { .. }) => "init",
            Self::Envelope(HostEnvelope::Command { command }) => command.tag(),
            Self::Envelope(HostEnvelope::Payload { payload }) => payload.tag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resize_notice_wire_shape() {
        let value = serde_json::to_value(BridgeMessage::resize(480)).unwrap();
        assert_eq!(value, json!({"action": "resize", "height": 480}));
    }

    #[test]
    fn test_init_is_recognised() {
        let msg: BridgeMessage = serde_json::from_str(r#"{"type":"init"}"#).unwrap();
        assert!(msg.is_init());
        assert_eq!(msg.kind(), "init");
    }

    #[test]
    fn test_command_envelope_carries_nested_command() {
        let msg = BridgeMessage::command(Command::donate("s1-zip", "{\"a\":1}"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["command"]["type"], "donate");
        assert_eq!(value["command"]["key"], "s1-zip");

        let parsed: BridgeMessage = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_notice_without_action_is_not_a_notice() {
        let msg: BridgeMessage =
            serde_json::from_str(r#"{"type":"payload","payload":{"type":"void"}}"#).unwrap();
        assert!(!msg.is_notice());
        assert_eq!(msg.kind(), "void");
    }
}
