//! Wire types shared between the gateway, the messaging core, and the
//! delivery/indexer consumers.
//!
//! The client-facing transport is a length-delimited WebSocket binary frame
//! carrying a JSON-encoded [`Frame`]; `data` within a frame is itself JSON
//! whose shape depends on `command`. The broker-facing transport carries a
//! JSON-encoded [`DeliverPayload`] keyed by `conversation_id`.

use serde::{Deserialize, Serialize};

/// Frame command discriminant.
///
/// Serializes as `"sign_in"`, `"message"`, etc. so that frames are
/// self-describing on the wire without a separate schema registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    SignIn,
    Message,
    Heartbeat,
    Error,
}

/// The only unit of exchange on the client connection.
///
/// `request_id` echoes the request that produced a reply (0 for
/// server-initiated frames such as `Heartbeat` and fan-out `Message`
/// frames). `code` is 0 on success; any other value is paired with a
/// human-readable `message`. `data` carries the command-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub command: Command,
    #[serde(default)]
    pub request_id: u32,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Frame {
    /// Build a success reply echoing `request_id` with no payload.
    #[must_use]
    pub fn ok(command: Command, request_id: u32) -> Self {
        Self {
            command,
            request_id,
            code: 0,
            message: String::new(),
            data: serde_json::Value::Null,
        }
    }

    /// Build a success reply carrying a serializable payload.
    ///
    /// # Errors
    /// Returns an error if `data` cannot be serialized to JSON.
    pub fn ok_with(
        command: Command,
        request_id: u32,
        data: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            command,
            request_id,
            code: 0,
            message: String::new(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Build an error reply.
    #[must_use]
    pub fn error(request_id: u32, code: u32, message: impl Into<String>) -> Self {
        Self {
            command: Command::Error,
            request_id,
            code,
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Encode this frame as a WebSocket binary payload.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be serialized to JSON.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a frame from a WebSocket binary payload.
    ///
    /// # Errors
    /// Returns an error if `bytes` is not a valid encoded frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Parse `data` into the caller's expected payload type.
    ///
    /// # Errors
    /// Returns an error if `data` does not match the expected shape.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// `data` payload of a `SIGN_IN` request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInInput {
    pub device_id: u64,
    pub user_id: u64,
    pub token: String,
}

/// `data` payload of a server-originated `MESSAGE` frame, and the broker
/// delivery-event body. Producers key the broker message by
/// `conversation_id` to obtain per-conversation ordering end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverPayload {
    pub message_id: String,
    pub conversation_id: String,
    pub seq: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    #[serde(rename = "type")]
    pub message_type: i32,
}

/// Content submitted in a `SendMessage` RPC. The variant determines the
/// type tag persisted alongside the message and the bytes stored in the
/// document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { body: String },
    Image { url: String },
    Audio { url: String },
    File { url: String, name: String },
    Unknown { body: Vec<u8> },
}

impl MessageContent {
    /// Content type tag per the frozen scheme: text=1, image=2, audio=3,
    /// file=5, anything else=0.
    #[must_use]
    pub fn type_tag(&self) -> i32 {
        match self {
            Self::Text { .. } => 1,
            Self::Image { .. } => 2,
            Self::Audio { .. } => 3,
            Self::File { .. } => 5,
            Self::Unknown { .. } => 0,
        }
    }

    /// Serialize the content to the opaque bytes stored in the document
    /// store's `body` field.
    #[must_use]
    pub fn to_body_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Claims carried by a signed bearer. Mirrors the registered JWT claim
/// names so the token is interoperable with any standard JWT inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    pub iss: String,
    pub aud: String,
    pub uid: i64,
    pub did: i64,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Frozen HTTP error envelope used by all non-2xx RPC responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_json_bytes() {
        let input = SignInInput {
            device_id: 10,
            user_id: 1,
            token: "abc.def.ghi".to_string(),
        };
        let frame = Frame::ok_with(Command::SignIn, 7, &input).unwrap();
        let bytes = frame.encode().unwrap();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.command, Command::SignIn);
        assert_eq!(decoded.request_id, 7);
        let parsed: SignInInput = decoded.parse_data().unwrap();
        assert_eq!(parsed, input);
    }

    #[test]
    fn error_frame_carries_code_and_message() {
        let frame = Frame::error(3, 7, "permission denied");
        assert_eq!(frame.command, Command::Error);
        assert_eq!(frame.code, 7);
        assert_eq!(frame.message, "permission denied");
    }

    #[test]
    fn content_type_tags_match_frozen_scheme() {
        assert_eq!(MessageContent::Text { body: "hi".into() }.type_tag(), 1);
        assert_eq!(MessageContent::Image { url: "u".into() }.type_tag(), 2);
        assert_eq!(MessageContent::Audio { url: "u".into() }.type_tag(), 3);
        assert_eq!(
            MessageContent::File {
                url: "u".into(),
                name: "n".into()
            }
            .type_tag(),
            5
        );
        assert_eq!(
            MessageContent::Unknown { body: vec![1, 2] }.type_tag(),
            0
        );
    }

    #[test]
    fn deliver_payload_serializes_type_as_reserved_word() {
        let payload = DeliverPayload {
            message_id: "1-1".into(),
            conversation_id: "p_1_2".into(),
            seq: 1,
            sender_id: 1,
            recipient_id: 2,
            message_type: 1,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], 1);
    }
}
