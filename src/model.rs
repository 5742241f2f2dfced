//! Wire types shared by the downstream WebSocket protocol and the upstream
//! DSN frames.

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// Inbound request from a downstream client: the full desired subscription
/// set for this session. An empty `ids` list unsubscribes from everything.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub ids: Vec<Identifier>,
}

/// Raw status frame as received from the DSN.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatusFromDsn {
    pub status: i64,
    #[serde(rename = "extendedStatus", default)]
    pub extended_status: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NAckKind {
    NotFound,
    Generic,
}

#[derive(Debug, Clone, Serialize)]
pub struct NAckError {
    #[serde(rename = "type")]
    pub kind: NAckKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Events delivered to a downstream client over its subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StatusEvent {
    #[serde(rename = "status")]
    Status {
        id: Identifier,
        online: bool,
        #[serde(rename = "extendedStatus", skip_serializing_if = "Option::is_none")]
        extended_status: Option<serde_json::Value>,
    },
    #[serde(rename = "sub-nack")]
    NAck { id: Identifier, error: NAckError },
    #[serde(rename = "token-expired")]
    TokenExpired { id: Identifier },
}

impl StatusEvent {
    pub fn not_found(id: Identifier) -> Self {
        StatusEvent::NAck {
            id,
            error: NAckError {
                kind: NAckKind::NotFound,
                reason: None,
            },
        }
    }

    pub fn generic_nack(id: Identifier, reason: impl Into<String>) -> Self {
        StatusEvent::NAck {
            id,
            error: NAckError {
                kind: NAckKind::Generic,
                reason: Some(reason.into()),
            },
        }
    }
}

/// Close frame payload written before the protocol close, on both sides of
/// the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CloseMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub code: u16,
    pub reason: String,
}

impl CloseMessage {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            kind: "close",
            code,
            reason: reason.into(),
        }
    }
}

pub mod downstream_close {
    pub const OK: u16 = 1000;
    pub const INTERNAL: u16 = 1011;
    pub const TOKEN_EXPIRED: u16 = 4001;
    pub const FORBIDDEN: u16 = 4003;
    pub const NOT_FOUND: u16 = 4004;
}

pub mod upstream_close {
    pub const TOKEN_EXPIRED: u16 = 4001;
    pub const NOT_FOUND: u16 = 4003;
}
