//! Identity and wire types for the marketplace realtime channel.
//!
//! Everything in this module either identifies who a connection
//! authenticates as ([`UserId`], [`Role`], [`Credentials`]) or travels on
//! the wire ([`ClientFrame`], [`ServerFrame`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The current protocol version, sent in every handshake.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A marketplace account identifier.
///
/// Accounts live in a document store, so ids are opaque strings (object
/// ids), not integers. `#[serde(transparent)]` keeps the JSON form a
/// plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Wraps anything string-like as a `UserId`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of account a session authenticates as.
///
/// Each role is a separate user collection upstream, so the same raw id
/// under two roles names two different accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A delivery partner.
    Delivery,
    /// A shopper.
    Customer,
    /// A store owner.
    Seller,
    /// Back-office staff.
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Delivery => "delivery",
            Self::Customer => "customer",
            Self::Seller => "seller",
            Self::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// What a connection authenticates with.
///
/// `Debug` is implemented by hand so bearer tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token (JWT) issued by the auth service.
    pub token: String,
    /// The account the token belongs to.
    pub user_id: UserId,
    /// Which account collection `user_id` refers to.
    pub role: Role,
}

impl Credentials {
    /// Builds a credential set.
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            token: token.into(),
            user_id: UserId::new(user_id),
            role,
        }
    }

    /// Returns `true` if both credential sets authenticate as the same
    /// account. A refreshed token alone is not a different identity.
    pub fn same_identity(&self, other: &Credentials) -> bool {
        self.user_id == other.user_id && self.role == other.role
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Frames sent by the client.
///
/// Internally tagged, so a heartbeat is `{"type":"Heartbeat","client_time":5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// First frame on every new link: who we are.
    Handshake {
        version: u32,
        token: String,
        user_id: UserId,
        role: Role,
    },

    /// An application event (order placed, location update, ...).
    Event {
        name: String,
        #[serde(default)]
        data: serde_json::Value,
    },

    /// Keep-alive. `client_time` is milliseconds since the Unix epoch.
    Heartbeat { client_time: u64 },

    /// The client is going away on purpose.
    Disconnect { reason: String },
}

impl ClientFrame {
    /// Builds the handshake frame for a credential set.
    pub fn handshake(credentials: &Credentials) -> Self {
        Self::Handshake {
            version: PROTOCOL_VERSION,
            token: credentials.token.clone(),
            user_id: credentials.user_id.clone(),
            role: credentials.role,
        }
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// The handshake was accepted.
    HandshakeAck {
        session_id: String,
        server_time: u64,
    },

    /// The handshake was refused (bad or expired token, unknown user).
    Rejected { reason: String },

    /// An application event pushed by the server.
    Event {
        name: String,
        #[serde(default)]
        data: serde_json::Value,
    },

    /// Reply to [`ClientFrame::Heartbeat`].
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// The server is closing this session.
    Disconnect { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("jwt-abc", "64f0c2", Role::Seller)
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(Role::Delivery).unwrap();
        assert_eq!(json, "delivery");
        let role: Role = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_role_rejects_unknown_value() {
        let result: Result<Role, _> = serde_json::from_str(r#""courier""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_user_id_is_transparent_string() {
        let json = serde_json::to_value(UserId::new("abc")).unwrap();
        assert_eq!(json, "abc");
    }

    #[test]
    fn test_same_identity_ignores_token_refresh() {
        let mut refreshed = creds();
        refreshed.token = "jwt-new".into();
        assert!(creds().same_identity(&refreshed));
    }

    #[test]
    fn test_same_identity_detects_role_switch() {
        let mut other = creds();
        other.role = Role::Customer;
        assert!(!creds().same_identity(&other));
    }

    #[test]
    fn test_same_identity_detects_user_switch() {
        let other = Credentials::new("jwt-abc", "someone-else", Role::Seller);
        assert!(!creds().same_identity(&other));
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let printed = format!("{:?}", creds());
        assert!(!printed.contains("jwt-abc"));
        assert!(printed.contains("64f0c2"));
    }

    #[test]
    fn test_handshake_json_format() {
        let frame = ClientFrame::handshake(&creds());
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["type"], "Handshake");
        assert_eq!(json["version"], PROTOCOL_VERSION);
        assert_eq!(json["token"], "jwt-abc");
        assert_eq!(json["user_id"], "64f0c2");
        assert_eq!(json["role"], "seller");
    }

    #[test]
    fn test_event_data_defaults_to_null() {
        let frame: ServerFrame =
            serde_json::from_str(r#"{"type":"Event","name":"order:new"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Event {
                name: "order:new".into(),
                data: serde_json::Value::Null,
            }
        );
    }

    #[test]
    fn test_rejected_json_format() {
        let json = serde_json::to_value(ServerFrame::Rejected {
            reason: "token expired".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "Rejected");
        assert_eq!(json["reason"], "token expired");
    }

    #[test]
    fn test_decode_unknown_frame_type_returns_error() {
        let unknown = r#"{"type": "Teleport", "to": "mars"}"#;
        let result: Result<ServerFrame, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }
}
