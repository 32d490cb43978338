//! Session manager models.
//!
//! Contains the durable domain types (sessions, participants), the
//! transient wire payloads (offers, signaling messages) and the DTOs
//! exchanged with the service registry and relay servers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relay status reported by the service registry for healthy entries.
pub const RELAY_STATUS_HEALTHY: &str = "HEALTHY";

/// Application tag under which relay servers register themselves.
pub const RELAY_APPLICATION: &str = "turn-server";

/// Signaling message type for the initial session offer.
pub const MESSAGE_TYPE_OFFER: &str = "OFFER";

/// Signaling message type for participant text messages.
pub const MESSAGE_TYPE_TEXT: &str = "TEXT";

/// Session status enumeration.
///
/// Transitions are monotonic: CREATED -> STARTED -> ENDED, no reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Session has been created but no participant has joined.
    Created,
    /// Session has active participants.
    Started,
    /// Session is over.
    Ended,
}

impl SessionStatus {
    /// Returns the stored string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "CREATED",
            SessionStatus::Started => "STARTED",
            SessionStatus::Ended => "ENDED",
        }
    }

    /// Parses a stored status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(SessionStatus::Created),
            "STARTED" => Some(SessionStatus::Started),
            "ENDED" => Some(SessionStatus::Ended),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable multi-party conversation bound to a relay server.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque unique identifier, assigned on creation.
    pub id: String,

    /// Lifecycle status.
    pub status: SessionStatus,

    /// Registry id of the relay the session is bound to. Fixed at
    /// creation, never rewritten.
    pub relay_server: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Participants, loaded on read.
    pub participants: Vec<Participant>,
}

/// A user's membership in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,

    /// Opaque identifier minted at join time. Not derived from the
    /// submitted client credentials.
    pub user_id: String,

    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request-scoped client credentials used for admission decisions.
///
/// Never persisted. The secret is redacted in Debug output.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Reference to a created resource, returned by session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,

    /// Owning system, e.g. "session-manager/session".
    pub system: String,
}

/// TURN candidate handed to a joining participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnCandidate {
    pub url: String,
    pub username: String,
}

/// STUN candidate handed to a joining participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StunCandidate {
    pub url: String,
}

/// Connection offer delivered to a participant after a successful join.
///
/// The `trun` key is intentional: existing clients parse that spelling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOffer {
    /// Bearer token scoped to the participant, valid 24 hours.
    pub token: String,

    #[serde(rename = "trun")]
    pub turn: TurnCandidate,

    pub stun: StunCandidate,
}

/// Signaling envelope carried over the websocket channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub message_type: String,

    /// Empty for server-originated messages, which reach every client.
    #[serde(rename = "senderId", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,

    #[serde(rename = "sessionId", default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub body: serde_json::Value,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message(type={}, senderId={}, sessionId={})",
            self.message_type, self.sender_id, self.session_id
        )
    }
}

/// Relay server entry in the external service registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relay {
    pub id: String,
    pub application: String,
    pub location: String,
    pub port: u16,
    pub status: String,
}

/// Live session statistics reported by a relay server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelayStatistics {
    pub started: u64,
    pub ended: u64,
}

impl RelayStatistics {
    /// Sessions currently in progress, saturated to zero if the relay
    /// reports more ended than started sessions.
    pub fn in_progress(&self) -> u64 {
        self.started.saturating_sub(self.ended)
    }
}

/// Registration of a participant on a relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySession {
    #[serde(rename = "userId")]
    pub user_id: String,

    /// Session key the relay groups participants under.
    pub key: String,
}
