//! Observer wire protocol.
//!
//! Every frame is one JSON object with a `type` discriminator.
//!
//! Server → observer:
//!
//! ```text
//! {"type":"aliases-update","data":{"A1B2C3":"Alice"}}
//! {"type":"card-read","uid":"A1B2C3","source":"card","knownName":"Alice"}
//! {"type":"save-success"}
//! {"type":"error","message":"..."}
//! ```
//!
//! Observer → server:
//!
//! ```text
//! {"type":"save-alias","uid":"A1B2C3","name":"Alice"}
//! {"type":"save-batch-alias","uids":["A1","B2"],"name":"Shelf 4"}
//! {"type":"delete-alias","uid":"A1B2C3"}
//! {"type":"delete-batch-alias","uids":["A1","B2"]}
//! ```
//!
//! Commands are decoded once, here, into [`ObserverCommand`]. Anything that
//! does not fit one of the four shapes becomes a [`ProtocolError`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tagbridge_core::{AliasTable, Identifier, ObservedEvent, Source};
use thiserror::Error;

/// Encoded server message, shared between every observer queue it is
/// pushed to.
pub type Frame = Arc<str>;

/// Message pushed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full alias table.
    AliasesUpdate { data: AliasTable },

    /// A token was presented to a device. Sent for both sources.
    CardRead {
        uid: Identifier,
        source: Source,
        #[serde(rename = "knownName")]
        known_name: Option<String>,
    },

    /// The originating observer's command was applied.
    SaveSuccess,

    /// The originating observer's command failed.
    Error { message: String },
}

impl ServerMessage {
    pub fn aliases_update(table: AliasTable) -> Self {
        Self::AliasesUpdate { data: table }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize into a frame ready to be queued.
    pub fn encode(&self) -> Result<Frame, ProtocolError> {
        Ok(serde_json::to_string(self)?.into())
    }

    /// Wire name of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AliasesUpdate { .. } => "aliases-update",
            Self::CardRead { .. } => "card-read",
            Self::SaveSuccess => "save-success",
            Self::Error { .. } => "error",
        }
    }
}

impl From<ObservedEvent> for ServerMessage {
    fn from(event: ObservedEvent) -> Self {
        Self::CardRead {
            uid: event.identifier,
            source: event.source,
            known_name: event.known_name,
        }
    }
}

/// Command sent by an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverCommand {
    AssignAlias {
        identifier: Identifier,
        name: String,
    },
    AssignAliasBatch {
        identifiers: Vec<Identifier>,
        name: String,
    },
    RemoveAlias {
        identifier: Identifier,
    },
    RemoveAliasBatch {
        identifiers: Vec<Identifier>,
    },
}

/// Wire shape shared by all commands before validation.
#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(rename = "type")]
    kind: String,
    uid: Option<String>,
    uids: Option<Vec<String>>,
    name: Option<String>,
}

impl ObserverCommand {
    /// Decode and validate one text frame.
    ///
    /// ```
    /// use tagbridge_hub::protocol::ObserverCommand;
    ///
    /// let command = ObserverCommand::decode(r#"{"type":"delete-alias","uid":"X1"}"#).unwrap();
    /// assert_eq!(command.kind(), "delete-alias");
    ///
    /// assert!(ObserverCommand::decode(r#"{"type":"save-alias","uid":"X1"}"#).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] for invalid JSON or wrongly typed fields
    /// - [`ProtocolError::UnknownType`] for an unrecognized `type`
    /// - [`ProtocolError::MissingField`] for an absent or empty required field
    /// - [`ProtocolError::EmptyBatch`] for an empty `uids` list
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawCommand = serde_json::from_str(text)?;

        match raw.kind.as_str() {
            "save-alias" => Ok(Self::AssignAlias {
                identifier: identifier(raw.uid)?,
                name: name(raw.name)?,
            }),
            "save-batch-alias" => Ok(Self::AssignAliasBatch {
                identifiers: identifiers(raw.uids)?,
                name: name(raw.name)?,
            }),
            "delete-alias" => Ok(Self::RemoveAlias {
                identifier: identifier(raw.uid)?,
            }),
            "delete-batch-alias" => Ok(Self::RemoveAliasBatch {
                identifiers: identifiers(raw.uids)?,
            }),
            _ => Err(ProtocolError::UnknownType(raw.kind)),
        }
    }

    /// Wire name of this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssignAlias { .. } => "save-alias",
            Self::AssignAliasBatch { .. } => "save-batch-alias",
            Self::RemoveAlias { .. } => "delete-alias",
            Self::RemoveAliasBatch { .. } => "delete-batch-alias",
        }
    }
}

fn identifier(uid: Option<String>) -> Result<Identifier, ProtocolError> {
    uid.and_then(|uid| Identifier::new(uid).ok())
        .ok_or(ProtocolError::MissingField("uid"))
}

fn identifiers(uids: Option<Vec<String>>) -> Result<Vec<Identifier>, ProtocolError> {
    let uids = uids.ok_or(ProtocolError::MissingField("uids"))?;
    if uids.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    uids.into_iter()
        .map(|uid| Identifier::new(uid).map_err(|_| ProtocolError::MissingField("uids")))
        .collect()
}

fn name(name: Option<String>) -> Result<String, ProtocolError> {
    name.filter(|name| !name.trim().is_empty())
        .ok_or(ProtocolError::MissingField("name"))
}

/// Observer input that could not be turned into a command.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or fields of the wrong type
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Unrecognized `type`
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// Required field absent or empty
    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),

    /// Batch command with no identifiers
    #[error("Batch command with no identifiers")]
    EmptyBatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::{Value, json};

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn to_value(message: &ServerMessage) -> Value {
        serde_json::from_str(&message.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_aliases_update_shape() {
        let mut table = AliasTable::new();
        table.insert(id("X1"), "Widget".to_string());

        assert_eq!(
            to_value(&ServerMessage::aliases_update(table)),
            json!({"type": "aliases-update", "data": {"X1": "Widget"}})
        );
    }

    #[test]
    fn test_card_read_shape() {
        let message = ServerMessage::CardRead {
            uid: id("A1B2C3"),
            source: Source::Card,
            known_name: Some("Alice".to_string()),
        };
        assert_eq!(
            to_value(&message),
            json!({"type": "card-read", "uid": "A1B2C3", "source": "card", "knownName": "Alice"})
        );
    }

    #[test]
    fn test_unknown_name_is_null() {
        let message = ServerMessage::CardRead {
            uid: id("4006381333931"),
            source: Source::Scanner,
            known_name: None,
        };
        assert_eq!(to_value(&message)["knownName"], Value::Null);
        assert_eq!(to_value(&message)["source"], "scanner");
    }

    #[test]
    fn test_ack_shapes() {
        assert_eq!(to_value(&ServerMessage::SaveSuccess), json!({"type": "save-success"}));
        assert_eq!(
            to_value(&ServerMessage::error("disk full")),
            json!({"type": "error", "message": "disk full"})
        );
    }

    #[test]
    fn test_event_conversion() {
        let event = ObservedEvent::new(id("X1"), Source::Scanner, Some("Widget".to_string()));
        let message = ServerMessage::from(event);
        assert_eq!(message.kind(), "card-read");
    }

    #[test]
    fn test_decode_save_alias() {
        let command =
            ObserverCommand::decode(r#"{"type":"save-alias","uid":"X1","name":"Widget"}"#).unwrap();
        assert_eq!(
            command,
            ObserverCommand::AssignAlias {
                identifier: id("X1"),
                name: "Widget".to_string()
            }
        );
    }

    #[test]
    fn test_decode_batches() {
        let save = ObserverCommand::decode(
            r#"{"type":"save-batch-alias","uids":["A","B"],"name":"Shelf"}"#,
        )
        .unwrap();
        let delete =
            ObserverCommand::decode(r#"{"type":"delete-batch-alias","uids":["A"]}"#).unwrap();

        assert_eq!(
            save,
            ObserverCommand::AssignAliasBatch {
                identifiers: vec![id("A"), id("B")],
                name: "Shelf".to_string()
            }
        );
        assert_eq!(
            delete,
            ObserverCommand::RemoveAliasBatch {
                identifiers: vec![id("A")]
            }
        );
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let command =
            ObserverCommand::decode(r#"{"type":"delete-alias","uid":"X1","name":"ignored","ts":1}"#)
                .unwrap();
        assert_eq!(command, ObserverCommand::RemoveAlias { identifier: id("X1") });
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"uid":"X1"}"#)]
    #[case(r#"{"type":"save-alias","uid":42,"name":"x"}"#)]
    #[case(r#"[1,2,3]"#)]
    fn test_decode_malformed(#[case] text: &str) {
        assert!(matches!(
            ObserverCommand::decode(text),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        assert!(matches!(
            ObserverCommand::decode(r#"{"type":"rename-everything"}"#),
            Err(ProtocolError::UnknownType(kind)) if kind == "rename-everything"
        ));
    }

    #[rstest]
    #[case(r#"{"type":"save-alias","name":"Widget"}"#, "uid")]
    #[case(r#"{"type":"save-alias","uid":"","name":"Widget"}"#, "uid")]
    #[case(r#"{"type":"save-alias","uid":"X1"}"#, "name")]
    #[case(r#"{"type":"save-alias","uid":"X1","name":"  "}"#, "name")]
    #[case(r#"{"type":"delete-alias"}"#, "uid")]
    #[case(r#"{"type":"save-batch-alias","name":"Shelf"}"#, "uids")]
    #[case(r#"{"type":"delete-batch-alias","uids":["A",""]}"#, "uids")]
    fn test_decode_missing_field(#[case] text: &str, #[case] field: &str) {
        assert!(matches!(
            ObserverCommand::decode(text),
            Err(ProtocolError::MissingField(f)) if f == field
        ));
    }

    #[rstest]
    #[case(r#"{"type":"save-batch-alias","uids":[],"name":"Shelf"}"#)]
    #[case(r#"{"type":"delete-batch-alias","uids":[]}"#)]
    fn test_decode_empty_batch(#[case] text: &str) {
        assert!(matches!(
            ObserverCommand::decode(text),
            Err(ProtocolError::EmptyBatch)
        ));
    }
}
