//! Wire messages exchanged with the server.
//!
//! Every frame is one JSON object with a `command` field naming its kind:
//!
//! | command | direction | fields |
//! |---------|-----------|--------|
//! | `identify` | server → can | none (challenge) |
//! | `identify` | can → server | `username`, `password` |
//! | `echo` | both | `message` |
//! | `info` | server → can | `message` |
//! | `rotate` | server → can | `position` or `category` |
//! | `error` | server → can | `code` |
//!
//! The server also sends bare `{"error": code}` objects without a `command`
//! field; these decode as [`ServerCommand::Error`].
//!
//! # Example
//!
//! ```
//! use smart_can::messages::{decode_frame, ServerCommand};
//!
//! let cmd = decode_frame(r#"{"command": "rotate", "position": 2}"#).unwrap();
//! assert!(matches!(cmd, ServerCommand::Rotate { .. }));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Error codes the server uses when it refuses device credentials
pub const REJECTED_CREDENTIAL_CODES: [&str; 3] = ["INVALID_CREDENTIALS", "AUTH_FAILED", "UNAUTHORIZED"];

// ============================================================================
// Inbound
// ============================================================================

/// A command received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ServerCommand {
    /// Challenge: reply with the stored credentials.
    Identify,
    /// Send `message` straight back.
    Echo {
        /// Payload to return.
        #[serde(default)]
        message: Value,
    },
    /// Informational text, logged only.
    Info {
        /// Text to log.
        #[serde(default)]
        message: Value,
    },
    /// Open the lid over a bin.
    Rotate {
        /// Bin number, as a number or numeric string.
        #[serde(default)]
        position: Option<Value>,
        /// Category identifier, looked up in the category table.
        #[serde(default)]
        category: Option<Value>,
    },
    /// The server reports a problem.
    Error {
        /// Server error code.
        #[serde(default)]
        code: Value,
    },
}

const KNOWN_COMMANDS: [&str; 5] = ["identify", "echo", "info", "rotate", "error"];

impl ServerCommand {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            ServerCommand::Identify => "identify",
            ServerCommand::Echo { .. } => "echo",
            ServerCommand::Info { .. } => "info",
            ServerCommand::Rotate { .. } => "rotate",
            ServerCommand::Error { .. } => "error",
        }
    }
}

/// Decode one text frame.
pub fn decode_frame(frame: &str) -> Result<ServerCommand, ProtocolError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    let name = match object.get("command") {
        Some(Value::String(name)) => name.clone(),
        Some(other) => return Err(ProtocolError::UnknownCommand(other.to_string())),
        None => {
            return match object.get("error") {
                Some(code) => Ok(ServerCommand::Error { code: code.clone() }),
                None => Err(ProtocolError::MissingCommand),
            }
        }
    };
    if !KNOWN_COMMANDS.contains(&name.as_str()) {
        return Err(ProtocolError::UnknownCommand(name));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidField {
        command: name,
        reason: e.to_string(),
    })
}

/// Turn a rotate command's target into a bin number.
///
/// `position` wins over `category`. Positions are bin numbers, either JSON
/// numbers or numeric strings. Categories are looked up in `categories`;
/// unmapped numeric identifiers fall back to being bin numbers.
///
/// The bin is not range-checked here.
pub fn resolve_rotate_target(
    position: Option<&Value>,
    category: Option<&Value>,
    categories: &BTreeMap<String, u8>,
) -> Result<u8, ProtocolError> {
    match (position, category) {
        (Some(position), _) if !position.is_null() => {
            bin_number(position).ok_or_else(|| ProtocolError::InvalidTarget(position.to_string()))
        }
        (_, Some(category)) if !category.is_null() => {
            let key = match category {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            categories
                .get(&key)
                .copied()
                .or_else(|| bin_number(category))
                .ok_or(ProtocolError::UnknownCategory(key))
        }
        _ => Err(ProtocolError::InvalidTarget(
            "rotate names neither position nor category".into(),
        )),
    }
}

fn bin_number(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// True if an `error` code means the server refused the credentials.
pub fn is_rejected_credentials(code: &Value) -> bool {
    match code {
        Value::String(s) => REJECTED_CREDENTIAL_CODES
            .iter()
            .any(|c| c.eq_ignore_ascii_case(s.trim())),
        Value::Number(n) => matches!(n.as_u64(), Some(401 | 403)),
        _ => false,
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Credential reply to an identify challenge.
///
/// ```json
/// {"command": "identify", "username": "0d7e6f1c...", "password": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename = "identify")]
pub struct IdentifyReply {
    /// Device id without hyphens
    pub username: String,
    /// Server-issued password
    pub password: String,
}

/// Reply to an echo command.
///
/// ```json
/// {"message": "ping"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoReply {
    /// The payload received
    pub message: Value,
}

/// Serialize an identify reply.
pub fn identify_frame(username: &str, password: &str) -> Result<String, ProtocolError> {
    encode(&IdentifyReply {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Serialize an echo reply.
pub fn echo_frame(message: &Value) -> Result<String, ProtocolError> {
    encode(&EchoReply {
        message: message.clone(),
    })
}

fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_identify_challenge() {
        assert_eq!(
            decode_frame(r#"{"command":"identify"}"#).unwrap(),
            ServerCommand::Identify
        );
    }

    #[test]
    fn command_names_match_wire_tags() {
        for name in KNOWN_COMMANDS {
            let frame = match name {
                "rotate" => format!(r#"{{"command":"{name}","position":1}}"#),
                _ => format!(r#"{{"command":"{name}"}}"#),
            };
            assert_eq!(decode_frame(&frame).unwrap().name(), name, "{frame}");
        }
    }

    #[test]
    fn decode_echo() {
        assert_eq!(
            decode_frame(r#"{"command":"echo","message":"ping"}"#).unwrap(),
            ServerCommand::Echo {
                message: json!("ping")
            }
        );
    }

    #[test]
    fn decode_rotate_with_extra_fields() {
        let cmd = decode_frame(r#"{"command":"rotate","position":"1","vote_id":7}"#).unwrap();
        assert_eq!(
            cmd,
            ServerCommand::Rotate {
                position: Some(json!("1")),
                category: None
            }
        );
    }

    #[test]
    fn decode_bare_error() {
        assert_eq!(
            decode_frame(r#"{"error":"INVALID_CREDENTIALS"}"#).unwrap(),
            ServerCommand::Error {
                code: json!("INVALID_CREDENTIALS")
            }
        );
    }

    #[test]
    fn decode_failures() {
        assert!(matches!(
            decode_frame("hello"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert_eq!(decode_frame("[1,2]"), Err(ProtocolError::NotAnObject));
        assert_eq!(
            decode_frame(r#"{"message":"x"}"#),
            Err(ProtocolError::MissingCommand)
        );
        assert_eq!(
            decode_frame(r#"{"command":"dance"}"#),
            Err(ProtocolError::UnknownCommand("dance".into()))
        );
        assert!(matches!(
            decode_frame(r#"{"command":"rotate","position":{"a":1}}"#),
            Ok(ServerCommand::Rotate { .. })
        ));
    }

    #[test]
    fn rotate_target_from_position() {
        let table = BTreeMap::new();
        assert_eq!(resolve_rotate_target(Some(&json!(2)), None, &table), Ok(2));
        assert_eq!(resolve_rotate_target(Some(&json!(" 1 ")), None, &table), Ok(1));
        assert!(matches!(
            resolve_rotate_target(Some(&json!(-1)), None, &table),
            Err(ProtocolError::InvalidTarget(_))
        ));
        assert!(matches!(
            resolve_rotate_target(Some(&json!(1000)), None, &table),
            Err(ProtocolError::InvalidTarget(_))
        ));
    }

    #[test]
    fn rotate_target_from_category() {
        let mut table = BTreeMap::new();
        table.insert("recycling".to_string(), 1);
        table.insert("7".to_string(), 2);

        assert_eq!(
            resolve_rotate_target(None, Some(&json!("recycling")), &table),
            Ok(1)
        );
        assert_eq!(resolve_rotate_target(None, Some(&json!(7)), &table), Ok(2));
        assert_eq!(resolve_rotate_target(None, Some(&json!("0")), &table), Ok(0));
        assert_eq!(
            resolve_rotate_target(None, Some(&json!("glass")), &table),
            Err(ProtocolError::UnknownCategory("glass".into()))
        );
    }

    #[test]
    fn rotate_target_position_wins() {
        let mut table = BTreeMap::new();
        table.insert("compost".to_string(), 2);
        assert_eq!(
            resolve_rotate_target(Some(&json!(0)), Some(&json!("compost")), &table),
            Ok(0)
        );
        assert_eq!(
            resolve_rotate_target(Some(&Value::Null), Some(&json!("compost")), &table),
            Ok(2)
        );
        assert!(resolve_rotate_target(None, None, &table).is_err());
    }

    #[test]
    fn rejected_credential_codes() {
        assert!(is_rejected_credentials(&json!("INVALID_CREDENTIALS")));
        assert!(is_rejected_credentials(&json!("unauthorized")));
        assert!(is_rejected_credentials(&json!(401)));
        assert!(!is_rejected_credentials(&json!("RATE_LIMITED")));
        assert!(!is_rejected_credentials(&json!(500)));
    }

    #[test]
    fn outbound_frames() {
        let frame = identify_frame("abc123", "hunter2").unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"command": "identify", "username": "abc123", "password": "hunter2"})
        );

        assert_eq!(echo_frame(&json!("ping")).unwrap(), r#"{"message":"ping"}"#);
    }
}
