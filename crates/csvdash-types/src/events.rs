use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::FileRecord;

/// Event name the server uses for every change to the file list.
pub const CSV_LIST_UPDATED: &str = "csv_list_updated";

/// A message pushed by the server over the realtime channel.
///
/// Only `event` is required. Unknown fields are preserved in `extra` so
/// consumers can inspect payloads this client does not model yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed reading of a `csv_list_updated` event.
#[derive(Debug, Clone, PartialEq)]
pub enum FileListChange {
    Uploaded(FileRecord),
    Deleted(i64),
}

impl EventMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Returns the file-list change this message describes, if any.
    /// An `uploaded` action without a file, or a `deleted` action without a
    /// file id, is not a usable change.
    pub fn file_list_change(&self) -> Option<FileListChange> {
        if self.event != CSV_LIST_UPDATED {
            return None;
        }
        match self.action.as_deref() {
            Some("uploaded") => self.file.clone().map(FileListChange::Uploaded),
            Some("deleted") => self.file_id.map(FileListChange::Deleted),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Authentication handshake, sent immediately after the transport opens
    Auth { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploaded_event_carries_the_file() {
        let text = r#"{
            "event": "csv_list_updated",
            "action": "uploaded",
            "file": {
                "id": 3,
                "filename": "q1.csv",
                "file_size": 10,
                "uploader_id": 1,
                "uploader_username": "admin",
                "uploaded_at": "2024-01-02T03:04:05"
            }
        }"#;
        let msg = EventMessage::parse(text).unwrap();
        match msg.file_list_change() {
            Some(FileListChange::Uploaded(file)) => assert_eq!(file.filename, "q1.csv"),
            other => panic!("unexpected change: {:?}", other),
        }
    }

    #[test]
    fn deleted_event_carries_the_id() {
        let msg =
            EventMessage::parse(r#"{"event":"csv_list_updated","action":"deleted","file_id":9}"#)
                .unwrap();
        assert_eq!(msg.file_list_change(), Some(FileListChange::Deleted(9)));
    }

    #[test]
    fn unknown_events_keep_extra_fields() {
        let msg = EventMessage::parse(r#"{"event":"user_joined","user":"bob"}"#).unwrap();
        assert_eq!(msg.file_list_change(), None);
        assert_eq!(msg.extra.get("user"), Some(&Value::String("bob".into())));
    }

    #[test]
    fn pong_echo_is_not_an_event_message() {
        assert!(EventMessage::parse(r#"{"type":"pong","message":"connected"}"#).is_err());
        assert!(EventMessage::parse("not json").is_err());
    }

    #[test]
    fn auth_handshake_shape() {
        let cmd = ClientCommand::Auth {
            token: "abc".into(),
        };
        let value: Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value, serde_json::json!({"type": "auth", "token": "abc"}));
    }
}
