//! Binary wire protocol.
//!
//! Request/response messages are bincode-encoded and travel one per
//! WebSocket binary frame; every request frame gets exactly one response
//! frame, in order. Item ids cross the wire in canonical 8-4-4-4-12
//! textual form and are validated server-side.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use replist_core::{ClientId, ListEntry, ListOp};

/// Client-side intent tag for a submitted edit.
///
/// The server folds `Insert` and `Update` into the same upsert; the
/// distinction only matters to the submitting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditKind::Insert => write!(f, "insert"),
            EditKind::Update => write!(f, "update"),
            EditKind::Delete => write!(f, "delete"),
        }
    }
}

/// One edit submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRequest {
    pub kind: EditKind,
    /// Textual item id; validated on reception.
    pub id: String,
    /// Sort key; ignored for deletes.
    pub value: i32,
}

/// Requests a client may issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Fetch the full snapshot at the latest version.
    GetList { client_id: ClientId },
    /// Fetch the edits upgrading `version` to the latest one.
    GetListUpdates { version: i64 },
    /// Submit a batch of edits for the next commit.
    UpdateList {
        client_id: ClientId,
        version: i64,
        ops: Vec<EditRequest>,
    },
}

/// Responses the server may return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    List { version: i64, items: Vec<ListEntry> },
    ListUpdates { version: i64, ops: Vec<ListOp> },
    /// Batch accepted and queued.
    Ack,
    /// Input validation failed; nothing was queued.
    Error { message: String },
}

/// Wire-level failure.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("encode: {0}")]
    Encode(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("connection closed")]
    ConnectionClosed,
}

impl Request {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (req, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(req)
    }
}

impl Response {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (res, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_request_roundtrip() {
        let req = Request::UpdateList {
            client_id: 7,
            version: 3,
            ops: vec![
                EditRequest { kind: EditKind::Insert, id: Uuid::new_v4().to_string(), value: 5 },
                EditRequest { kind: EditKind::Delete, id: Uuid::new_v4().to_string(), value: 0 },
            ],
        };

        let decoded = Request::decode(&req.encode().unwrap()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_response_roundtrip() {
        let id = Uuid::new_v4();
        let res = Response::ListUpdates {
            version: 4,
            ops: vec![
                ListOp::Insert { id, index: 0, value: 1 },
                ListOp::Update { id, index: 0, new_index: 0, value: 2 },
                ListOp::Delete { id, index: 0 },
            ],
        };

        let decoded = Response::decode(&res.encode().unwrap()).unwrap();
        assert_eq!(decoded, res);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(Request::decode(&[0xff; 16]), Err(ProtocolError::Decode(_))));
        assert!(matches!(Response::decode(&[0xff; 16]), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_edit_kind_tags() {
        assert_eq!(EditKind::Insert.to_string(), "insert");
        assert_eq!(EditKind::Update.to_string(), "update");
        assert_eq!(EditKind::Delete.to_string(), "delete");
    }
}
