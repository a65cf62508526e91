use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A file was written through the editor.
    FileUpdated,
    /// The editor reported document state to the track endpoint.
    #[serde(rename = "onlyoffice_track")]
    Track,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::FileUpdated => "file_updated",
            EventType::Track => "onlyoffice_track",
        }
    }
}

/// File ids are numeric on the host but arrive as strings inside some tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileId {
    Numeric(u64),
    Text(String),
}

impl FileId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(FileId::Numeric),
            Value::String(s) if !s.is_empty() => Some(FileId::Text(s.clone())),
            _ => None,
        }
    }
}

/// Everything known about one intercepted event. Serialized as the JSON body
/// of the outbound notification.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CallbackMetadata {
    pub event_type: Option<EventType>,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    /// Set for track callbacks only.
    #[serde(flatten)]
    pub track: Option<TrackFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_user_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_timestamp: Option<String>,
}

/// Fields of a track notification. Every key is sent, as `null` when the
/// callback or its doc token did not carry a value.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrackFields {
    pub url: Option<String>,
    pub key: Option<String>,
    pub status: Option<Value>,
    pub callback_time: String,
    pub users: Option<Value>,
    pub actions: Option<Value>,
    pub doc_token_present: bool,
    /// The file id recorded in the doc token.
    #[serde(rename = "file_id")]
    pub doc_file_id: Option<FileId>,
    pub owner_id: Option<String>,
    pub user_id_from_doc: Option<String>,
}

impl CallbackMetadata {
    /// User to report for this event: the explicit user, then the session
    /// user, then the user recovered from the doc token.
    pub fn resolved_user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.session_user_id.as_deref())
            .or(self.track.as_ref().and_then(|t| t.user_id_from_doc.as_deref()))
    }

    pub fn key(&self) -> Option<&str> {
        self.track.as_ref().and_then(|t| t.key.as_deref())
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.track.as_ref().and_then(|t| t.owner_id.as_deref())
    }
}

/// String form of a scalar JSON value. Numbers are rendered, everything else
/// that is not a string yields `None`.
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
