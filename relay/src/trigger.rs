//! Trigger records delivered by the host platform.
//!
//! Each kind carries exactly the fields its handler needs. Triggers arrive as
//! JSON tagged by `kind`:
//!
//! ```json
//! {"kind": "file_written", "node": {"type": "file", "path": "/admin/files/Data/a.xlsx", ...}}
//! ```
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Controller class handling the editor's track callback.
pub const TRACK_CONTROLLER: &str = "OCA\\Onlyoffice\\Controller\\CallbackController";
pub const TRACK_METHOD: &str = "track";
pub const TRACK_URI: &str = "/apps/onlyoffice/track";

/// Controller class serving the editor config.
pub const EDITOR_CONTROLLER: &str = "OCA\\Onlyoffice\\Controller\\EditorApiController";
pub const EDITOR_METHOD: &str = "config";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    FileWritten(FileEvent),
    FileCreated(FileEvent),
    TrackCallback(TrackCallback),
    EditorConfig(EditorConfigResponse),
}

impl Trigger {
    pub const fn kind(&self) -> &'static str {
        match self {
            Trigger::FileWritten(_) => "file_written",
            Trigger::FileCreated(_) => "file_created",
            Trigger::TrackCallback(_) => "track_callback",
            Trigger::EditorConfig(_) => "editor_config",
        }
    }
}

/// The authenticated user of the request that caused the trigger.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SessionUser {
    pub id: String,
    pub display_name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ControllerRef {
    pub class: String,
    pub method: String,
}

impl ControllerRef {
    fn is(&self, class: &str, method: &str) -> bool {
        self.class.contains(class) && self.method == method
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    File(FileNode),
    Folder { path: String },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FileNode {
    pub path: String,
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    /// Modification time, seconds since the epoch.
    #[serde(default)]
    pub mtime: i64,
}

/// Headers and URI of the request that wrote the file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RequestContext {
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub request_uri: String,
    #[serde(default)]
    pub referer: String,
}

impl RequestContext {
    /// Whether the write came from the document editor: its callbacks are
    /// made by a Node.js client, hit the track endpoint, or are referred by
    /// the editor app.
    pub fn is_editor_save(&self) -> bool {
        self.user_agent.contains("Node.js")
            || self.request_uri.contains(TRACK_URI)
            || self.referer.contains("onlyoffice")
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FileEvent {
    pub node: Node,
    #[serde(default)]
    pub request: RequestContext,
    #[serde(default)]
    pub session: Option<SessionUser>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TrackCallback {
    #[serde(default)]
    pub controller: Option<ControllerRef>,
    #[serde(default)]
    pub request_uri: String,
    /// Request parameters as parsed by the host.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Raw request body, used when the host did not parse any parameters.
    #[serde(default)]
    pub body: Option<String>,
    /// The `doc` query parameter.
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub session: Option<SessionUser>,
}

impl TrackCallback {
    pub fn is_track_request(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(|c| c.is(TRACK_CONTROLLER, TRACK_METHOD))
            || self.request_uri.contains(TRACK_URI)
    }

    /// Parsed parameters, falling back to the JSON body.
    pub fn effective_params(&self) -> Map<String, Value> {
        if !self.params.is_empty() {
            return self.params.clone();
        }

        match self.body.as_deref().map(serde_json::from_str::<Value>) {
            Some(Ok(Value::Object(map))) => map,
            _ => Map::new(),
        }
    }

    /// The doc token, unless absent or empty.
    pub fn doc_token(&self) -> Option<&str> {
        self.doc.as_deref().filter(|d| !d.is_empty())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EditorConfigResponse {
    pub controller: ControllerRef,
    /// The JSON body the controller is about to return.
    pub payload: Value,
    #[serde(default)]
    pub session: Option<SessionUser>,
}

impl EditorConfigResponse {
    pub fn is_editor_config(&self) -> bool {
        self.controller.is(EDITOR_CONTROLLER, EDITOR_METHOD)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The trigger does not describe an editor save or config read.
    NotApplicable,
    Disabled,
    Unhealthy,
    PathFiltered,
    NoCallbackUrl,
}

impl SkipReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotApplicable => "not_applicable",
            SkipReason::Disabled => "disabled",
            SkipReason::Unhealthy => "unhealthy",
            SkipReason::PathFiltered => "path_filtered",
            SkipReason::NoCallbackUrl => "no_callback_url",
        }
    }
}

/// What the relay did with a trigger.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Outcome {
    Notified {
        event_type: &'static str,
        file_path: String,
    },
    Rewritten {
        callback_url: String,
        payload: Value,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl Outcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Outcome::Skipped { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_file_event() {
        let trigger: Trigger = serde_json::from_value(json!({
            "kind": "file_written",
            "node": {
                "type": "file",
                "path": "/admin/files/Data/report.xlsx",
                "id": 42,
                "name": "report.xlsx",
                "size": 1024,
                "mime_type": "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "mtime": 1714555800,
            },
            "request": {"user_agent": "Node.js/18"},
            "session": {"id": "alice", "display_name": "Alice"},
        }))
        .unwrap();

        let Trigger::FileWritten(event) = trigger else {
            panic!("expected a file_written trigger");
        };
        assert!(event.request.is_editor_save());
        assert_eq!(event.session.unwrap().id, "alice");
        assert!(matches!(event.node, Node::File(FileNode { id: 42, .. })));
    }

    #[test]
    fn test_parse_folder_and_unknown_kind() {
        let trigger: Trigger = serde_json::from_value(json!({
            "kind": "file_created",
            "node": {"type": "folder", "path": "/admin/files/Data"},
        }))
        .unwrap();
        assert_eq!(trigger.kind(), "file_created");

        assert!(serde_json::from_value::<Trigger>(json!({"kind": "template_rendered"})).is_err());
    }

    #[test]
    fn test_editor_save_detection() {
        let ctx = |ua: &str, uri: &str, referer: &str| RequestContext {
            user_agent: ua.into(),
            request_uri: uri.into(),
            referer: referer.into(),
        };

        assert!(ctx("Node.js", "", "").is_editor_save());
        assert!(ctx("", "/index.php/apps/onlyoffice/track?doc=x", "").is_editor_save());
        assert!(ctx("", "", "https://cloud.example.com/apps/onlyoffice/123").is_editor_save());
        assert!(!ctx("Mozilla/5.0", "/remote.php/webdav/a.xlsx", "").is_editor_save());
    }

    #[test]
    fn test_track_request_detection() {
        let mut callback = TrackCallback {
            controller: Some(ControllerRef {
                class: TRACK_CONTROLLER.into(),
                method: "track".into(),
            }),
            request_uri: "/index.php/apps/files".into(),
            params: Map::new(),
            body: None,
            doc: None,
            session: None,
        };
        assert!(callback.is_track_request());

        callback.controller = None;
        assert!(!callback.is_track_request());

        callback.request_uri = "/index.php/apps/onlyoffice/track".into();
        assert!(callback.is_track_request());
    }

    #[test]
    fn test_effective_params() {
        let mut callback = TrackCallback {
            controller: None,
            request_uri: TRACK_URI.into(),
            params: Map::new(),
            body: Some(r#"{"key": "k1", "status": 2}"#.into()),
            doc: Some(String::new()),
            session: None,
        };
        assert_eq!(callback.effective_params()["key"], "k1");
        assert_eq!(callback.doc_token(), None);

        callback.params.insert("key".into(), json!("from-params"));
        assert_eq!(callback.effective_params()["key"], "from-params");

        callback.params.clear();
        callback.body = Some("not json".into());
        assert!(callback.effective_params().is_empty());
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_value(Outcome::skipped(SkipReason::PathFiltered)).unwrap(),
            json!({"action": "skipped", "reason": "path_filtered"})
        );
    }
}
