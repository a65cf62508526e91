//! Routes triggers to the relay action they call for.
//!
//! Every trigger passes the same gates in order: it must describe an editor
//! save or config read, the relay must be enabled, the backend must be
//! healthy and the file must be in scope. Only then is a notification sent
//! or the editor config rewritten.
use crate::clock::{iso8601, iso8601_from_epoch};
use crate::config_store::{ConfigStore, relay_debug};
use crate::health::HealthGate;
use crate::metadata::{CallbackMetadata, EventType, FileId, TrackFields, value_to_string};
use crate::metrics_defs::{CALLBACKS_REWRITTEN, TRIGGERS_RECEIVED, TRIGGERS_SKIPPED};
use crate::notifier::Notifier;
use crate::rewriter::{CallbackRewriter, RewriteOutcome};
use crate::token::DocClaims;
use crate::trigger::{
    EditorConfigResponse, FileEvent, Node, Outcome, SessionUser, SkipReason, TrackCallback,
    Trigger,
};
use chrono::Utc;
use serde_json::{Map, Value};
use shared::counter;
use std::sync::Arc;

pub struct Dispatcher {
    config: Arc<ConfigStore>,
    health: Arc<HealthGate>,
    rewriter: CallbackRewriter,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ConfigStore>,
        health: Arc<HealthGate>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Dispatcher {
            rewriter: CallbackRewriter::new(config.clone()),
            config,
            health,
            notifier,
        }
    }

    pub async fn dispatch(&self, trigger: Trigger) -> Outcome {
        let kind = trigger.kind();
        counter!(TRIGGERS_RECEIVED, "kind" => kind).increment(1);
        relay_debug!(self.config, kind, "Trigger received");

        let outcome = match trigger {
            Trigger::FileWritten(event) | Trigger::FileCreated(event) => {
                self.on_file_event(event).await
            }
            Trigger::TrackCallback(callback) => self.on_track_callback(callback).await,
            Trigger::EditorConfig(response) => self.on_editor_config(response).await,
        };

        match &outcome {
            Outcome::Skipped { reason } => {
                relay_debug!(self.config, kind, reason = reason.as_str(), "Trigger skipped");
                counter!(TRIGGERS_SKIPPED, "reason" => reason.as_str()).increment(1);
            }
            Outcome::Rewritten { .. } => counter!(CALLBACKS_REWRITTEN).increment(1),
            Outcome::Notified { .. } => {}
        }

        outcome
    }

    /// Enabled and health gates shared by every trigger kind.
    async fn gate(&self) -> Result<(), SkipReason> {
        if !self.config.is_enabled() {
            relay_debug!(self.config, "Interceptor is disabled");
            return Err(SkipReason::Disabled);
        }

        if !self.health.check_if_needed().await {
            relay_debug!(self.config, "Backend is unhealthy, skipping interception");
            return Err(SkipReason::Unhealthy);
        }

        Ok(())
    }

    fn in_scope(&self, file_path: &str) -> bool {
        if self.config.path_matcher().matches(file_path) {
            return true;
        }

        relay_debug!(
            self.config,
            file_path,
            filter = %self.config.path_filter(),
            "File path does not match filter"
        );
        false
    }

    async fn on_file_event(&self, event: FileEvent) -> Outcome {
        let Node::File(file) = event.node else {
            return Outcome::skipped(SkipReason::NotApplicable);
        };

        if !event.request.is_editor_save() {
            relay_debug!(
                self.config,
                file_path = %file.path,
                user_agent = %event.request.user_agent,
                "Not an editor save"
            );
            return Outcome::skipped(SkipReason::NotApplicable);
        }

        if let Err(reason) = self.gate().await {
            return Outcome::skipped(reason);
        }

        if !self.in_scope(&file.path) {
            return Outcome::skipped(SkipReason::PathFiltered);
        }

        let mut metadata = CallbackMetadata {
            event_type: Some(EventType::FileUpdated),
            tracking_prefix: self.tracking_prefix(&file.path),
            file_id: Some(FileId::Numeric(file.id)),
            file_name: Some(file.name),
            file_size: Some(file.size),
            mime_type: Some(file.mime_type),
            modified_time: iso8601_from_epoch(file.mtime),
            file_path: file.path,
            ..Default::default()
        };

        if self.config.include_user_metadata()
            && let Some(user) = event.session
        {
            metadata.user_id = Some(user.id);
            metadata.user_display_name = Some(user.display_name);
        }

        if self.config.include_timestamp() {
            metadata.event_timestamp = Some(iso8601(Utc::now()));
        }

        self.notify(metadata).await
    }

    async fn on_track_callback(&self, callback: TrackCallback) -> Outcome {
        if !callback.is_track_request() {
            return Outcome::skipped(SkipReason::NotApplicable);
        }

        if let Err(reason) = self.gate().await {
            return Outcome::skipped(reason);
        }

        let params = callback.effective_params();
        let doc_token = callback.doc_token();
        let claims = doc_token.map(DocClaims::from_token).unwrap_or_default();

        let file_path = track_file_path(&params, &claims);
        if !file_path.is_empty() && !self.in_scope(&file_path) {
            return Outcome::skipped(SkipReason::PathFiltered);
        }

        let mut metadata = CallbackMetadata {
            event_type: Some(EventType::Track),
            tracking_prefix: self.tracking_prefix(&file_path),
            file_path,
            track: Some(TrackFields {
                url: params.get("url").and_then(value_to_string),
                key: params.get("key").and_then(value_to_string),
                status: params.get("status").cloned(),
                callback_time: iso8601(Utc::now()),
                users: params.get("users").cloned(),
                actions: params.get("actions").cloned(),
                doc_token_present: doc_token.is_some(),
                doc_file_id: claims.file_id,
                owner_id: claims.owner_id,
                user_id_from_doc: claims.user_id,
            }),
            doc_token: doc_token.map(str::to_string),
            ..Default::default()
        };

        if let Some(SessionUser { id, display_name }) = callback.session {
            metadata.session_user_id = Some(id);
            metadata.session_user_display_name = Some(display_name);
        }

        self.notify(metadata).await
    }

    async fn on_editor_config(&self, response: EditorConfigResponse) -> Outcome {
        if !response.is_editor_config() {
            return Outcome::skipped(SkipReason::NotApplicable);
        }

        if let Err(reason) = self.gate().await {
            return Outcome::skipped(reason);
        }

        let mut payload = response.payload;
        match self
            .rewriter
            .rewrite(&mut payload, response.session.as_ref(), Utc::now())
        {
            RewriteOutcome::Rewritten { callback_url } => Outcome::Rewritten {
                callback_url,
                payload,
            },
            RewriteOutcome::NoCallbackUrl => Outcome::skipped(SkipReason::NoCallbackUrl),
            RewriteOutcome::PathFiltered => Outcome::skipped(SkipReason::PathFiltered),
        }
    }

    async fn notify(&self, metadata: CallbackMetadata) -> Outcome {
        relay_debug!(self.config, metadata = ?metadata, "Sending notification");
        self.notifier.notify(&metadata).await;

        Outcome::Notified {
            event_type: metadata.event_type.unwrap_or(EventType::FileUpdated).as_str(),
            file_path: metadata.file_path,
        }
    }

    fn tracking_prefix(&self, file_path: &str) -> Option<String> {
        self.config
            .path_matcher()
            .tracking_prefix(file_path)
            .map(str::to_string)
    }
}

/// File path of a track callback: the request's own `filePath` or `path`,
/// then the path recorded in the doc token.
fn track_file_path(params: &Map<String, Value>, claims: &DocClaims) -> String {
    ["filePath", "path"]
        .iter()
        .filter_map(|key| params.get(*key).and_then(value_to_string))
        .chain(claims.file_path.clone())
        .find(|path| !path.is_empty())
        .unwrap_or_default()
}
