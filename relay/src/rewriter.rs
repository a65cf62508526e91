//! Redirects the editor's save callback through the backend.
//!
//! The editor config handed to the browser names the URL the document server
//! calls back on save. The rewriter swaps it for the backend URL and carries
//! the original callback, the file path and optional user metadata along as
//! query parameters.
use crate::clock::iso8601;
use crate::config_store::{ConfigStore, relay_debug};
use crate::token;
use crate::trigger::SessionUser;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use url::form_urlencoded;

#[derive(Clone, Debug, PartialEq)]
pub enum RewriteOutcome {
    Rewritten { callback_url: String },
    /// The payload carries no callback URL.
    NoCallbackUrl,
    /// The resolved file path is outside the configured filter.
    PathFiltered,
}

pub struct CallbackRewriter {
    config: Arc<ConfigStore>,
}

impl CallbackRewriter {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        CallbackRewriter { config }
    }

    /// Rewrites `editorConfig.callbackUrl` in place.
    ///
    /// When a secret is configured and the payload is signed, the `token`
    /// field is recomputed over the rewritten payload. A signing failure
    /// leaves the previous token in place.
    pub fn rewrite(
        &self,
        payload: &mut Value,
        session: Option<&SessionUser>,
        now: DateTime<Utc>,
    ) -> RewriteOutcome {
        let Some(original_callback) = payload
            .pointer("/editorConfig/callbackUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
        else {
            relay_debug!(self.config, "No callbackUrl found in editor config");
            return RewriteOutcome::NoCallbackUrl;
        };

        let file_path = resolve_file_path(payload);
        if !file_path.is_empty() && !self.config.path_matcher().matches(&file_path) {
            relay_debug!(
                self.config,
                file_path = %file_path,
                filter = %self.config.path_filter(),
                "File path does not match filter"
            );
            return RewriteOutcome::PathFiltered;
        }

        let callback_url = self.build_callback_url(&original_callback, &file_path, session, now);
        if let Some(editor_config) = payload
            .get_mut("editorConfig")
            .and_then(Value::as_object_mut)
        {
            editor_config.insert("callbackUrl".into(), Value::String(callback_url.clone()));
        }

        let secret = self.config.secret();
        if !secret.is_empty() {
            resign(payload, &secret);
        }

        relay_debug!(
            self.config,
            original = %original_callback,
            new = %callback_url,
            file_path = %file_path,
            "Callback URL modified"
        );

        RewriteOutcome::Rewritten { callback_url }
    }

    fn build_callback_url(
        &self,
        original_callback: &str,
        file_path: &str,
        session: Option<&SessionUser>,
        now: DateTime<Utc>,
    ) -> String {
        let mut params: IndexMap<&str, String> = IndexMap::new();
        params.insert("nextcloud_callback", original_callback.to_string());

        if !file_path.is_empty() {
            params.insert("file_path", file_path.to_string());
        }

        if self.config.include_user_metadata()
            && let Some(user) = session
        {
            params.insert("user_id", user.id.clone());
            params.insert("user_display_name", user.display_name.clone());
        }

        if self.config.include_timestamp() {
            params.insert("edit_start_time", iso8601(now));
        }

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&params)
            .finish();

        let target = self.config.target_url();
        let separator = if target.contains('?') { '&' } else { '?' };
        format!("{target}{separator}{query}")
    }
}

/// Best-effort file path of the document being opened.
///
/// Configs that carry a document key name the file through `file.path` or
/// `document.title`; others only have the document URL.
fn resolve_file_path(payload: &Value) -> String {
    let non_empty = |pointer: &str| {
        payload
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    let path = if payload.pointer("/document/key").is_some() {
        non_empty("/file/path").or_else(|| non_empty("/document/title"))
    } else {
        non_empty("/document/url")
    };

    path.unwrap_or_default().to_string()
}

/// Recomputes the `token` field of a signed payload.
///
/// The claims are the whole payload as it stands, previous `token` included.
fn resign(payload: &mut Value, secret: &str) {
    if payload.get("token").is_none() {
        return;
    }

    match token::sign(payload, secret) {
        Ok(signed) => {
            payload["token"] = Value::String(signed);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to generate JWT token");
        }
    }
}
