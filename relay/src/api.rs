//! HTTP surfaces of the relay.
//!
//! The ingress listener accepts trigger deliveries from the host platform on
//! `POST /triggers`. The admin listener serves the settings API next to the
//! liveness and readiness probes.
use crate::dispatcher::Dispatcher;
use crate::errors::RelayError;
use crate::settings::Settings;
use crate::trigger::Trigger;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use shared::http::{json_response, make_error_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type RelayResponse = Response<BoxBody<Bytes, RelayError>>;
type RelayFuture = Pin<Box<dyn Future<Output = Result<RelayResponse, RelayError>> + Send + 'static>>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
}

fn error_response(status_code: StatusCode, message: &str) -> RelayResponse {
    json_response(
        status_code,
        &ErrorBody {
            status: "error",
            message,
        },
    )
}

/// Reads the whole request body as JSON.
async fn deserialize_body<B, T>(body: B) -> Result<T, String>
where
    B: Body,
    B::Error: std::fmt::Display,
    T: DeserializeOwned,
{
    let bytes = body
        .collect()
        .await
        .map_err(|e| format!("Failed to read request body: {e}"))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| format!("Invalid request body: {e}"))
}

pub struct IngressService {
    dispatcher: Arc<Dispatcher>,
}

impl IngressService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        IngressService { dispatcher }
    }
}

impl<B> Service<Request<B>> for IngressService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    type Response = RelayResponse;
    type Error = RelayError;
    type Future = RelayFuture;

    fn call(&self, req: Request<B>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();

        Box::pin(async move {
            if req.uri().path() != "/triggers" {
                return Ok(make_error_response(StatusCode::NOT_FOUND));
            }
            if req.method() != Method::POST {
                return Ok(make_error_response(StatusCode::METHOD_NOT_ALLOWED));
            }

            let trigger: Trigger = match deserialize_body(req.into_body()).await {
                Ok(trigger) => trigger,
                Err(message) => {
                    tracing::warn!(%message, "Rejected trigger");
                    return Ok(error_response(StatusCode::BAD_REQUEST, &message));
                }
            };

            let outcome = dispatcher.dispatch(trigger).await;
            Ok(json_response(StatusCode::OK, &outcome))
        })
    }
}

/// Settings API served behind the admin probes.
pub struct SettingsService {
    settings: Arc<Settings>,
}

impl SettingsService {
    pub fn new(settings: Arc<Settings>) -> Self {
        SettingsService { settings }
    }
}

impl<B> Service<Request<B>> for SettingsService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    type Response = RelayResponse;
    type Error = RelayError;
    type Future = RelayFuture;

    fn call(&self, req: Request<B>) -> Self::Future {
        let settings = self.settings.clone();

        Box::pin(async move {
            let response = match (req.method(), req.uri().path()) {
                (&Method::GET, "/settings") => json_response(
                    StatusCode::OK,
                    &json!({"status": "success", "config": settings.get_config()}),
                ),
                (&Method::POST, "/settings") => {
                    let update: Value = match deserialize_body(req.into_body()).await {
                        Ok(update) => update,
                        Err(message) => {
                            return Ok(error_response(StatusCode::BAD_REQUEST, &message));
                        }
                    };

                    match settings.save_settings(&update).await {
                        Ok(()) => json_response(
                            StatusCode::OK,
                            &json!({"status": "success", "message": "Settings saved successfully"}),
                        ),
                        Err(e) => error_response(e.status_code(), &e.to_string()),
                    }
                }
                (&Method::GET | &Method::POST, "/health-check") => {
                    let status = settings.test_health_check().await;
                    json_response(
                        StatusCode::OK,
                        &json!({"status": "success", "health_check": status}),
                    )
                }
                (_, "/settings" | "/health-check") => {
                    make_error_response(StatusCode::METHOD_NOT_ALLOWED)
                }
                _ => make_error_response(StatusCode::NOT_FOUND),
            };

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::{ConfigStore, keys};
    use crate::health::HealthGate;
    use crate::notifier::NotificationDispatcher;
    use crate::store::MemoryStore;
    use http_body_util::Full;
    use shared::admin_service::AdminService;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Services {
        config: Arc<ConfigStore>,
        ingress: IngressService,
        settings: SettingsService,
    }

    fn services() -> Services {
        let config = Arc::new(ConfigStore::new(Arc::new(MemoryStore::default())));
        let health = Arc::new(HealthGate::new(config.clone()).unwrap());
        let notifier = Arc::new(NotificationDispatcher::new(config.clone()).unwrap());
        let dispatcher = Arc::new(Dispatcher::new(config.clone(), health.clone(), notifier));
        let settings = Arc::new(Settings::new(config.clone(), health));

        Services {
            config,
            ingress: IngressService::new(dispatcher),
            settings: SettingsService::new(settings),
        }
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn json_body(response: RelayResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_file_save_is_relayed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(query_param("file_path", "/admin/files/Data/report.xlsx"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let s = services();
        let update = json!({
            "enabled": true,
            "django_callback_url": format!("{}/hook", mock_server.uri()),
            "health_check_enabled": false,
        });
        let res = s
            .settings
            .call(request(Method::POST, "/settings", &update.to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let trigger = json!({
            "kind": "file_written",
            "node": {"type": "file", "path": "/admin/files/Data/report.xlsx", "id": 7, "name": "report.xlsx"},
            "request": {"user_agent": "Node.js/18"},
        });
        let res = s
            .ingress
            .call(request(Method::POST, "/triggers", &trigger.to_string()))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            json_body(res).await,
            json!({
                "action": "notified",
                "event_type": "file_updated",
                "file_path": "/admin/files/Data/report.xlsx",
            })
        );
    }

    #[tokio::test]
    async fn test_editor_config_is_rewritten_and_resigned() {
        let s = services();
        s.config.set(keys::ENABLED, "true").unwrap();
        s.config.set(keys::HEALTH_CHECK_ENABLED, "false").unwrap();
        s.config
            .set(keys::TARGET_URL, "https://backend.example.com/hook")
            .unwrap();
        s.config.set(keys::SECRET, "s3cret").unwrap();

        let original = "https://cloud.example.com/apps/onlyoffice/track?doc=abc";
        let mut payload = json!({
            "document": {"key": "doc-key", "title": "report.xlsx"},
            "file": {"path": "/Data/report.xlsx"},
            "editorConfig": {"callbackUrl": original},
        });
        let old_token = crate::token::sign(&payload, "s3cret").unwrap();
        payload["token"] = json!(old_token);

        let trigger = json!({
            "kind": "editor_config",
            "controller": {"class": "OCA\\Onlyoffice\\Controller\\EditorApiController", "method": "config"},
            "payload": payload,
        });
        let res = s
            .ingress
            .call(request(Method::POST, "/triggers", &trigger.to_string()))
            .await
            .unwrap();
        let body = json_body(res).await;

        assert_eq!(body["action"], "rewritten");
        let callback_url = body["callback_url"].as_str().unwrap();
        assert!(callback_url.contains(
            "nextcloud_callback=https%3A%2F%2Fcloud.example.com%2Fapps%2Fonlyoffice%2Ftrack%3Fdoc%3Dabc&file_path=%2FData%2Freport.xlsx"
        ));
        assert_eq!(body["payload"]["editorConfig"]["callbackUrl"], callback_url);
        let new_token = body["payload"]["token"].as_str().unwrap();
        assert_ne!(new_token, old_token);

        let claims = crate::token::decode(new_token).unwrap();
        assert_eq!(claims["token"], json!(old_token));
        assert_eq!(claims["editorConfig"]["callbackUrl"], callback_url);
    }

    #[tokio::test]
    async fn test_ingress_rejects_bad_requests() {
        let s = services();

        let res = s
            .ingress
            .call(request(Method::POST, "/triggers", "{\"kind\": \"unknown\"}"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["status"], "error");

        let res = s
            .ingress
            .call(request(Method::GET, "/triggers", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

        let res = s
            .ingress
            .call(request(Method::POST, "/elsewhere", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_api() {
        let s = services();
        s.config.set(keys::SECRET, "s3cret").unwrap();

        let res = s
            .settings
            .call(request(Method::GET, "/settings", ""))
            .await
            .unwrap();
        let body = json_body(res).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["config"]["onlyoffice_secret"], "********");
        assert_eq!(body["config"]["auth_token"], "");
        assert_eq!(body["config"]["path_filter"], "/Data/");

        let res = s
            .settings
            .call(request(Method::POST, "/settings", r#"{"enabled": true}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(res).await,
            json!({
                "status": "error",
                "message": "Callback URL is required when interceptor is enabled",
            })
        );

        let res = s
            .settings
            .call(request(Method::POST, "/settings", "not json"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_check_endpoint() {
        let s = services();

        let res = s
            .settings
            .call(request(Method::GET, "/health-check", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["health_check"]["healthy"], false);
        assert_eq!(
            body["health_check"]["message"],
            "Health check URL not configured"
        );
    }

    #[tokio::test]
    async fn test_admin_probes_wrap_settings() {
        let s = services();
        let config = s.config.clone();
        let admin = AdminService::new(move || config.is_available(), s.settings);

        let res = admin.call(request(Method::GET, "/ready", "")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = admin
            .call(request(Method::GET, "/settings", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
