use crate::http::{full_body, make_error_response};
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;

/// Serves the liveness (`/health`) and readiness (`/ready`) probes and hands
/// every other request to the wrapped service.
pub struct AdminService<F, S> {
    is_ready: F,
    inner: S,
}

impl<F, S> AdminService<F, S>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F, inner: S) -> Self {
        Self { is_ready, inner }
    }
}

impl<F, S, B, E> Service<Request<B>> for AdminService<F, S>
where
    F: Fn() -> bool,
    S: Service<Request<B>, Response = Response<BoxBody<Bytes, E>>, Error = E>,
    S::Future: Send + 'static,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let probe = match req.uri().path() {
            "/health" => Some(true),
            "/ready" => Some((self.is_ready)()),
            _ => None,
        };

        match probe {
            Some(true) => Box::pin(async move { Ok(Response::new(full_body("ok\n"))) }),
            Some(false) => Box::pin(async move {
                Ok(make_error_response(StatusCode::SERVICE_UNAVAILABLE))
            }),
            None => Box::pin(self.inner.call(req)),
        }
    }
}
