//! CORS preflight for the session endpoint.
//!
//! `OPTIONS /session` is answered by the gateway itself and never reaches
//! the backend.

use axum::http::{HeaderValue, Method};
use futures_util::future;

use crate::hooks::{HandlerModule, HookPoint, Stage};
use crate::http::ProxyRequest;
use crate::signal::{ControlSignal, Flow};

pub const NAME: &str = "cors";

const ALLOWED_METHODS: &str = "POST, GET, PUT, DELETE, OPTIONS";

pub fn module() -> HandlerModule {
    HandlerModule::new(NAME).on(HookPoint::typed("session", Stage::Url), |req| {
        Box::pin(future::ready(Ok(preflight(req))))
    })
}

fn preflight(req: &mut ProxyRequest) -> Flow {
    if req.method != Method::OPTIONS {
        return Flow::Continue;
    }

    let headers = &mut req.response.headers;
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert("allow", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert("access-control-allow-headers", HeaderValue::from_static("*"));

    Flow::Abort(ControlSignal::ok())
}
