//! Administrative endpoint.
//!
//! Every request to the `admin` document type must come from a confirmed
//! session whose email is in the admin set. `POST /admin` carries an
//! `{"opcode": ...}` body and is answered by the gateway. Any other method
//! gets 405; nothing under `admin` is forwarded to the backend.

use axum::http::{header, HeaderValue, Method, StatusCode};
use futures_util::future;
use serde_json::Value;
use std::sync::Arc;

use crate::hooks::{HandlerModule, HookPoint, HookResult, Stage};
use crate::http::ProxyRequest;
use crate::lifecycle::Shutdown;
use crate::modules::{sessions, AdminSet};
use crate::signal::{ControlSignal, Flow};

pub const NAME: &str = "admin";

const ADMIN_TYPE: &str = "admin";

/// Operations accepted by `POST /admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Shutdown,
}

impl Opcode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "shutdown" => Some(Opcode::Shutdown),
            _ => None,
        }
    }
}

pub fn module(admins: Arc<AdminSet>, shutdown: Shutdown) -> HandlerModule {
    HandlerModule::new(NAME)
        .on(HookPoint::typed(ADMIN_TYPE, Stage::Url), move |req| {
            let admins = admins.clone();
            Box::pin(async move { require_admin(req, &admins).await })
        })
        .on(HookPoint::typed(ADMIN_TYPE, Stage::Pre), |req| {
            Box::pin(future::ready(Ok(reject_non_post(req))))
        })
        .on(
            HookPoint::method(ADMIN_TYPE, Method::POST, Stage::Pre),
            move |req| {
                let flow = execute(req, &shutdown);
                Box::pin(async move { flow })
            },
        )
}

async fn require_admin(req: &mut ProxyRequest, admins: &AdminSet) -> HookResult {
    let Some(session) = sessions::authenticate(req).await else {
        tracing::info!(peer = %req.peer, "Admin request without session");
        return Ok(Flow::Abort(ControlSignal::unauthorized()));
    };

    let email = session.get_str("email").unwrap_or_default();
    if !admins.contains(email) {
        tracing::warn!(email, peer = %req.peer, "Admin request from non-admin");
        return Ok(Flow::Abort(ControlSignal::forbidden()));
    }

    Ok(Flow::Continue)
}

fn reject_non_post(req: &mut ProxyRequest) -> Flow {
    if req.method == Method::POST {
        return Flow::Continue;
    }
    tracing::debug!(method = %req.method, "Admin request with unsupported method");
    req.response
        .headers
        .insert(header::ALLOW, HeaderValue::from_static("POST"));
    Flow::Abort(ControlSignal::new(StatusCode::METHOD_NOT_ALLOWED))
}

fn execute(req: &mut ProxyRequest, shutdown: &Shutdown) -> HookResult {
    let Some(raw) = req
        .json
        .as_ref()
        .and_then(|body| body.get("opcode"))
        .and_then(Value::as_str)
    else {
        tracing::debug!("Admin request without opcode");
        return Ok(Flow::Abort(ControlSignal::bad_request()));
    };

    match Opcode::parse(raw) {
        Some(Opcode::Shutdown) => {
            tracing::warn!(peer = %req.peer, "Shutdown requested through admin endpoint");
            shutdown.trigger();
        }
        None => tracing::warn!(opcode = raw, "Unknown admin opcode"),
    }

    Ok(Flow::Abort(ControlSignal::ok()))
}
