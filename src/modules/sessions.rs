//! Sessions, authentication and confirmation.
//!
//! # Responsibilities
//! - Resolve the `Authorization` header to a confirmed session
//! - Create sessions (`PUT /session`) with a paired confirmation record
//! - Confirm sessions through `?secret=` on the session or the record
//! - Strip private fields from session reads
//!
//! # Documents
//! ```text
//! session:{id}  { email, created, secret, confirm_id, confirmed?, confirmed_by_ip? }
//! confirm:{id}  { session_id, secret, created, confirmed?, confirmed_by_ip? }
//! ```
//!
//! # Design Decisions
//! - Authentication never fails a request: anything short of a confirmed
//!   session is anonymous
//! - The lookup result is cached in the request extensions
//! - Confirmation writes the session first, then the record. The two
//!   writes are independent and a failure of the second is surfaced as-is.

use axum::http::{header, HeaderValue, Method};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::net::IpAddr;
use std::sync::Arc;

use crate::hooks::{HandlerModule, HookPoint, HookResult, Stage};
use crate::http::ProxyRequest;
use crate::modules::AdminSet;
use crate::signal::{ControlSignal, Flow};
use crate::store::{Document, DocumentStore, StoreError};

pub const NAME: &str = "sessions";

pub const SESSION_TYPE: &str = "session";
pub const CONFIRM_TYPE: &str = "confirm";

/// Never returned to any reader.
const DENY: &[&str] = &["secret", "confirm_id"];
/// All a non-owner may see.
const ALLOW: &[&str] = &["_id", "created"];
/// Fields a client may not set when creating a session.
const SERVER_OWNED: &[&str] = &["_id", "_rev", "confirmed", "confirmed_by_ip"];

/// Outcome of authenticating a request, cached per request.
#[derive(Debug, Clone)]
struct Authentication(Option<Document>);

/// Identifiers assigned by the `PUT` pre hook for the finish hook.
#[derive(Debug, Clone)]
struct PendingSession {
    id: String,
    confirm_id: String,
}

/// Result of a confirmation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    AlreadyConfirmed,
    SecretMismatch,
    NotFound,
}

pub fn module(admins: Arc<AdminSet>) -> HandlerModule {
    HandlerModule::new(NAME)
        .on(HookPoint::typed(SESSION_TYPE, Stage::Url), |req| {
            Box::pin(session_url(req))
        })
        .on(
            HookPoint::method(SESSION_TYPE, Method::PUT, Stage::Pre),
            |req| Box::pin(create_session(req)),
        )
        .on(
            HookPoint::method(SESSION_TYPE, Method::PUT, Stage::Finish),
            |req| Box::pin(finish_creation(req)),
        )
        .on(
            HookPoint::method(SESSION_TYPE, Method::GET, Stage::Pre),
            |req| Box::pin(confirm_via_session(req)),
        )
        .on(
            HookPoint::method(SESSION_TYPE, Method::GET, Stage::Finish),
            move |req| {
                let admins = admins.clone();
                Box::pin(async move { filter_read(req, &admins).await })
            },
        )
        .on(HookPoint::typed(CONFIRM_TYPE, Stage::Pre), |req| {
            Box::pin(confirm_via_record(req))
        })
}

/// Session key from an `Authorization` value shaped `"<scheme> <realm>:<key>"`.
pub fn session_key(authorization: &str) -> Option<&str> {
    let (_, token) = authorization.trim().split_once(char::is_whitespace)?;
    let (_, key) = token.trim().split_once(':')?;
    Some(key).filter(|k| !k.is_empty())
}

/// The confirmed session behind the request's credentials, if any.
///
/// The first call hits the store; later calls on the same request reuse
/// the result.
pub async fn authenticate(req: &mut ProxyRequest) -> Option<Document> {
    if let Some(Authentication(session)) = req.extensions.get::<Authentication>() {
        return session.clone();
    }

    let session = lookup_session(req).await;
    req.extensions.insert(Authentication(session.clone()));
    session
}

async fn lookup_session(req: &ProxyRequest) -> Option<Document> {
    let key = session_key(req.header_str(header::AUTHORIZATION)?)?;
    let database = req.route.database.as_deref()?;

    match req.store.get(database, &format!("{SESSION_TYPE}:{key}")).await {
        Ok(Some(session)) if session.contains("confirmed") => {
            tracing::debug!(session = %key, "Authenticated");
            Some(session)
        }
        Ok(Some(_)) => {
            tracing::debug!(session = %key, "Session not confirmed");
            None
        }
        Ok(None) => {
            tracing::debug!(session = %key, "Unknown session");
            None
        }
        Err(e) => {
            tracing::warn!(session = %key, error = %e, "Session lookup failed");
            None
        }
    }
}

async fn session_url(req: &mut ProxyRequest) -> HookResult {
    req.response
        .headers
        .insert("access-control-allow-origin", HeaderValue::from_static("*"));

    authenticate(req).await;

    if req.route.document_id.is_none() {
        let key = req
            .header_str(header::AUTHORIZATION)
            .and_then(session_key)
            .map(str::to_string);
        req.route.document_id = key;
    }

    Ok(Flow::Continue)
}

async fn create_session(req: &mut ProxyRequest) -> HookResult {
    let invalid = || Ok(Flow::Abort(ControlSignal::forbidden().with_message("Invalid Request")));

    if req.route.document_id.is_some() {
        tracing::debug!("Session creation with a document id");
        return invalid();
    }
    let Some(Value::Object(body)) = req.json.as_mut() else {
        tracing::debug!("Session creation without a JSON object");
        return invalid();
    };
    if !body.contains_key("email") {
        tracing::debug!("Session creation without email");
        return invalid();
    }

    for field in SERVER_OWNED {
        body.remove(*field);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let confirm_id = uuid::Uuid::new_v4().to_string();
    body.insert("created".to_string(), Value::String(timestamp()));
    body.insert("secret".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
    body.insert("confirm_id".to_string(), Value::String(confirm_id.clone()));

    tracing::info!(session = %id, "Creating session");
    req.route.document_id = Some(id.clone());
    req.extensions.insert(PendingSession { id, confirm_id });

    Ok(Flow::Continue)
}

async fn finish_creation(req: &mut ProxyRequest) -> HookResult {
    let Some(pending) = req.extensions.remove::<PendingSession>() else {
        return Ok(Flow::Continue);
    };
    if !req.response.status.is_success() {
        tracing::warn!(session = %pending.id, status = %req.response.status, "Backend rejected session");
        return Ok(Flow::Continue);
    }
    let Some(database) = req.route.database.clone() else {
        return Ok(Flow::Continue);
    };

    let secret = uuid::Uuid::new_v4().to_string();
    let mut record = Map::new();
    record.insert("_id".to_string(), json!(format!("{CONFIRM_TYPE}:{}", pending.confirm_id)));
    record.insert("session_id".to_string(), json!(pending.id));
    record.insert("secret".to_string(), json!(secret));
    record.insert("created".to_string(), json!(timestamp()));
    req.store.create(&database, record).await?;

    // Out-of-band delivery of the secret is not handled here.
    tracing::debug!(
        session = %pending.id,
        confirm_id = %pending.confirm_id,
        secret = %secret,
        "Confirmation record created"
    );

    let ok = req
        .response
        .json
        .as_ref()
        .and_then(|v| v.get("ok"))
        .cloned()
        .unwrap_or(Value::Bool(true));
    req.response.json = Some(json!({
        "ok": ok,
        "id": pending.id,
        "confirm_id": pending.confirm_id,
    }));

    Ok(Flow::Continue)
}

async fn confirm_via_session(req: &mut ProxyRequest) -> HookResult {
    let (Some(secret), Some(database), Some(key)) = (
        req.query_param("secret"),
        req.route.database.clone(),
        req.route.document_key(),
    ) else {
        return Ok(Flow::Continue);
    };

    let Some(session) = req.store.get(&database, &key).await? else {
        tracing::debug!(session = %key, "Confirmation for unknown session");
        return Ok(Flow::Continue);
    };
    let Some(confirm_id) = session.get_str("confirm_id") else {
        tracing::debug!(session = %key, "Session has no confirmation record");
        return Ok(Flow::Continue);
    };

    let outcome = confirm(
        req.store.as_ref(),
        &database,
        confirm_id,
        &secret,
        req.peer.ip(),
    )
    .await?;
    tracing::debug!(session = %key, outcome = ?outcome, "Confirmation attempted");

    Ok(Flow::Continue)
}

async fn confirm_via_record(req: &mut ProxyRequest) -> HookResult {
    if req.method != Method::GET {
        return Ok(Flow::Abort(ControlSignal::forbidden()));
    }
    let (Some(database), Some(confirm_id)) =
        (req.route.database.clone(), req.route.document_id.clone())
    else {
        return Ok(Flow::Abort(ControlSignal::not_found()));
    };
    let Some(secret) = req.query_param("secret") else {
        return Ok(Flow::Abort(ControlSignal::bad_request()));
    };

    let outcome = confirm(
        req.store.as_ref(),
        &database,
        &confirm_id,
        &secret,
        req.peer.ip(),
    )
    .await?;

    let signal = match outcome {
        Confirmation::Confirmed | Confirmation::AlreadyConfirmed => ControlSignal::ok(),
        Confirmation::SecretMismatch => ControlSignal::forbidden(),
        Confirmation::NotFound => ControlSignal::not_found(),
    };
    Ok(Flow::Abort(signal))
}

/// Mark the record `confirm:{confirm_id}` and its session as confirmed
/// when `secret` matches the record.
pub async fn confirm(
    store: &dyn DocumentStore,
    database: &str,
    confirm_id: &str,
    secret: &str,
    peer: IpAddr,
) -> Result<Confirmation, StoreError> {
    let Some(mut record) = store.get(database, &format!("{CONFIRM_TYPE}:{confirm_id}")).await? else {
        return Ok(Confirmation::NotFound);
    };
    if record.get_str("secret") != Some(secret) {
        tracing::info!(confirm_id, "Confirmation secret mismatch");
        return Ok(Confirmation::SecretMismatch);
    }

    let Some(session_id) = record.get_str("session_id").map(str::to_string) else {
        tracing::warn!(confirm_id, "Confirmation record without session");
        return Ok(Confirmation::NotFound);
    };
    let Some(mut session) = store.get(database, &format!("{SESSION_TYPE}:{session_id}")).await? else {
        tracing::warn!(confirm_id, session = %session_id, "Confirmation for missing session");
        return Ok(Confirmation::NotFound);
    };

    if session.contains("confirmed") {
        tracing::warn!(session = %session_id, "Session already confirmed");
        return Ok(Confirmation::AlreadyConfirmed);
    }

    let now = timestamp();
    session.set("confirmed", now.clone());
    session.set("confirmed_by_ip", peer.to_string());
    store.save(session).await?;

    record.set("confirmed", now);
    record.set("confirmed_by_ip", peer.to_string());
    if let Err(e) = store.save(record).await {
        tracing::error!(
            session = %session_id,
            confirm_id,
            error = %e,
            "Session confirmed but confirmation record not updated"
        );
        return Err(e);
    }

    tracing::info!(session = %session_id, peer = %peer, "Session confirmed");
    Ok(Confirmation::Confirmed)
}

async fn filter_read(req: &mut ProxyRequest, admins: &AdminSet) -> HookResult {
    let viewer = authenticate(req).await;

    let Some(Value::Object(doc)) = req.response.json.take() else {
        return Ok(Flow::Continue);
    };
    if !doc.contains_key("_id") {
        req.response.json = Some(Value::Object(doc));
        return Ok(Flow::Continue);
    }

    req.response.json = Some(Value::Object(visible_fields(doc, viewer.as_ref(), admins)));
    Ok(Flow::Continue)
}

/// Fields of a session document `viewer` may see.
pub fn visible_fields(
    doc: Map<String, Value>,
    viewer: Option<&Document>,
    admins: &AdminSet,
) -> Map<String, Value> {
    let mut visible: Map<String, Value> = doc
        .into_iter()
        .filter(|(key, _)| !DENY.contains(&key.as_str()))
        .collect();

    let doc_id = visible.get("_id").and_then(Value::as_str);
    let owner = viewer.filter(|session| session.id().is_some() && session.id() == doc_id);

    match owner {
        Some(session) => {
            let is_admin = session.get_str("email").is_some_and(|e| admins.contains(e));
            visible.insert("is_admin".to_string(), Value::Bool(is_admin));
        }
        None => visible.retain(|key, _| ALLOW.contains(&key.as_str())),
    }

    visible
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
