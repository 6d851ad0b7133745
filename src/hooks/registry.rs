//! Handler module registration and dispatch.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProxyError;
use crate::hooks::point::{HookPoint, Stage};
use crate::http::request::ProxyRequest;
use crate::signal::Flow;

/// Result of a single hook invocation.
pub type HookResult = Result<Flow, ProxyError>;

/// Future returned by a hook, borrowing the request for its duration.
pub type HookFuture<'a> = BoxFuture<'a, HookResult>;

type HookFn = Arc<dyn for<'a> Fn(&'a mut ProxyRequest) -> HookFuture<'a> + Send + Sync>;

/// A named set of hooks. At most one hook per point per module.
pub struct HandlerModule {
    name: String,
    hooks: HashMap<HookPoint, HookFn>,
}

impl HandlerModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: HashMap::new(),
        }
    }

    /// Register `hook` at `point`, replacing any earlier registration.
    pub fn on<F>(mut self, point: HookPoint, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut ProxyRequest) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.hooks.insert(point, Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for HandlerModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut points: Vec<String> = self.hooks.keys().map(ToString::to_string).collect();
        points.sort();
        f.debug_struct("HandlerModule")
            .field("name", &self.name)
            .field("hooks", &points)
            .finish()
    }
}

/// Ordered, immutable list of handler modules.
#[derive(Debug, Default)]
pub struct HookRegistry {
    modules: Vec<HandlerModule>,
}

impl HookRegistry {
    pub fn new(modules: Vec<HandlerModule>) -> Self {
        Self { modules }
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(HandlerModule::name).collect()
    }

    /// Run every hook registered for `stage` against the request.
    ///
    /// Stops at the first `Flow::Abort` or error.
    pub async fn fire(&self, stage: Stage, req: &mut ProxyRequest) -> HookResult {
        let candidates =
            HookPoint::candidates(stage, req.route.document_type.as_deref(), &req.method);

        for point in &candidates {
            for module in &self.modules {
                let Some(hook) = module.hooks.get(point) else {
                    continue;
                };

                tracing::trace!(module = %module.name, hook = %point, "Invoking hook");
                let flow = hook(&mut *req).await?;
                if let Flow::Abort(signal) = flow {
                    tracing::debug!(
                        module = %module.name,
                        hook = %point,
                        status = %signal.status(),
                        "Hook aborted request"
                    );
                    return Ok(Flow::Abort(signal));
                }
            }
        }

        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ControlSignal;
    use crate::store::MemoryStore;
    use axum::http::{Method, Request};
    use std::sync::Mutex;

    type Calls = Arc<Mutex<Vec<String>>>;

    fn request(method: Method, uri: &str) -> ProxyRequest {
        let (parts, ()) = Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        ProxyRequest::new(
            parts,
            Default::default(),
            "127.0.0.1:9000".parse().unwrap(),
            Arc::new(MemoryStore::new()),
            "slipcover",
        )
    }

    fn recording(
        module: HandlerModule,
        point: HookPoint,
        label: &'static str,
        calls: &Calls,
    ) -> HandlerModule {
        let calls = calls.clone();
        module.on(point, move |_req| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.lock().unwrap().push(label.to_string());
                Ok(Flow::Continue)
            })
        })
    }

    #[tokio::test]
    async fn precedence_is_tier_then_module_order() {
        let calls: Calls = Default::default();
        let a = recording(HandlerModule::new("a"), HookPoint::stage(Stage::Url), "A.handle_url", &calls);
        let b = recording(HandlerModule::new("b"), HookPoint::stage(Stage::Url), "B.handle_url", &calls);
        let b = recording(b, HookPoint::typed("foo", Stage::Url), "B.handle_foo_url", &calls);
        let registry = HookRegistry::new(vec![a, b]);

        let mut req = request(Method::GET, "/foo/1");
        let flow = registry.fire(Stage::Url, &mut req).await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["A.handle_url", "B.handle_url", "B.handle_foo_url"]
        );
    }

    #[tokio::test]
    async fn typed_hooks_skip_unresolved_routes() {
        let calls: Calls = Default::default();
        let a = recording(HandlerModule::new("a"), HookPoint::typed("foo", Stage::Url), "typed", &calls);
        let a = recording(a, HookPoint::stage(Stage::Url), "any", &calls);
        let registry = HookRegistry::new(vec![a]);

        let mut req = request(Method::GET, "/a/b/c");
        registry.fire(Stage::Url, &mut req).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["any"]);
    }

    #[tokio::test]
    async fn method_hooks_match_method_only() {
        let calls: Calls = Default::default();
        let a = recording(
            HandlerModule::new("a"),
            HookPoint::method("foo", Method::PUT, Stage::Pre),
            "put",
            &calls,
        );
        let registry = HookRegistry::new(vec![a]);

        let mut get = request(Method::GET, "/foo");
        registry.fire(Stage::Pre, &mut get).await.unwrap();
        assert!(calls.lock().unwrap().is_empty());

        let mut put = request(Method::PUT, "/foo");
        registry.fire(Stage::Pre, &mut put).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["put"]);
    }

    #[tokio::test]
    async fn abort_stops_remaining_hooks() {
        let calls: Calls = Default::default();
        let a = HandlerModule::new("a").on(HookPoint::stage(Stage::Pre), |_req| {
            Box::pin(async { Ok(Flow::Abort(ControlSignal::forbidden())) })
        });
        let b = recording(HandlerModule::new("b"), HookPoint::stage(Stage::Pre), "b", &calls);
        let registry = HookRegistry::new(vec![a, b]);

        let mut req = request(Method::GET, "/foo");
        let flow = registry.fire(Stage::Pre, &mut req).await.unwrap();

        assert_eq!(flow, Flow::Abort(ControlSignal::forbidden()));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hooks_mutate_request() {
        let module = HandlerModule::new("a").on(HookPoint::typed("foo", Stage::Url), |req| {
            Box::pin(async move {
                req.route.document_id = Some("backfilled".to_string());
                Ok(Flow::Continue)
            })
        });
        let registry = HookRegistry::new(vec![module]);

        let mut req = request(Method::GET, "/foo");
        registry.fire(Stage::Url, &mut req).await.unwrap();

        assert_eq!(req.route.storage_path().as_deref(), Some("/slipcover/foo:backfilled"));
        assert_eq!(registry.module_names(), vec!["a"]);
    }
}
