//! Lifecycle stages and hook keys.

use axum::http::Method;

/// Named points of the request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Route resolved, body not yet parsed.
    Url,
    /// Body parsed, request not yet forwarded.
    Pre,
    /// Request dispatched to the backend.
    Pending,
    /// Response available for rewriting.
    Finish,
    /// Response serialized; informational only.
    Final,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Url => "url",
            Stage::Pre => "pre",
            Stage::Pending => "pending",
            Stage::Finish => "finish",
            Stage::Final => "final",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which a module registers a hook.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookPoint {
    pub stage: Stage,
    pub doc_type: Option<String>,
    pub method: Option<Method>,
}

impl HookPoint {
    /// Fires for every request.
    pub fn stage(stage: Stage) -> Self {
        Self {
            stage,
            doc_type: None,
            method: None,
        }
    }

    /// Fires for requests routed to `doc_type`.
    pub fn typed(doc_type: impl Into<String>, stage: Stage) -> Self {
        Self {
            stage,
            doc_type: Some(doc_type.into()),
            method: None,
        }
    }

    /// Fires for requests routed to `doc_type` with the given method.
    pub fn method(doc_type: impl Into<String>, method: Method, stage: Stage) -> Self {
        Self {
            stage,
            doc_type: Some(doc_type.into()),
            method: Some(method),
        }
    }

    /// Keys to try for a stage, in precedence order.
    pub fn candidates(stage: Stage, doc_type: Option<&str>, method: &Method) -> Vec<HookPoint> {
        let mut points = vec![Self::stage(stage)];
        if let Some(doc_type) = doc_type {
            points.push(Self::typed(doc_type, stage));
            points.push(Self::method(doc_type, method.clone(), stage));
        }
        points
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("handle_")?;
        if let Some(doc_type) = &self.doc_type {
            write!(f, "{doc_type}_")?;
        }
        if let Some(method) = &self.method {
            write!(f, "{method}_")?;
        }
        f.write_str(self.stage.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_request_has_single_candidate() {
        let points = HookPoint::candidates(Stage::Url, None, &Method::GET);
        assert_eq!(points, vec![HookPoint::stage(Stage::Url)]);
    }

    #[test]
    fn typed_candidates_in_precedence_order() {
        let names: Vec<String> = HookPoint::candidates(Stage::Pre, Some("session"), &Method::PUT)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, vec!["handle_pre", "handle_session_pre", "handle_session_PUT_pre"]);
    }
}
