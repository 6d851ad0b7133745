//! Path-to-document resolution.
//!
//! # Grammar
//! ```text
//! /{type}          → (default_db, type, -)
//! /{type}:{id}     → (default_db, type, id)
//! /{type}/{id}     → (default_db, type, id)
//! anything else    → unresolved
//! ```
//!
//! Segments are split on `/` with empty segments discarded, so `//a///b`
//! is the same as `/a/b`. Segments are percent-decoded before they are
//! classified. A single segment starting with `_` (a backend
//! administrative path) never resolves, and neither does a two-segment
//! path whose decoded type contains `:`.
//!
//! Both parts are re-encoded in the storage path; a decoded `/`, `?`, `#`
//! or `%` can never change which backend document is addressed.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped in each part of a storage path.
const PART_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Resolved `(database, document_type, document_id)` triple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTarget {
    pub database: Option<String>,
    pub document_type: Option<String>,
    pub document_id: Option<String>,
}

impl RouteTarget {
    /// Resolve a request path (query string allowed) against the default database.
    pub fn resolve(uri: &str, default_db: &str) -> Self {
        let path = uri.split('?').next().unwrap_or_default();
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect();

        match segments.as_slice() {
            [single] if !single.starts_with('_') => {
                let (doc_type, doc_id) = match single.split_once(':') {
                    Some((t, id)) => (t, Some(id).filter(|id| !id.is_empty())),
                    None => (single.as_str(), None),
                };
                Self {
                    database: Some(default_db.to_string()),
                    document_type: Some(doc_type.to_string()),
                    document_id: doc_id.map(str::to_string),
                }
            }
            [doc_type, doc_id] if !doc_type.contains(':') => Self {
                database: Some(default_db.to_string()),
                document_type: Some(doc_type.to_string()),
                document_id: Some(doc_id.to_string()),
            },
            _ => Self::default(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.document_type.is_some()
    }

    /// Backend key of the addressed document, `"{type}:{id}"`.
    pub fn document_key(&self) -> Option<String> {
        match (&self.document_type, &self.document_id) {
            (Some(t), Some(id)) => Some(format!("{t}:{id}")),
            _ => None,
        }
    }

    /// Backend path of the addressed document; `None` unless all three parts are known.
    pub fn storage_path(&self) -> Option<String> {
        match (&self.database, &self.document_type, &self.document_id) {
            (Some(db), Some(t), Some(id)) => Some(format!(
                "/{}/{}:{}",
                utf8_percent_encode(db, PART_SAFE),
                utf8_percent_encode(t, PART_SAFE),
                utf8_percent_encode(id, PART_SAFE)
            )),
            _ => None,
        }
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let part = |p: &Option<String>| p.clone().unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{}/{}/{}",
            part(&self.database),
            part(&self.document_type),
            part(&self.document_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = "slipcover";

    #[test]
    fn colon_and_slash_forms_are_aliases() {
        for (doc_type, doc_id) in [("session", "abc"), ("user", "42"), ("note", "a.b-c")] {
            let colon = RouteTarget::resolve(&format!("/{doc_type}:{doc_id}"), DB);
            let slash = RouteTarget::resolve(&format!("/{doc_type}/{doc_id}"), DB);
            assert_eq!(colon, slash);
            assert_eq!(colon.document_type.as_deref(), Some(doc_type));
            assert_eq!(colon.document_id.as_deref(), Some(doc_id));
        }
    }

    #[test]
    fn bare_type_has_no_id() {
        let route = RouteTarget::resolve("/session?secret=x", DB);
        assert_eq!(route.database.as_deref(), Some(DB));
        assert_eq!(route.document_type.as_deref(), Some("session"));
        assert_eq!(route.document_id, None);
        assert_eq!(route.storage_path(), None);
        assert!(route.is_resolved());
    }

    #[test]
    fn empty_segments_are_ignored() {
        assert_eq!(
            RouteTarget::resolve("//session///abc/", DB),
            RouteTarget::resolve("/session/abc", DB)
        );
        assert_eq!(RouteTarget::resolve("/session:", DB).document_id, None);
    }

    #[test]
    fn unroutable_shapes() {
        for path in ["/", "", "/_all_dbs", "/_x", "/%5Fx", "/a/b/c", "/?a=b"] {
            let route = RouteTarget::resolve(path, DB);
            assert_eq!(route, RouteTarget::default(), "{path} should not resolve");
            assert!(!route.is_resolved());
            assert_eq!(route.storage_path(), None);
        }
    }

    #[test]
    fn two_segments_allow_underscore() {
        let route = RouteTarget::resolve("/_design/view", DB);
        assert_eq!(route.document_type.as_deref(), Some("_design"));
    }

    #[test]
    fn storage_path_escapes_id() {
        let route = RouteTarget::resolve("/note/a%20b", DB);
        assert_eq!(route.storage_path().as_deref(), Some("/slipcover/note:a%20b"));
        assert_eq!(route.document_key().as_deref(), Some("note:a b"));
    }

    #[test]
    fn only_first_colon_splits() {
        let route = RouteTarget::resolve("/note:a:b", DB);
        assert_eq!(route.document_id.as_deref(), Some("a:b"));
        assert_eq!(route.storage_path().as_deref(), Some("/slipcover/note:a%3Ab"));
    }

    #[test]
    fn decoded_type_with_colon_does_not_resolve() {
        for path in [
            "/confirm:c1%23/x",
            "/session:abc%3F/x",
            "/session:abc%2F/x",
            "/session%3Aabc/x",
        ] {
            assert_eq!(RouteTarget::resolve(path, DB), RouteTarget::default(), "{path}");
        }
    }

    #[test]
    fn reserved_characters_stay_inside_their_part() {
        let cases = [
            ("/note%23/x", "/slipcover/note%23:x"),
            ("/note%3Fq/x", "/slipcover/note%3Fq:x"),
            ("/note%2Fa/x", "/slipcover/note%2Fa:x"),
            ("/note/a%23b", "/slipcover/note:a%23b"),
            ("/note/a%3Fb", "/slipcover/note:a%3Fb"),
            ("/note/a%2Fb", "/slipcover/note:a%2Fb"),
            ("/note/a%2523", "/slipcover/note:a%2523"),
            ("/note:a%23b", "/slipcover/note:a%23b"),
        ];
        for (path, expected) in cases {
            let route = RouteTarget::resolve(path, DB);
            assert_eq!(route.storage_path().as_deref(), Some(expected), "{path}");
        }
    }
}
