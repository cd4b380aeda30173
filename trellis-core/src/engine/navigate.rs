//! Navigation
//!
//! This module implements the pieces the engine uses to move between
//! surfaces: a lenient URL parser and a route table.
//!
//! # Destinations
//!
//! A [`Destination`] is a parsed navigation target. Parsing never fails;
//! whatever part of `scheme://host/path?query#fragment` is present is
//! captured and the rest is left empty, which matches how loosely
//! navigation targets are written in practice (bare paths, bare
//! fragments, full URLs).
//!
//! # Routes
//!
//! A [`Router`] maps paths to view factories. Exact routes win over
//! prefix routes; among prefix routes the first registered match wins,
//! and a prefix only matches on a whole segment boundary, so `/doc`
//! does not capture `/docs`. Unresolved paths fall back to a not-found
//! factory, [`NotFound`] by default.
//!
//! [`NotFound`]: crate::tree::NotFound

use std::fmt;

use indexmap::IndexMap;

use crate::tree::{NotFound, View};

type ViewFactory = Box<dyn Fn() -> View + Send>;

/// A parsed navigation target.
///
/// # Example
///
/// ```rust,ignore
/// let dest = Destination::parse("https://example.com/docs?tab=api#intro");
/// assert_eq!(dest.host.as_deref(), Some("example.com"));
/// assert_eq!(dest.path, "/docs");
/// assert_eq!(dest.fragment.as_deref(), Some("intro"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// The target exactly as it was written.
    pub raw: String,
    /// Lowercased scheme, when one was present.
    pub scheme: Option<String>,
    /// Lowercased authority, when one was present.
    pub host: Option<String>,
    /// The path, `/` when the target had none.
    pub path: String,
    /// The query string, without its `?`.
    pub query: Option<String>,
    /// The fragment, without its `#`.
    pub fragment: Option<String>,
}

impl Destination {
    /// Parse a navigation target. Lenient: never fails.
    pub fn parse(raw: &str) -> Self {
        let mut rest = raw.trim();

        let mut fragment = None;
        if let Some(idx) = rest.find('#') {
            fragment = Some(rest[idx + 1..].to_string());
            rest = &rest[..idx];
        }

        let mut query = None;
        if let Some(idx) = rest.find('?') {
            query = Some(rest[idx + 1..].to_string());
            rest = &rest[..idx];
        }

        let mut scheme = None;
        if let Some(idx) = rest.find(':') {
            let candidate = &rest[..idx];
            let schemeish = !candidate.is_empty()
                && candidate
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.');
            if schemeish {
                scheme = Some(candidate.to_ascii_lowercase());
                rest = &rest[idx + 1..];
            }
        }

        let mut host = None;
        let path = if let Some(after) = rest.strip_prefix("//") {
            match after.find('/') {
                Some(slash) => {
                    host = Some(after[..slash].to_ascii_lowercase());
                    after[slash..].to_string()
                }
                None => {
                    host = Some(after.to_ascii_lowercase());
                    "/".to_string()
                }
            }
        } else if rest.is_empty() {
            "/".to_string()
        } else {
            rest.to_string()
        };

        Self { raw: raw.to_string(), scheme, host, path, query, fragment }
    }

    /// Whether the target names no scheme and no host: a path (or bare
    /// fragment) on the current origin.
    pub fn is_relative(&self) -> bool {
        self.scheme.is_none() && self.host.is_none()
    }

    /// Whether two destinations address the same document, fragments
    /// aside.
    pub fn same_document(&self, other: &Destination) -> bool {
        self.path == other.path && self.query == other.query
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Path-to-view route table.
///
/// # Example
///
/// ```rust,ignore
/// let mut router = Router::new();
/// router.route("/", || View::component(Home));
/// router.route_prefix("/docs", || View::component(Docs));
/// let view = router.resolve("/docs/getting-started");
/// ```
pub struct Router {
    exact: IndexMap<String, ViewFactory>,
    prefixes: Vec<(String, ViewFactory)>,
    not_found: ViewFactory,
}

impl Router {
    /// Create an empty route table. Everything resolves to the
    /// not-found view until routes are registered.
    pub fn new() -> Self {
        Self {
            exact: IndexMap::new(),
            prefixes: Vec::new(),
            not_found: Box::new(|| View::component(NotFound)),
        }
    }

    /// Register a view factory for one exact path.
    pub fn route(&mut self, path: impl Into<String>, factory: impl Fn() -> View + Send + 'static) {
        self.exact.insert(path.into(), Box::new(factory));
    }

    /// Register a view factory for a path and everything below it.
    pub fn route_prefix(
        &mut self,
        prefix: impl Into<String>,
        factory: impl Fn() -> View + Send + 'static,
    ) {
        let mut prefix = prefix.into();
        while prefix.len() > 1 && prefix.ends_with('/') {
            prefix.pop();
        }
        self.prefixes.push((prefix, Box::new(factory)));
    }

    /// Replace the fallback used when no route matches.
    pub fn set_not_found(&mut self, factory: impl Fn() -> View + Send + 'static) {
        self.not_found = Box::new(factory);
    }

    /// Produce the view for a path.
    pub fn resolve(&self, path: &str) -> View {
        if let Some(factory) = self.exact.get(path) {
            return factory();
        }
        for (prefix, factory) in &self.prefixes {
            if let Some(tail) = path.strip_prefix(prefix.as_str()) {
                if tail.is_empty() || tail.starts_with('/') || prefix == "/" {
                    return factory();
                }
            }
        }
        (self.not_found)()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field("prefixes", &self.prefixes.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_urls_split_into_their_parts() {
        let dest = Destination::parse("https://Example.COM/Docs?tab=api#Intro");
        assert_eq!(dest.scheme.as_deref(), Some("https"));
        assert_eq!(dest.host.as_deref(), Some("example.com"));
        assert_eq!(dest.path, "/Docs");
        assert_eq!(dest.query.as_deref(), Some("tab=api"));
        assert_eq!(dest.fragment.as_deref(), Some("Intro"));
        assert!(!dest.is_relative());
    }

    #[test]
    fn bare_paths_stay_relative() {
        let dest = Destination::parse("/settings/profile");
        assert_eq!(dest.scheme, None);
        assert_eq!(dest.host, None);
        assert_eq!(dest.path, "/settings/profile");
        assert!(dest.is_relative());
    }

    #[test]
    fn empty_and_fragment_only_targets_default_to_the_root_path() {
        assert_eq!(Destination::parse("").path, "/");

        let anchor = Destination::parse("#details");
        assert_eq!(anchor.path, "/");
        assert_eq!(anchor.fragment.as_deref(), Some("details"));
    }

    #[test]
    fn mailto_targets_carry_their_scheme() {
        let dest = Destination::parse("mailto:team@example.com");
        assert_eq!(dest.scheme.as_deref(), Some("mailto"));
        assert_eq!(dest.host, None);
        assert_eq!(dest.path, "team@example.com");
    }

    #[test]
    fn protocol_relative_urls_keep_their_host() {
        let dest = Destination::parse("//cdn.example.com/asset.js");
        assert_eq!(dest.scheme, None);
        assert_eq!(dest.host.as_deref(), Some("cdn.example.com"));
        assert_eq!(dest.path, "/asset.js");
    }

    #[test]
    fn same_document_compares_path_and_query_but_not_fragment() {
        let a = Destination::parse("/docs?v=2#one");
        let b = Destination::parse("/docs?v=2#two");
        let c = Destination::parse("/docs?v=3#one");
        assert!(a.same_document(&b));
        assert!(!a.same_document(&c));
    }

    fn marker(text: &'static str) -> impl Fn() -> View + Send {
        move || View::element("div").attr("data-route", text).build()
    }

    fn resolved_marker(router: &Router, path: &str) -> Option<String> {
        match router.resolve(path) {
            View::Element(e) => e.attrs.get("data-route").cloned(),
            _ => None,
        }
    }

    #[test]
    fn exact_routes_win_over_prefix_routes() {
        let mut router = Router::new();
        router.route_prefix("/docs", marker("prefix"));
        router.route("/docs/special", marker("exact"));

        assert_eq!(resolved_marker(&router, "/docs/special").as_deref(), Some("exact"));
        assert_eq!(resolved_marker(&router, "/docs/other").as_deref(), Some("prefix"));
    }

    #[test]
    fn prefix_routes_match_on_segment_boundaries_only() {
        let mut router = Router::new();
        router.route_prefix("/doc", marker("doc"));

        assert_eq!(resolved_marker(&router, "/doc").as_deref(), Some("doc"));
        assert_eq!(resolved_marker(&router, "/doc/page").as_deref(), Some("doc"));
        assert_eq!(resolved_marker(&router, "/docs"), None);
    }

    #[test]
    fn first_registered_prefix_wins() {
        let mut router = Router::new();
        router.route_prefix("/a", marker("first"));
        router.route_prefix("/a/b", marker("second"));

        assert_eq!(resolved_marker(&router, "/a/b/c").as_deref(), Some("first"));
    }

    #[test]
    fn root_prefix_catches_everything() {
        let mut router = Router::new();
        router.route_prefix("/", marker("root"));

        assert_eq!(resolved_marker(&router, "/anything/at/all").as_deref(), Some("root"));
    }

    #[test]
    fn unresolved_paths_fall_back_to_not_found() {
        let router = Router::new();
        match router.resolve("/missing") {
            View::Component(c) => {
                assert_eq!(c.type_name(), std::any::type_name::<NotFound>());
            }
            other => panic!("expected a component view, got {other:?}"),
        }
    }
}
