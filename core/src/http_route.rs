//! Path/header/query match conditions and the stable `RouteKey` used to
//! de-duplicate routes within a `VirtualHost`.
//!
//! Grounded on `linkerd-linkerd2/policy-controller/core/src/routes.rs`,
//! generalized from Gateway-API match kinds to the richer Ingress/HTTPProxy
//! match vocabulary (segment-prefix mode, header presence/negation,
//! `:authority` regex matches for wildcard hosts).

use regex::Regex;
use std::fmt::Write as _;

/// How a `Prefix` path match is evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefixMode {
    /// Plain string prefix: `/foo` matches `/foobar`.
    String,
    /// Full DNS-label boundary prefix: `/foo` matches `/foo/bar` but not
    /// `/foobar`.
    Segment,
}

#[derive(Clone, Debug)]
pub enum PathMatch {
    Prefix { value: String, mode: PrefixMode },
    Exact(String),
    Regex(Regex),
}

impl PartialEq for PathMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Prefix { value: v0, mode: m0 }, Self::Prefix { value: v1, mode: m1 }) => {
                v0 == v1 && m0 == m1
            }
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}
impl Eq for PathMatch {}

impl PathMatch {
    pub fn prefix(value: impl Into<String>) -> Self {
        let value = value.into();
        // the special case `path == "/"` collapses to string-prefix
        let mode = if value == "/" {
            PrefixMode::String
        } else {
            PrefixMode::Segment
        };
        Self::Prefix { value, mode }
    }

    pub fn regex(s: &str) -> Result<Self, regex::Error> {
        Regex::new(s).map(Self::Regex)
    }

    fn describe(&self, out: &mut String) {
        match self {
            Self::Prefix { value, mode } => {
                let tag = match mode {
                    PrefixMode::String => "prefix",
                    PrefixMode::Segment => "segprefix",
                };
                let _ = write!(out, "{tag}:{value}");
            }
            Self::Exact(v) => {
                let _ = write!(out, "exact:{v}");
            }
            Self::Regex(r) => {
                let _ = write!(out, "regex:{}", r.as_str());
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderMatchKind {
    Exact,
    NotExact,
    Contains,
    NotContains,
    Present,
    NotPresent,
    Regex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderMatch {
    pub name: String,
    pub kind: HeaderMatchKind,
    /// Unused for `Present`/`NotPresent`.
    pub value: String,
}

impl HeaderMatch {
    fn describe(&self, out: &mut String) {
        let kind = match self.kind {
            HeaderMatchKind::Exact => "exact",
            HeaderMatchKind::NotExact => "notexact",
            HeaderMatchKind::Contains => "contains",
            HeaderMatchKind::NotContains => "notcontains",
            HeaderMatchKind::Present => "present",
            HeaderMatchKind::NotPresent => "notpresent",
            HeaderMatchKind::Regex => "regex",
        };
        let _ = write!(out, "{}:{kind}:{}", self.name, self.value);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryParamMatch {
    Exact(String, String),
    Regex(String, String),
}

impl QueryParamMatch {
    fn describe(&self, out: &mut String) {
        match self {
            Self::Exact(k, v) => {
                let _ = write!(out, "qexact:{k}={v}");
            }
            Self::Regex(k, v) => {
                let _ = write!(out, "qregex:{k}={v}");
            }
        }
    }
}

/// A fully-compiled match condition for a route: one path condition plus any
/// number of header/query conditions, accumulated by descending an
/// HTTPProxy inclusion tree or by a single Ingress/HTTPRoute rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchConditions {
    pub path: Option<PathMatch>,
    pub headers: Vec<HeaderMatch>,
    pub query_params: Vec<QueryParamMatch>,
}

impl MatchConditions {
    /// Renders a stable key used to de-duplicate routes within a
    /// `VirtualHost`. Sorts header/query descriptions so that two
    /// structurally-equal-but-differently-ordered conditions collide.
    pub fn route_key(&self) -> String {
        let mut out = String::new();
        match &self.path {
            Some(p) => p.describe(&mut out),
            None => out.push_str("prefix:/"),
        }

        let mut headers: Vec<String> = self
            .headers
            .iter()
            .map(|h| {
                let mut s = String::new();
                h.describe(&mut s);
                s
            })
            .collect();
        headers.sort();
        for h in headers {
            out.push('|');
            out.push_str(&h);
        }

        let mut queries: Vec<String> = self
            .query_params
            .iter()
            .map(|q| {
                let mut s = String::new();
                q.describe(&mut s);
                s
            })
            .collect();
        queries.sort();
        for q in queries {
            out.push('|');
            out.push_str(&q);
        }

        out
    }

    /// Concatenates `self`'s conditions as the ancestor, appending `child`'s
    /// path (if any) to the ancestor's path and extending header/query
    /// matches. Used to implement HTTPProxy condition inheritance through
    /// an include chain.
    pub fn inherit(&self, child: &MatchConditions) -> Result<MatchConditions, InheritError> {
        let path = match (&self.path, &child.path) {
            (ancestor, None) => ancestor.clone(),
            (None, Some(child_path)) => Some(child_path.clone()),
            (Some(PathMatch::Prefix { value: a, mode: am }), Some(PathMatch::Prefix { value: c, mode: _ })) => {
                let joined = join_prefix(a, c)?;
                Some(PathMatch::Prefix { value: joined, mode: *am })
            }
            (Some(_), Some(child_path)) => Some(child_path.clone()),
        };

        let mut headers = self.headers.clone();
        headers.extend(child.headers.iter().cloned());
        validate_headers(&headers)?;

        let mut query_params = self.query_params.clone();
        query_params.extend(child.query_params.iter().cloned());

        Ok(MatchConditions {
            path,
            headers,
            query_params,
        })
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum InheritError {
    #[error("double slash in concatenated path prefix")]
    DoubleSlash,
    #[error("duplicate exact/notexact header match for {0:?}")]
    ConflictingExact(String),
    #[error("duplicate contains/notcontains header match for {0:?}")]
    ConflictingContains(String),
    #[error("duplicate present/notpresent header match for {0:?}")]
    ConflictingPresence(String),
}

fn join_prefix(ancestor: &str, child: &str) -> Result<String, InheritError> {
    let mut joined = String::with_capacity(ancestor.len() + child.len());
    joined.push_str(ancestor.trim_end_matches('/'));
    if !child.starts_with('/') {
        joined.push('/');
    }
    joined.push_str(child);
    if joined.contains("//") {
        return Err(InheritError::DoubleSlash);
    }
    if joined.is_empty() {
        joined.push('/');
    }
    Ok(joined)
}

/// Rejects duplicate header matches that contradict each other: both
/// `exact`/`notexact` of the same value, `contains`/`notcontains` of the
/// same value, or `present`/`notpresent` on the same name.
fn validate_headers(headers: &[HeaderMatch]) -> Result<(), InheritError> {
    for (i, a) in headers.iter().enumerate() {
        for b in &headers[i + 1..] {
            if a.name != b.name {
                continue;
            }
            match (a.kind, b.kind) {
                (HeaderMatchKind::Exact, HeaderMatchKind::NotExact)
                | (HeaderMatchKind::NotExact, HeaderMatchKind::Exact)
                    if a.value == b.value =>
                {
                    return Err(InheritError::ConflictingExact(a.name.clone()));
                }
                (HeaderMatchKind::Contains, HeaderMatchKind::NotContains)
                | (HeaderMatchKind::NotContains, HeaderMatchKind::Contains)
                    if a.value == b.value =>
                {
                    return Err(InheritError::ConflictingContains(a.name.clone()));
                }
                (HeaderMatchKind::Present, HeaderMatchKind::NotPresent)
                | (HeaderMatchKind::NotPresent, HeaderMatchKind::Present) => {
                    return Err(InheritError::ConflictingPresence(a.name.clone()));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Intersects a Gateway API listener hostname with a route hostname:
/// `None` listener hostname matches anything; equal hostnames match as-is;
/// a wildcard (`*.` prefix) on either side matches a single extra DNS label
/// of the other, returning the more specific of the two. Anything else is
/// not an intersection.
pub fn hostname_intersect(listener: Option<&str>, route: &str) -> Option<String> {
    let listener = match listener {
        None => return Some(route.to_string()),
        Some(l) => l,
    };
    if listener == route {
        return Some(listener.to_string());
    }
    if let Some(suffix) = listener.strip_prefix("*.") {
        if is_single_label_match(route, suffix) {
            return Some(route.to_string());
        }
    }
    if let Some(suffix) = route.strip_prefix("*.") {
        if is_single_label_match(listener, suffix) {
            return Some(listener.to_string());
        }
    }
    None
}

fn is_single_label_match(candidate: &str, suffix: &str) -> bool {
    match candidate.strip_suffix(suffix) {
        Some(prefix) => match prefix.strip_suffix('.') {
            Some(label) => !label.is_empty() && !label.contains('.'),
            None => false,
        },
        None => false,
    }
}

/// Builds the `:authority` header regex match injected for wildcard hosts
/// (`*.example.com`), enforcing single-DNS-label matching.
pub fn wildcard_authority_match(host: &str) -> Option<HeaderMatch> {
    let suffix = host.strip_prefix("*.")?;
    let escaped = regex::escape(suffix);
    let pattern = format!(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?\.{escaped}");
    Some(HeaderMatch {
        name: ":authority".to_string(),
        kind: HeaderMatchKind::Regex,
        value: pattern,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_key_is_order_independent() {
        let a = MatchConditions {
            path: Some(PathMatch::prefix("/api")),
            headers: vec![
                HeaderMatch { name: "x-user".into(), kind: HeaderMatchKind::Contains, value: "abc".into() },
                HeaderMatch { name: "x-env".into(), kind: HeaderMatchKind::Exact, value: "prod".into() },
            ],
            query_params: vec![],
        };
        let b = MatchConditions {
            path: Some(PathMatch::prefix("/api")),
            headers: vec![
                HeaderMatch { name: "x-env".into(), kind: HeaderMatchKind::Exact, value: "prod".into() },
                HeaderMatch { name: "x-user".into(), kind: HeaderMatchKind::Contains, value: "abc".into() },
            ],
            query_params: vec![],
        };
        assert_eq!(a.route_key(), b.route_key());
    }

    #[test]
    fn inherit_joins_prefix() {
        let ancestor = MatchConditions {
            path: Some(PathMatch::prefix("/api")),
            headers: vec![HeaderMatch {
                name: "x-user".into(),
                kind: HeaderMatchKind::Contains,
                value: "abc".into(),
            }],
            query_params: vec![],
        };
        let child = MatchConditions {
            path: Some(PathMatch::prefix("/v1")),
            headers: vec![],
            query_params: vec![],
        };
        let merged = ancestor.inherit(&child).unwrap();
        match merged.path {
            Some(PathMatch::Prefix { value, .. }) => assert_eq!(value, "/api/v1"),
            other => panic!("unexpected path {other:?}"),
        }
        assert_eq!(merged.headers.len(), 1);
    }

    #[test]
    fn inherit_rejects_double_slash() {
        let ancestor = MatchConditions {
            path: Some(PathMatch::prefix("/api/")),
            ..Default::default()
        };
        let child = MatchConditions {
            path: Some(PathMatch::prefix("/v1")),
            ..Default::default()
        };
        // trailing slash on ancestor is trimmed, so this should NOT double up
        assert!(ancestor.inherit(&child).is_ok());

        let ancestor = MatchConditions {
            path: Some(PathMatch::Prefix { value: "/api/".into(), mode: PrefixMode::Segment }),
            ..Default::default()
        };
        let child = MatchConditions {
            path: Some(PathMatch::Prefix { value: "//v1".into(), mode: PrefixMode::Segment }),
            ..Default::default()
        };
        assert_eq!(ancestor.inherit(&child), Err(InheritError::DoubleSlash));
    }

    #[test]
    fn inherit_rejects_contradictory_headers() {
        let ancestor = MatchConditions {
            headers: vec![HeaderMatch { name: "x".into(), kind: HeaderMatchKind::Exact, value: "a".into() }],
            ..Default::default()
        };
        let child = MatchConditions {
            headers: vec![HeaderMatch { name: "x".into(), kind: HeaderMatchKind::NotExact, value: "a".into() }],
            ..Default::default()
        };
        assert!(matches!(
            ancestor.inherit(&child),
            Err(InheritError::ConflictingExact(_))
        ));
    }

    #[test]
    fn wildcard_authority_match_is_single_label() {
        let m = wildcard_authority_match("*.example.com").unwrap();
        assert_eq!(m.name, ":authority");
        assert_eq!(m.value, r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?\.example\.com");
        assert!(wildcard_authority_match("example.com").is_none());
    }
}
