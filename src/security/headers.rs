//! Request header redaction for access logs.
//!
//! # Responsibilities
//! - Hold the deny-list of headers that must never reach a log record
//! - Combine built-in, caller-supplied and predicate-based denials
//! - Produce the loggable header set with canonical names
//!
//! # Design Decisions
//! - Deny-lists are immutable values built once at handler construction
//! - Matching is case-insensitive; `HeaderName` is already lowercase, so
//!   entries are normalized to lowercase on the way in
//! - Multi-valued headers are logged as one `", "`-joined string

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName};

/// Headers that are always denied.
const BASIC_DENIED: &[&str] = &["user-agent", "referer", "x-request-id", "x-api-key"];

/// Proxy and CDN bookkeeping headers.
const CDN_DENIED: &[&str] = &[
    "x-varnish",
    "x-timer",
    "connection",
    "content-length",
    "cdn-loop",
];

const CDN_DENIED_PREFIXES: &[&str] = &["fastly-"];

/// Set of header names (and name prefixes) excluded from logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenyList {
    names: Vec<String>,
    prefixes: Vec<String>,
}

impl DenyList {
    /// `User-Agent`, `Referer`, `X-Request-Id` and `X-Api-Key`.
    pub fn basic() -> Self {
        Self {
            names: BASIC_DENIED.iter().map(|n| n.to_string()).collect(),
            prefixes: Vec::new(),
        }
    }

    /// The basic list plus CDN bookkeeping headers and every `Fastly-*`
    /// header.
    pub fn with_cdn_headers() -> Self {
        Self::basic()
            .with_names(CDN_DENIED.iter().copied())
            .with_prefixes(CDN_DENIED_PREFIXES.iter().copied())
    }

    /// Add exact header names, matched case-insensitively.
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().to_ascii_lowercase();
            if !self.names.contains(&name) {
                self.names.push(name);
            }
        }
        self
    }

    /// Add name prefixes, matched case-insensitively.
    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for prefix in prefixes {
            let prefix = prefix.as_ref().to_ascii_lowercase();
            if !self.prefixes.contains(&prefix) {
                self.prefixes.push(prefix);
            }
        }
        self
    }

    /// Whether `name` is denied.
    pub fn denies(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.names.iter().any(|n| *n == name)
            || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Caller-supplied denial rule; `true` means the header is denied.
pub type HeaderPredicate = Arc<dyn Fn(&HeaderName) -> bool + Send + Sync>;

/// Decides which request headers are logged.
#[derive(Clone)]
pub struct RedactionPolicy {
    deny_list: DenyList,
    predicate: Option<HeaderPredicate>,
}

impl fmt::Debug for RedactionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactionPolicy")
            .field("deny_list", &self.deny_list)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self::new(DenyList::basic())
    }
}

impl RedactionPolicy {
    pub fn new(deny_list: DenyList) -> Self {
        Self {
            deny_list,
            predicate: None,
        }
    }

    /// Deny these additional header names.
    pub fn with_denied_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.deny_list = self.deny_list.with_names(names);
        self
    }

    /// Deny every header the predicate returns `true` for. Replaces any
    /// previous predicate.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&HeaderName) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn deny_list(&self) -> &DenyList {
        &self.deny_list
    }

    /// Whether `name` may be logged.
    pub fn allows(&self, name: &HeaderName) -> bool {
        if self.deny_list.denies(name.as_str()) {
            return false;
        }
        match &self.predicate {
            Some(denied) => !denied(name),
            None => true,
        }
    }

    /// Loggable headers keyed by canonical name, or `None` when nothing
    /// survives redaction.
    pub fn redact(&self, headers: &HeaderMap) -> Option<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for name in headers.keys() {
            if !self.allows(name) {
                continue;
            }
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            out.insert(canonical_header_key(name.as_str()), joined);
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

/// Canonical MIME form of a header name: `x-api-key` → `X-Api-Key`.
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let c = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            c
        })
        .collect()
}
