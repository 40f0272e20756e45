//! `Cookie` / `Set-Cookie` codec on top of the [`cookie`] crate.
//!
//! Parsing is lenient: pairs without `=` or without a name are skipped, the first occurrence
//! of a name wins, values wrapped in double quotes are unwrapped and percent-decoded when they
//! decode to valid UTF-8, kept verbatim otherwise. Serialization percent-encodes the value.

use std::collections::HashMap;
use std::time::SystemTime;

use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;

pub use cookie::SameSite;

/// Attributes of a `Set-Cookie` header.
///
/// Every attribute is optional so that option sets can be layered with [`CookieOptions::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<SystemTime>,
    /// seconds, may be zero or negative to expire immediately
    pub max_age: Option<i64>,
    pub http_only: Option<bool>,
    pub secure: Option<bool>,
    pub same_site: Option<SameSite>,
}

impl CookieOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_expires(mut self, expires: SystemTime) -> Self {
        self.expires = Some(expires);
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.max_age = Some(max_age);
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = Some(http_only);
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Layers `other` over `self`: every attribute set in `other` wins, the others are kept.
    #[must_use]
    pub fn merge(self, other: &CookieOptions) -> Self {
        Self {
            path: other.path.clone().or(self.path),
            domain: other.domain.clone().or(self.domain),
            expires: other.expires.or(self.expires),
            max_age: other.max_age.or(self.max_age),
            http_only: other.http_only.or(self.http_only),
            secure: other.secure.or(self.secure),
            same_site: other.same_site.or(self.same_site),
        }
    }
}

/// Parses a `Cookie` request header into a name/value map.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for pair in header.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
        let Ok(cookie) = Cookie::parse_encoded(pair).or_else(|_| Cookie::parse(pair)) else {
            continue;
        };
        if cookies.contains_key(cookie.name()) {
            continue;
        }

        let value = cookie.value();
        let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
        cookies.insert(cookie.name().to_string(), value.to_string());
    }

    cookies
}

/// Serializes a `Set-Cookie` header value.
pub fn serialize_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = Cookie::build((name.to_string(), value.to_string()));

    if let Some(path) = &options.path {
        cookie = cookie.path(path.clone());
    }
    if let Some(domain) = &options.domain {
        cookie = cookie.domain(domain.clone());
    }
    if let Some(expires) = options.expires {
        cookie = cookie.expires(OffsetDateTime::from(expires));
    }
    if let Some(max_age) = options.max_age {
        cookie = cookie.max_age(Duration::seconds(max_age));
    }
    if let Some(http_only) = options.http_only {
        cookie = cookie.http_only(http_only);
    }
    if let Some(secure) = options.secure {
        cookie = cookie.secure(secure);
    }
    if let Some(same_site) = options.same_site {
        cookie = cookie.same_site(same_site);
    }

    cookie.build().encoded().to_string()
}
