//! Session cookie jar with `Set-Cookie` normalization.
//!
//! Some servers emit the RFC 2965 `Version` attribute as a quoted string
//! (`Version="1"`) rather than a bare token. A class of cookie-policy
//! validators treats the attribute as numeric-only and rejects or mis-parses
//! the quoted form, which would silently drop the session cookie and break
//! every authenticated request that follows. [`NormalizingJar`] strips those
//! quotes at ingestion time so the rest of the client stays oblivious to the
//! quirk; everything else (domain/path matching, expiry) is delegated to the
//! standard [`reqwest::cookie::Jar`].

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use url::Url;

// Matches a quoted `Version` attribute after the cookie pair. The attribute
// name is case-insensitive on the wire.
static QUOTED_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(;\s*version\s*=\s*)"([^";]*)""#)
        .unwrap_or_else(|e| panic!("invalid static regex: {e}"))
});

/// Unquotes a `Version` attribute in a raw `Set-Cookie` header value.
///
/// Header values without a quoted `Version` attribute are returned borrowed
/// and unchanged; quoted attributes under any other name are not touched.
fn normalize_version_attribute(raw: &str) -> Cow<'_, str> {
    QUOTED_VERSION_RE.replace_all(raw, "${1}${2}")
}

/// A cookie jar that unquotes the `Version` attribute before storing.
///
/// Delegates all jar behavior to an inner [`Jar`]; only incoming
/// `Set-Cookie` header values are rewritten. Header values that are not
/// valid UTF-8 pass through untouched.
#[derive(Debug, Default)]
pub struct NormalizingJar {
    inner: Jar,
}

impl NormalizingJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a cookie given as a raw `Set-Cookie` string, scoped to `url`.
    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        self.inner
            .add_cookie_str(&normalize_version_attribute(cookie), url);
    }
}

impl CookieStore for NormalizingJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let normalized: Vec<HeaderValue> = cookie_headers
            .map(|header| match header.to_str() {
                Ok(raw) => match normalize_version_attribute(raw) {
                    Cow::Owned(fixed) => {
                        HeaderValue::from_str(&fixed).unwrap_or_else(|_| header.clone())
                    }
                    Cow::Borrowed(_) => header.clone(),
                },
                // Not UTF-8: leave it to the inner jar's own handling.
                Err(_) => header.clone(),
            })
            .collect();
        self.inner.set_cookies(&mut normalized.iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.inner.cookies(url)
    }
}
