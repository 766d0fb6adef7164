//! Session cookies and the per-login cookie cache.

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

/// Cookie carrying the SSO token.
pub const STRATIO_COOKIE: &str = "stratio-cookie";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse the `name=value` part of a `Set-Cookie` header.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        (!name.is_empty()).then(|| Self::new(name.trim(), value.trim()))
    }
}

/// The cookies sent with every REST request.
#[derive(Clone, Debug, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn set(&mut self, cookies: Vec<Cookie>) {
        self.cookies = cookies;
    }

    /// Add `cookie`, replacing a cookie of the same name.
    pub fn store(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|stored| stored.name == cookie.name) {
            Some(stored) => *stored = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// `Cookie` header value, or `None` when the jar is empty.
    pub fn header(&self) -> Option<String> {
        (!self.cookies.is_empty()).then(|| {
            self.cookies
                .iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value))
                .collect::<Vec<_>>()
                .join("; ")
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedCookies {
    pub exp: i64,
    pub cookies: Vec<Cookie>,
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Expiry (`exp`, in seconds) of a JWT, if it can be read.
pub fn token_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Claims>(&decoded)
        .ok()
        .map(|claims| claims.exp)
}

/// Cookies of previous logins keyed by `tenant:user`.
#[derive(Clone, Debug, Default)]
pub struct CookieCache {
    entries: HashMap<String, CachedCookies>,
}

impl CookieCache {
    /// Cache `cookies` until the expiry of `token`. Tokens that cannot be
    /// decoded are not cached.
    pub fn insert(&mut self, key: impl Into<String>, cookies: Vec<Cookie>, token: &str) {
        if let Some(exp) = token_expiry(token) {
            self.entries.insert(key.into(), CachedCookies { exp, cookies });
        }
    }

    pub fn get(&self, key: &str) -> Option<&CachedCookies> {
        self.entries.get(key)
    }

    /// Cached cookies that have not expired at `now` (seconds since epoch).
    pub fn get_valid(&self, key: &str, now: i64) -> Option<&[Cookie]> {
        self.get(key)
            .filter(|entry| entry.exp > now)
            .map(|entry| entry.cookies.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(payload: &str) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.signature",
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn set_cookie_header() {
        let cookie = Cookie::parse_set_cookie("stratio-cookie=abc.def; Path=/; HttpOnly").unwrap();
        assert_eq!(cookie, Cookie::new("stratio-cookie", "abc.def"));
        assert!(Cookie::parse_set_cookie("garbage").is_none());
    }

    #[test]
    fn jar_header() {
        let mut jar = CookieJar::default();
        assert_eq!(jar.header(), None);
        jar.set(vec![Cookie::new("a", "1"), Cookie::new("b", "2")]);
        assert_eq!(jar.header().as_deref(), Some("a=1; b=2"));
    }

    #[test]
    fn stored_cookies_replace_by_name() {
        let mut jar = CookieJar::default();
        jar.store(Cookie::new("JSESSIONID", "1"));
        jar.store(Cookie::new(STRATIO_COOKIE, "token"));
        jar.store(Cookie::new("JSESSIONID", "2"));
        assert_eq!(
            jar.cookies(),
            [Cookie::new("JSESSIONID", "2"), Cookie::new(STRATIO_COOKIE, "token")]
        );
    }

    #[test]
    fn caches_until_expiry() {
        let mut cache = CookieCache::default();
        let cookies = vec![Cookie::new(STRATIO_COOKIE, "token")];
        cache.insert("tenant:user", cookies.clone(), &jwt(r#"{"exp":2000,"sub":"user"}"#));

        assert_eq!(cache.get("tenant:user").map(|entry| entry.exp), Some(2000));
        assert_eq!(cache.get_valid("tenant:user", 1999), Some(cookies.as_slice()));
        assert_eq!(cache.get_valid("tenant:user", 2000), None);
    }

    #[test]
    fn undecodable_tokens_are_skipped() {
        let mut cache = CookieCache::default();
        cache.insert("a", vec![], "not-a-jwt");
        cache.insert("b", vec![], &jwt(r#"{"sub":"no exp"}"#));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
    }
}
