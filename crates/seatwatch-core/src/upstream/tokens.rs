//! Cookie and CSRF token bookkeeping across the login handshake
//!
//! Every handshake step may rotate cookies. Each step produces a
//! [`TokenDelta`] from its response, and the handshake folds the deltas into
//! a [`TokenJar`] in order; the final jar becomes the session.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::collections::BTreeMap;

use super::UpstreamError;
use crate::types::UpstreamSession;

pub const SESSION_COOKIE: &str = "laravel_session";
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// Tokens observed on a single response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenDelta {
    /// `(name, Some(value))` sets a cookie, `(name, None)` expires it.
    pub cookies: Vec<(String, Option<String>)>,
    pub csrf_token: Option<String>,
}

impl TokenDelta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        Self {
            cookies,
            csrf_token: None,
        }
    }

    pub fn with_page(mut self, html: &str) -> Self {
        self.csrf_token = mine_csrf_token(html);
        self
    }
}

/// Accumulated cookies and the latest CSRF header token.
#[derive(Debug, Clone, Default)]
pub struct TokenJar {
    cookies: BTreeMap<String, String>,
    csrf_token: Option<String>,
}

impl TokenJar {
    pub fn merge(&mut self, delta: TokenDelta) {
        for (name, value) in delta.cookies {
            match value {
                Some(value) => {
                    self.cookies.insert(name, value);
                }
                None => {
                    self.cookies.remove(&name);
                }
            }
        }
        if delta.csrf_token.is_some() {
            self.csrf_token = delta.csrf_token;
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    /// Value for the `Cookie` request header, `None` when the jar is empty.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Turn a completed handshake into a session. All three tokens must be
    /// present, otherwise the login did not really succeed.
    pub fn into_session(
        self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<UpstreamSession, UpstreamError> {
        let missing = |what: &str| UpstreamError::Auth(format!("login handshake did not yield {what}"));
        Ok(UpstreamSession {
            session_cookie: self
                .cookies
                .get(SESSION_COOKIE)
                .cloned()
                .ok_or_else(|| missing("a session cookie"))?,
            xsrf_cookie: self
                .cookies
                .get(XSRF_COOKIE)
                .cloned()
                .ok_or_else(|| missing("an XSRF cookie"))?,
            csrf_token: self.csrf_token.ok_or_else(|| missing("a CSRF token"))?,
            expires_at: now + ttl,
        })
    }
}

/// `Cookie` header for an established session.
pub fn session_cookie_header(session: &UpstreamSession) -> String {
    format!(
        "{}={}; {}={}",
        XSRF_COOKIE, session.xsrf_cookie, SESSION_COOKIE, session.session_cookie
    )
}

fn parse_set_cookie(header: &str) -> Option<(String, Option<String>)> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let expired = parts.any(|attr| {
        let attr = attr.trim().to_ascii_lowercase();
        attr == "max-age=0" || attr.starts_with("max-age=-")
    });
    let value = value.trim().trim_matches('"');
    if expired || value.is_empty() || value == "deleted" {
        Some((name.to_string(), None))
    } else {
        Some((name.to_string(), Some(value.to_string())))
    }
}

/// Extract the token of `<meta name="csrf-token" content="...">` from a page.
pub fn mine_csrf_token(html: &str) -> Option<String> {
    let start = html.find("name=\"csrf-token\"")?;
    let tag_start = html[..start].rfind('<')?;
    let tag_end = start + html[start..].find('>')?;
    let tag = &html[tag_start..tag_end];
    let content = tag.find("content=\"")? + "content=\"".len();
    let len = tag[content..].find('"')?;
    let token = &tag[content..content + len];
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for cookie in cookies {
            map.append(SET_COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        map
    }

    #[test]
    fn test_parse_set_cookie_variants() {
        assert_eq!(
            parse_set_cookie("laravel_session=abc; path=/; httponly"),
            Some(("laravel_session".to_string(), Some("abc".to_string())))
        );
        assert_eq!(
            parse_set_cookie("XSRF-TOKEN=deleted; expires=Thu, 01 Jan 1970 00:00:01 GMT"),
            Some(("XSRF-TOKEN".to_string(), None))
        );
        assert_eq!(
            parse_set_cookie("a=b; Max-Age=0"),
            Some(("a".to_string(), None))
        );
        assert_eq!(parse_set_cookie("garbage"), None);
    }

    #[test]
    fn test_later_steps_rotate_cookies() {
        let mut jar = TokenJar::default();
        jar.merge(TokenDelta::from_headers(&headers(&[
            "XSRF-TOKEN=x0; path=/",
            "laravel_session=s0; path=/",
        ])));
        jar.merge(TokenDelta::from_headers(&headers(&["laravel_session=s1; path=/"])));

        assert_eq!(jar.cookie(SESSION_COOKIE), Some("s1"));
        assert_eq!(jar.cookie(XSRF_COOKIE), Some("x0"));
        assert_eq!(
            jar.cookie_header().unwrap(),
            "XSRF-TOKEN=x0; laravel_session=s1"
        );
    }

    #[test]
    fn test_csrf_token_kept_until_replaced() {
        let mut jar = TokenJar::default();
        jar.merge(TokenDelta::default().with_page(r#"<meta name="csrf-token" content="t0">"#));
        jar.merge(TokenDelta::default());
        assert_eq!(jar.csrf_token(), Some("t0"));
        jar.merge(TokenDelta::default().with_page(r#"<meta content="t1" name="csrf-token" />"#));
        assert_eq!(jar.csrf_token(), Some("t1"));
    }

    #[test]
    fn test_mine_csrf_token() {
        let page = r#"<html><head><meta charset="utf-8"><meta name="csrf-token" content="tok123"></head></html>"#;
        assert_eq!(mine_csrf_token(page), Some("tok123".to_string()));
        assert_eq!(mine_csrf_token("<html></html>"), None);
        assert_eq!(mine_csrf_token(r#"<meta name="csrf-token" content="">"#), None);
    }

    #[test]
    fn test_into_session_requires_all_tokens() {
        let mut jar = TokenJar::default();
        jar.merge(TokenDelta::from_headers(&headers(&["laravel_session=s"])));
        assert!(matches!(
            jar.clone().into_session(Utc::now(), Duration::minutes(5)),
            Err(UpstreamError::Auth(_))
        ));

        jar.merge(
            TokenDelta::from_headers(&headers(&["XSRF-TOKEN=x"]))
                .with_page(r#"<meta name="csrf-token" content="c">"#),
        );
        let now = Utc::now();
        let session = jar.into_session(now, Duration::minutes(5)).unwrap();
        assert_eq!(session.session_cookie, "s");
        assert_eq!(session.xsrf_cookie, "x");
        assert_eq!(session.csrf_token, "c");
        assert_eq!(session.expires_at, now + Duration::minutes(5));
        assert_eq!(session_cookie_header(&session), "XSRF-TOKEN=x; laravel_session=s");
    }
}
