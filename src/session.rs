//! Cookie-based sessions.
//!
//! The session record lives entirely in the `mathgen_session` cookie as
//! base64-encoded JSON `{username, userId, issuedAt}`. There is no server
//! side store and the value is not signed: a request carrying the cookie is
//! treated as authenticated.

use axum::http::{header, HeaderMap, HeaderValue};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE_NAME: &str = "mathgen_session";

/// Seven days.
pub const SESSION_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

/// What the cookie carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub username: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "issuedAt")]
    pub issued_at: i64,
}

impl SessionPayload {
    pub fn new(username: impl Into<String>, user_id: Option<serde_json::Value>) -> Self {
        Self {
            username: username.into(),
            user_id,
            issued_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of strings and numbers cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Decode a cookie value; `None` if it is not base64 JSON of the right
    /// shape.
    pub fn decode(value: &str) -> Option<Self> {
        let bytes = STANDARD.decode(value.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Value of the session cookie, if the request carries a non-empty one.
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` builder for the session cookie.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiePolicy {
    /// Add the `Secure` attribute (HTTPS deployments).
    pub secure: bool,
}

impl CookiePolicy {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// Mint a session cookie for a payload.
    pub fn session_cookie(&self, payload: &SessionPayload) -> HeaderValue {
        self.build(&payload.encode(), SESSION_MAX_AGE_SECS)
    }

    /// Clear the session cookie: empty value, zero max-age.
    pub fn clear_cookie(&self) -> HeaderValue {
        self.build("", 0)
    }

    fn build(&self, value: &str, max_age: i64) -> HeaderValue {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax"
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        // Base64 and the fixed attributes are always valid header bytes.
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_wire_field_names() {
        let payload = SessionPayload {
            username: "ada".into(),
            user_id: Some(serde_json::json!(42)),
            issued_at: 1_700_000_000_000,
        };
        let decoded = STANDARD.decode(payload.encode()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(json["username"], "ada");
        assert_eq!(json["userId"], 42);
        assert_eq!(json["issuedAt"], 1_700_000_000_000i64);
        assert_eq!(SessionPayload::decode(&payload.encode()), Some(payload));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(SessionPayload::decode("%%%"), None);
        assert_eq!(SessionPayload::decode(&STANDARD.encode("[1,2]")), None);
    }

    #[test]
    fn extract_finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; mathgen_session=abc=; lang=en"),
        );
        assert_eq!(extract_session_cookie(&headers).as_deref(), Some("abc="));
    }

    #[test]
    fn extract_ignores_empty_or_absent() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_cookie(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("mathgen_session="));
        assert_eq!(extract_session_cookie(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("other_session=x"));
        assert_eq!(extract_session_cookie(&headers), None);
    }

    #[test]
    fn cookie_attributes() {
        let payload = SessionPayload::new("ada", None);
        let cookie = CookiePolicy::new(false).session_cookie(&payload);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("mathgen_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));

        let cleared = CookiePolicy::new(true).clear_cookie();
        let cleared = cleared.to_str().unwrap();
        assert!(cleared.starts_with("mathgen_session=;"));
        assert!(cleared.contains("Max-Age=0"));
        assert!(cleared.ends_with("; Secure"));
    }
}
