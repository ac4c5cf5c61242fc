use crate::application_port::*;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};

pub const REFRESH_COOKIE: &str = "refresh_token";
const COOKIE_ATTRIBUTES: &str = "Path=/; HttpOnly; Secure; SameSite=Lax";

/// `Set-Cookie` value carrying the refresh token. The cookie value is the
/// base64 of the ciphertext string.
pub fn refresh_cookie(token: &EncryptedRefreshToken, expires_at: DateTime<Utc>) -> String {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    format!(
        "{REFRESH_COOKIE}={}; Expires={}; Max-Age={max_age}; {COOKIE_ATTRIBUTES}",
        STANDARD.encode(token.0.as_bytes()),
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
    )
}

pub fn clear_refresh_cookie() -> String {
    format!(
        "{REFRESH_COOKIE}=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; {COOKIE_ATTRIBUTES}"
    )
}

/// Inverse of the encoding in [`refresh_cookie`]. `None` for anything that
/// is not base64 of a UTF-8 string.
pub fn decode_refresh_cookie(value: &str) -> Option<String> {
    let raw = STANDARD.decode(value.trim()).ok()?;
    String::from_utf8(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn cookie_round_trips_and_sets_attributes() {
        let token = EncryptedRefreshToken("abc+/==".to_string());
        let cookie = refresh_cookie(&token, Utc::now() + Duration::days(7));
        assert!(cookie.starts_with("refresh_token="));
        for attr in ["HttpOnly", "Secure", "SameSite=Lax", "Path=/", "Expires=", "Max-Age="] {
            assert!(cookie.contains(attr), "missing {attr}");
        }
        let value = cookie
            .strip_prefix("refresh_token=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert_eq!(decode_refresh_cookie(value).as_deref(), Some("abc+/=="));
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie();
        assert!(cookie.starts_with("refresh_token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn garbage_cookie_is_rejected() {
        assert_eq!(decode_refresh_cookie("%%%"), None);
        assert_eq!(decode_refresh_cookie(&STANDARD.encode([0xff, 0xfe])), None);
    }
}
