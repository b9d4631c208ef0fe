//! Caller authentication for the credential mint endpoint.
//!
//! Devices prove they are ours with a shared secret, sent either as
//! `X-Token-Service-Secret: <secret>` or `Authorization: Bearer <secret>`.
//! The comparison runs in constant time for equal-length inputs.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

/// Header carrying the device shared secret
pub const SHARED_SECRET_HEADER: &str = "x-token-service-secret";

/// Compare a presented secret against the configured one.
///
/// Unequal lengths are rejected before any byte comparison; only the length
/// of the configured secret leaks through timing. Equal-length inputs are
/// compared with [`subtle::ConstantTimeEq`].
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();

    if presented.len() != expected.len() {
        return false;
    }

    presented.ct_eq(expected).into()
}

/// Extract the caller secret from the request headers.
///
/// The dedicated header wins over `Authorization`. Returns `None` when neither
/// carries a non-empty value.
pub fn extract_caller_secret(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(SHARED_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_secrets_match_symmetric() {
        let pairs = [
            ("abc", "abc"),
            ("abc", "abd"),
            ("abc", "abcd"),
            ("", ""),
            ("secret", "SECRET"),
        ];

        for (a, b) in pairs {
            assert_eq!(secrets_match(a, b), secrets_match(b, a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_secrets_match_length_sensitive() {
        assert!(secrets_match("shared-secret", "shared-secret"));
        assert!(!secrets_match("shared-secret", "shared-secre"));
        assert!(!secrets_match("shared-secret", "shared-secret "));
        assert!(!secrets_match("shared-secret", "shared-secreT"));
    }

    #[test]
    fn test_extract_prefers_dedicated_header() {
        let mut headers = HeaderMap::new();
        headers.insert(SHARED_SECRET_HEADER, HeaderValue::from_static("from-header"));
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer from-bearer"),
        );

        assert_eq!(
            extract_caller_secret(&headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn test_extract_bearer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok"));
        assert_eq!(extract_caller_secret(&headers).as_deref(), Some("tok"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_caller_secret(&headers), None);
    }

    #[test]
    fn test_extract_missing() {
        assert_eq!(extract_caller_secret(&HeaderMap::new()), None);
    }
}
