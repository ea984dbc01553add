//! Caller identity from trusted proxy headers

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use confidant_memory::Identity;
use std::convert::Infallible;

/// Header carrying the stable user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the user's display name
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The identity set by the upstream auth proxy, if any.
///
/// Extraction never fails; the chat core decides what a missing identity means.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        match (header(USER_ID_HEADER), header(USER_NAME_HEADER)) {
            (Some(user_id), Some(name)) => Self(Some(Identity::new(user_id, name))),
            _ => Self(None),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_both_headers_required() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));
        assert!(Caller::from_headers(&headers).0.is_none());

        headers.insert(USER_NAME_HEADER, HeaderValue::from_static(" Grace "));
        let identity = Caller::from_headers(&headers).0.unwrap();
        assert_eq!(identity, Identity::new("u1", "Grace"));
    }

    #[test]
    fn test_blank_header_is_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("Grace"));
        assert!(Caller::from_headers(&headers).0.is_none());
    }
}
