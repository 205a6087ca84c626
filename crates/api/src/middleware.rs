use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use stockhold_core::{Principal, UserId};

use crate::app::errors::json_error;
use crate::context::{PrincipalContext, RequestId};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Inbound request ids longer than this are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Assign (or honour) the request id, echo it as a header and as the leading
/// `request_id` field of JSON object bodies.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let id = inbound_request_id(req.headers()).unwrap_or_else(|| Uuid::now_v7().to_string());
    req.extensions_mut().insert(RequestId::new(id.clone()));

    let span = info_span!("request", request_id = %id);
    let response = next.run(req).instrument(span).await;

    let mut response = inject_request_id(response, &id).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Derive the acting principal from gateway headers.
///
/// No `x-user-id` means an anonymous call. A malformed one is rejected.
pub async fn principal_middleware(mut req: Request<Body>, next: Next) -> Response {
    let ctx = match principal_from_headers(req.headers()) {
        Ok(ctx) => ctx,
        Err(msg) => return json_error(StatusCode::BAD_REQUEST, "invalid_principal", msg),
    };
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

fn inbound_request_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    (!raw.is_empty() && raw.len() <= MAX_REQUEST_ID_LEN).then(|| raw.to_string())
}

fn principal_from_headers(headers: &HeaderMap) -> Result<PrincipalContext, String> {
    let Some(raw_id) = headers.get(USER_ID_HEADER) else {
        return Ok(PrincipalContext::anonymous());
    };
    let user_id: UserId = raw_id
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| format!("{USER_ID_HEADER} must be a UUID"))?;

    let identifier = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| user_id.to_string());

    Ok(PrincipalContext::new(Principal::new(user_id, identifier)))
}

async fn inject_request_id(response: Response, id: &str) -> Response {
    if !is_json(response.headers()) {
        return response;
    }
    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to buffer response body");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error",
            );
        }
    };
    let body = match with_leading_request_id(&bytes, id) {
        Some(rewritten) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Body::from(rewritten)
        }
        None => Body::from(bytes),
    };
    Response::from_parts(parts, body)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Splice `"request_id"` in as the first member of a JSON object.
/// Returns `None` for anything that is not an object.
fn with_leading_request_id(body: &[u8], id: &str) -> Option<Vec<u8>> {
    let start = body.iter().position(|b| !b.is_ascii_whitespace())?;
    if body[start] != b'{' {
        return None;
    }
    let rest = &body[start + 1..];
    let empty = rest.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'}');
    let value = serde_json::to_string(id).ok()?;

    let mut out = Vec::with_capacity(body.len() + value.len() + 16);
    out.extend_from_slice(b"{\"request_id\":");
    out.extend_from_slice(value.as_bytes());
    if !empty {
        out.push(b',');
    }
    out.extend_from_slice(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_leads_the_object() {
        let out = with_leading_request_id(br#"{"a":1,"b":[2]}"#, "abc").unwrap();
        assert_eq!(out, br#"{"request_id":"abc","a":1,"b":[2]}"#.to_vec());
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["b"][0], 2);
    }

    #[test]
    fn empty_object_gets_no_trailing_comma() {
        let out = with_leading_request_id(b" { } ", "x").unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, serde_json::json!({"request_id": "x"}));
    }

    #[test]
    fn non_objects_are_left_alone() {
        assert!(with_leading_request_id(b"[1,2]", "x").is_none());
        assert!(with_leading_request_id(b"", "x").is_none());
    }

    #[test]
    fn principal_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(principal_from_headers(&headers).unwrap(), PrincipalContext::anonymous());

        let user = UserId::new();
        headers.insert(USER_ID_HEADER, user.to_string().parse().unwrap());
        headers.insert(USER_EMAIL_HEADER, "ops@example.com".parse().unwrap());
        let ctx = principal_from_headers(&headers).unwrap();
        let principal = ctx.principal().unwrap();
        assert_eq!(principal.user_id(), user);
        assert_eq!(principal.identifier(), "ops@example.com");

        headers.insert(USER_ID_HEADER, "not-a-uuid".parse().unwrap());
        assert!(principal_from_headers(&headers).is_err());
    }

    #[test]
    fn oversized_inbound_request_id_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "a".repeat(200).parse().unwrap());
        assert!(inbound_request_id(&headers).is_none());
        headers.insert(REQUEST_ID_HEADER, "req-1".parse().unwrap());
        assert_eq!(inbound_request_id(&headers).as_deref(), Some("req-1"));
    }
}
