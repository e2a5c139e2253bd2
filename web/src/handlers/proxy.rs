//! Async proxy endpoint.
//!
//! `ANY /async/*path` forwards the call to the backend and holds the HTTP
//! request open until the async result arrives or the wait times out.

use crate::error::AppError;
use crate::response::GatewayResponse;
use crate::state::AppState;
use crate::WebResult;
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, header::AUTHORIZATION},
};
use gateway_relay_core::{BackendCall, CallMethod};
use serde_json::Value;

/// Map an HTTP method onto a backend call method.
fn call_method(method: &Method) -> Option<CallMethod> {
    match *method {
        Method::GET => Some(CallMethod::Get),
        Method::POST => Some(CallMethod::Post),
        Method::PUT => Some(CallMethod::Put),
        Method::DELETE => Some(CallMethod::Delete),
        _ => None,
    }
}

/// Build the backend call for an incoming request.
///
/// # Errors
///
/// Returns 405 for methods other than GET/POST/PUT/DELETE and 400 for a body
/// that is not JSON.
pub fn build_call(
    method: &Method,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<BackendCall, AppError> {
    let call_method = call_method(method).ok_or_else(|| AppError::method_not_allowed(method))?;

    let mut target = format!("/{}", path.trim_start_matches('/'));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }

    let mut call = BackendCall::new(call_method, target);

    if !body.iter().all(u8::is_ascii_whitespace) {
        let json: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::bad_request(format!("Request body is not valid JSON: {e}")))?;
        call = call.with_body(json);
    }

    if let Some(authorization) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        call = call.with_authorization(authorization);
    }

    Ok(call)
}

/// Forward a request to the async backend and wait for its result.
///
/// # Endpoint
///
/// ```text
/// ANY /async/*path
/// ```
///
/// # Errors
///
/// Returns [`AppError`] when the request cannot be forwarded at all; every
/// outcome after forwarding is rendered by [`GatewayResponse`].
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<GatewayResponse> {
    let call = build_call(&method, &path, query.as_deref(), &headers, &body)?;
    tracing::debug!(method = %call.method, path = %call.path, "Proxying async call");
    Ok(GatewayResponse(state.gateway.execute(call).await))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use serde_json::json;

    #[test]
    fn test_build_get_call_with_query() {
        let call = build_call(
            &Method::GET,
            "people/names",
            Some("page=2"),
            &HeaderMap::new(),
            b"",
        )
        .unwrap();
        assert_eq!(call, BackendCall::new(CallMethod::Get, "/people/names?page=2"));
    }

    #[test]
    fn test_build_post_call_with_body_and_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));

        let call = build_call(
            &Method::POST,
            "people/insert",
            None,
            &headers,
            br#"{"name":"Ayaka"}"#,
        )
        .unwrap();

        assert_eq!(call.method, CallMethod::Post);
        assert_eq!(call.body, Some(json!({"name": "Ayaka"})));
        assert_eq!(call.authorization.as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn test_whitespace_body_is_no_body() {
        let call = build_call(&Method::PUT, "x", None, &HeaderMap::new(), b" \n").unwrap();
        assert!(call.body.is_none());
    }

    #[test]
    fn test_invalid_json_is_bad_request() {
        let err = build_call(&Method::POST, "x", None, &HeaderMap::new(), b"{nope").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unsupported_method() {
        let err = build_call(&Method::PATCH, "x", None, &HeaderMap::new(), b"").unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
