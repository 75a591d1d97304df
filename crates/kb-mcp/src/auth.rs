use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Bearer-token gate for the MCP boundary (§4.8): a mismatch or absent
/// token yields "Unauthorized" before the request reaches any tool or
/// REST handler body. Disabled entirely when `mcp.auth_enabled` is
/// false, matching `Settings::mcp`.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub enabled: bool,
    pub token: Option<String>,
}

impl AuthState {
    pub fn new(enabled: bool, token: Option<String>) -> Self {
        Self { enabled, token }
    }

    fn accepts(&self, header_value: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(expected) = self.token.as_deref() else {
            return false;
        };
        header_value.and_then(|v| v.strip_prefix("Bearer ")).map(|token| token == expected).unwrap_or(false)
    }
}

pub async fn require_bearer_token(State(auth): State<Arc<AuthState>>, req: Request, next: Next) -> Response {
    let header_value = req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if auth.accepts(header_value) {
        return next.run(req).await;
    }

    (StatusCode::UNAUTHORIZED, Json(json!({ "success": false, "message": "Unauthorized", "data": null }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_auth_disabled_when_no_header_then_accepts() {
        let auth = AuthState::new(false, None);
        assert!(auth.accepts(None));
    }

    #[test]
    fn given_auth_enabled_when_header_missing_then_rejects() {
        let auth = AuthState::new(true, Some("secret".into()));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn given_auth_enabled_when_token_matches_then_accepts() {
        let auth = AuthState::new(true, Some("secret".into()));
        assert!(auth.accepts(Some("Bearer secret")));
    }

    #[test]
    fn given_auth_enabled_when_token_mismatches_then_rejects() {
        let auth = AuthState::new(true, Some("secret".into()));
        assert!(!auth.accepts(Some("Bearer wrong")));
    }
}
