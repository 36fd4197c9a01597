use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use posledger_auth::{Caller, JwtValidator};

use crate::app::errors;
use crate::context::{CallerContext, TokenQuery};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

impl AuthState {
    /// Verify the request's token, if it carries one.
    ///
    /// `Ok(None)` means no token was presented at all.
    pub fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> Result<Option<Caller>, StatusCode> {
        let Some(token) = extract_token(headers, uri)? else {
            return Ok(None);
        };
        let claims = self.jwt.validate(&token, Utc::now()).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            StatusCode::UNAUTHORIZED
        })?;
        Ok(Some(claims.caller()))
    }
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let caller = match state.resolve(req.headers(), req.uri()) {
        Ok(Some(caller)) => caller,
        Ok(None) | Err(_) => {
            return Err(errors::json_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing or invalid credentials",
            ));
        }
    };

    req.extensions_mut().insert(CallerContext::new(caller));
    Ok(next.run(req).await)
}

/// Bearer header first, then `?token=`.
fn extract_token(headers: &HeaderMap, uri: &Uri) -> Result<Option<String>, StatusCode> {
    if let Some(header) = headers.get(axum::http::header::AUTHORIZATION) {
        let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(StatusCode::UNAUTHORIZED)?
            .trim();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }
        return Ok(Some(token.to_string()));
    }

    let query = Query::<TokenQuery>::try_from_uri(uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    Ok(query.token.filter(|t| !t.trim().is_empty()))
}
