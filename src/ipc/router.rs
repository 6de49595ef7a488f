use super::handlers;
use super::types::{AppState, HandlerCtx, Request};
use crate::auth::{self, AuthContext};
use crate::ipc::error::{err, ApiError};

fn authenticate(state: &AppState, req: &Request) -> Result<AuthContext, ApiError> {
    let token = req
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthenticated("login required".to_string()))?;
    let conn = state.db.as_ref().ok_or(ApiError::NoWorkspace)?;
    match auth::resolve_session(conn, token)? {
        Some(ctx) => Ok(ctx),
        None => {
            tracing::warn!(method = %req.method, "rejected invalid or expired session");
            Err(ApiError::Unauthenticated(
                "session is invalid or has expired".to_string(),
            ))
        }
    }
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "dispatch");

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle_public(state, &req) {
        return resp;
    }

    let auth = match authenticate(state, &req) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    let Some(conn) = state.db.as_ref() else {
        return ApiError::NoWorkspace.response(&req.id);
    };
    let ctx = HandlerCtx {
        conn,
        auth: &auth,
        config: &state.config,
        token: req.token.as_deref().unwrap_or("").trim(),
    };

    if let Some(resp) = handlers::auth::try_handle(&ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(&ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::subjects::try_handle(&ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(&ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(&ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::homework::try_handle(&ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::doubts::try_handle(&ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::dashboard::try_handle(&ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::analytics::try_handle(&ctx, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
