use crate::auth::{self, Role};
use crate::ipc::error::{respond, ApiError};
use crate::ipc::handlers::{run, Handler};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, HandlerCtx, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};

fn login(state: &AppState, params: &Value) -> Result<Value, ApiError> {
    let conn = state.db.as_ref().ok_or(ApiError::NoWorkspace)?;
    let username = required_str(params, "username")?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::bad_params("missing password"))?;
    let role = Role::parse(&required_str(params, "role")?)
        .ok_or_else(|| ApiError::bad_params("role must be one of: admin, teacher, student"))?;

    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ? AND role = ?",
            (&username, role.as_str()),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((user_id, _)) = row.filter(|(_, hash)| auth::verify_password(password, hash))
    else {
        tracing::warn!(%username, %role, "failed login");
        return Err(ApiError::Unauthenticated(
            "invalid credentials or role".to_string(),
        ));
    };

    let token = auth::issue_session(conn, user_id, state.config.auth.session_ttl_minutes)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let student_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM students WHERE user_id = ?",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    tracing::info!(%username, %role, "login");
    Ok(json!({
        "token": token,
        "user": { "id": user_id, "username": username, "role": role.as_str() },
        "studentId": student_id,
        "homeView": role.home_view(),
    }))
}

fn logout(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    let revoked = auth::revoke_session(ctx.conn, ctx.token)?;
    Ok(json!({ "loggedOut": revoked }))
}

fn session(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    let student: Option<(i64, Option<String>)> = ctx
        .conn
        .query_row(
            "SELECT id, profile_handle FROM students WHERE user_id = ?",
            [ctx.auth.user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(json!({
        "user": {
            "id": ctx.auth.user_id,
            "username": ctx.auth.username,
            "role": ctx.auth.role.as_str(),
        },
        "homeView": ctx.auth.role.home_view(),
        "studentId": student.as_ref().map(|s| s.0),
        "profileHandle": student.and_then(|s| s.1),
    }))
}

/// `auth.login` is the one method that needs no token.
pub fn try_handle_public(state: &AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "auth.login" => Some(respond(&req.id, login(state, &req.params))),
        _ => None,
    }
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "auth.logout" => logout,
        "auth.session" => session,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
