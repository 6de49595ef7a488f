use crate::auth::{self, Role};
use crate::ipc::error::ApiError;
use crate::ipc::handlers::{run, Handler};
use crate::ipc::helpers::{ensure_student, optional_id, require_role, required_id, required_str};
use crate::ipc::types::{HandlerCtx, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};

fn users_list(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    require_role(ctx, Role::Admin)?;
    let mut stmt = ctx.conn.prepare(
        "SELECT u.id, u.username, u.role, s.id, s.name
         FROM users u
         LEFT JOIN students s ON s.user_id = u.id
         ORDER BY u.role, u.username",
    )?;
    let users = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "username": r.get::<_, String>(1)?,
                "role": r.get::<_, String>(2)?,
                "studentId": r.get::<_, Option<i64>>(3)?,
                "studentName": r.get::<_, Option<String>>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut stmt = ctx
        .conn
        .prepare("SELECT id, name FROM students WHERE user_id IS NULL ORDER BY name")?;
    let unlinked = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({ "users": users, "studentsWithoutUsers": unlinked }))
}

fn users_create(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_role(ctx, Role::Admin)?;
    let username = required_str(params, "username")?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_params("missing password"))?;
    let role = Role::parse(&required_str(params, "role")?)
        .ok_or_else(|| ApiError::bad_params("role must be one of: admin, teacher, student"))?;
    let student_id = optional_id(params, "studentId")?;
    if student_id.is_some() && role != Role::Student {
        return Err(ApiError::bad_params("studentId is only valid for role student"));
    }
    if let Some(sid) = student_id {
        ensure_student(ctx.conn, sid)?;
        let linked: Option<i64> = ctx
            .conn
            .query_row("SELECT user_id FROM students WHERE id = ?", [sid], |r| {
                r.get(0)
            })
            .optional()?
            .flatten();
        if linked.is_some() {
            return Err(ApiError::conflict("student already has an account"));
        }
    }

    let hash = auth::hash_password(password).map_err(|e| ApiError::Internal(e.to_string()))?;
    let tx = ctx.conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO users(username, password_hash, role) VALUES(?, ?, ?)",
        (&username, &hash, role.as_str()),
    )
    .map_err(|e| ApiError::from_unique(e, "username already exists"))?;
    let user_id = tx.last_insert_rowid();
    if let Some(sid) = student_id {
        tx.execute(
            "UPDATE students SET user_id = ? WHERE id = ?",
            (user_id, sid),
        )?;
    }
    tx.commit()?;

    tracing::info!(%username, %role, "user created");
    Ok(json!({ "userId": user_id, "username": username, "role": role.as_str(), "studentId": student_id }))
}

fn users_delete(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_role(ctx, Role::Admin)?;
    let user_id = required_id(params, "userId")?;
    // Linked student is detached by ON DELETE SET NULL; sessions cascade.
    let n = ctx.conn.execute("DELETE FROM users WHERE id = ?", [user_id])?;
    if n == 0 {
        return Err(ApiError::not_found("user"));
    }
    tracing::info!(user_id, "user deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "users.list" => users_list,
        "users.create" => users_create,
        "users.delete" => users_delete,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
