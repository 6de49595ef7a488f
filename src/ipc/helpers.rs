use crate::auth::Role;
use crate::dates;
use crate::ipc::error::ApiError;
use crate::ipc::types::HandlerCtx;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_str(params: &Value, key: &str) -> Result<String, ApiError> {
    optional_str(params, key).ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

/// Ids arrive as JSON numbers or, from form fields, numeric strings.
pub fn optional_id(params: &Value, key: &str) -> Result<Option<i64>, ApiError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ApiError::bad_params(format!("{} must be an integer", key))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::bad_params(format!("{} must be an integer", key))),
        Some(_) => Err(ApiError::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn required_id(params: &Value, key: &str) -> Result<i64, ApiError> {
    optional_id(params, key)?.ok_or_else(|| ApiError::bad_params(format!("missing {}", key)))
}

pub fn required_day(params: &Value, key: &str) -> Result<NaiveDate, ApiError> {
    let raw = required_str(params, key)?;
    dates::parse_day(&raw).ok_or_else(|| {
        ApiError::bad_params(format!("invalid {}; use yyyy-mm-dd or dd-mm-yyyy", key))
    })
}

pub fn optional_day(params: &Value, key: &str) -> Result<Option<NaiveDate>, ApiError> {
    match optional_str(params, key) {
        None => Ok(None),
        Some(raw) => dates::parse_day(&raw).map(Some).ok_or_else(|| {
            ApiError::bad_params(format!("invalid {}; use yyyy-mm-dd or dd-mm-yyyy", key))
        }),
    }
}

/// `year` / `month` may be sent as numbers or strings.
pub fn optional_text_or_number(params: &Value, key: &str) -> Option<String> {
    match params.get(key) {
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => optional_str(params, key),
    }
}

pub fn require_staff(ctx: &HandlerCtx) -> Result<(), ApiError> {
    if ctx.auth.role.is_staff() {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

pub fn require_role(ctx: &HandlerCtx, role: Role) -> Result<(), ApiError> {
    if ctx.auth.role == role {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

/// Student row linked to the caller's account.
pub fn current_student_id(ctx: &HandlerCtx) -> Result<i64, ApiError> {
    ctx.conn
        .query_row(
            "SELECT id FROM students WHERE user_id = ?",
            [ctx.auth.user_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| ApiError::not_found("student profile"))
}

fn exists(conn: &Connection, sql: &str, id: i64) -> Result<bool, ApiError> {
    Ok(conn
        .query_row(sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

pub fn ensure_subject(conn: &Connection, id: i64) -> Result<(), ApiError> {
    if exists(conn, "SELECT 1 FROM subjects WHERE id = ?", id)? {
        Ok(())
    } else {
        Err(ApiError::not_found("subject"))
    }
}

pub fn ensure_student(conn: &Connection, id: i64) -> Result<(), ApiError> {
    if exists(conn, "SELECT 1 FROM students WHERE id = ?", id)? {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("student {} not found", id)))
    }
}

pub fn ensure_homework(conn: &Connection, id: i64) -> Result<(), ApiError> {
    if exists(conn, "SELECT 1 FROM homework WHERE id = ?", id)? {
        Ok(())
    } else {
        Err(ApiError::not_found("homework"))
    }
}
