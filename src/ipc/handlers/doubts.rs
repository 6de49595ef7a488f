use crate::auth::Role;
use crate::dates;
use crate::ipc::error::ApiError;
use crate::ipc::handlers::{run, Handler};
use crate::ipc::helpers::{
    current_student_id, ensure_homework, ensure_student, optional_id, optional_str,
    require_role, require_staff, required_id, required_str,
};
use crate::ipc::types::{HandlerCtx, Request};
use crate::stats::{is_answered, DoubtStats};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params_from_iter, types::Value as SqlValue, OptionalExtension};
use serde_json::{json, Value};

struct DoubtRow {
    id: i64,
    homework_id: i64,
    homework_title: String,
    student_id: i64,
    student_name: String,
    question: String,
    answer: Option<String>,
    asked_at: NaiveDateTime,
}

impl DoubtRow {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "homeworkId": self.homework_id,
            "homeworkTitle": self.homework_title,
            "studentId": self.student_id,
            "studentName": self.student_name,
            "question": self.question,
            "answer": self.answer,
            "answered": is_answered(self.answer.as_deref()),
            "askedAt": dates::display_timestamp(self.asked_at),
        })
    }
}

const DOUBT_SELECT: &str = "SELECT d.id, d.homework_id, h.title, d.student_id, st.name,
        d.question, d.answer, d.asked_at
     FROM doubts d
     JOIN homework h ON h.id = d.homework_id
     JOIN students st ON st.id = d.student_id";

fn query_doubts(
    ctx: &HandlerCtx,
    conditions: Vec<String>,
    values: Vec<SqlValue>,
) -> Result<Vec<DoubtRow>, ApiError> {
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "{}{} ORDER BY d.asked_at DESC, d.id DESC",
        DOUBT_SELECT, where_clause
    );
    let mut stmt = ctx.conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok(DoubtRow {
                id: r.get(0)?,
                homework_id: r.get(1)?,
                homework_title: r.get(2)?,
                student_id: r.get(3)?,
                student_name: r.get(4)?,
                question: r.get(5)?,
                answer: r.get(6)?,
                asked_at: r.get(7)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn stats_of(rows: &[DoubtRow]) -> DoubtStats {
    DoubtStats::from_answers(rows.iter().map(|d| d.answer.as_deref()))
}

/// Owner of a doubt; students may only touch their own.
fn authorize_owner(ctx: &HandlerCtx, doubt_id: i64) -> Result<(), ApiError> {
    let owner: i64 = ctx
        .conn
        .query_row(
            "SELECT student_id FROM doubts WHERE id = ?",
            [doubt_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| ApiError::not_found("doubt"))?;
    if ctx.auth.role.is_staff() {
        return Ok(());
    }
    if current_student_id(ctx)? == owner {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

fn doubts_for_homework(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    let homework_id = required_id(params, "homeworkId")?;
    let title: String = ctx
        .conn
        .query_row(
            "SELECT title FROM homework WHERE id = ?",
            [homework_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| ApiError::not_found("homework"))?;
    let rows = query_doubts(
        ctx,
        vec!["d.homework_id = ?".to_string()],
        vec![SqlValue::Integer(homework_id)],
    )?;

    let mut stmt = ctx
        .conn
        .prepare("SELECT id, name FROM students ORDER BY name, roll_no")?;
    let students = stmt
        .query_map([], |r| {
            Ok(json!({ "id": r.get::<_, i64>(0)?, "name": r.get::<_, String>(1)? }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({
        "homework": { "id": homework_id, "title": title },
        "doubts": rows.iter().map(DoubtRow::to_json).collect::<Vec<_>>(),
        "students": students,
    }))
}

fn doubts_ask(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    let student_id = if ctx.auth.role == Role::Student {
        current_student_id(ctx)?
    } else {
        let sid = optional_id(params, "studentId")?
            .ok_or_else(|| ApiError::bad_params("select a student to ask on behalf of"))?;
        ensure_student(ctx.conn, sid)?;
        sid
    };
    let homework_id = required_id(params, "homeworkId")?;
    let question = required_str(params, "question")?;
    ensure_homework(ctx.conn, homework_id)?;
    let asked_at = Local::now().naive_local();
    ctx.conn.execute(
        "INSERT INTO doubts(homework_id, student_id, question, asked_at) VALUES(?, ?, ?, ?)",
        (homework_id, student_id, &question, asked_at),
    )?;
    let id = ctx.conn.last_insert_rowid();
    tracing::info!(doubt_id = id, homework_id, student_id, "doubt asked");
    Ok(json!({
        "doubtId": id,
        "askedAt": dates::display_timestamp(asked_at),
    }))
}

fn doubts_answer(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let doubt_id = required_id(params, "doubtId")?;
    let answer = required_str(params, "answer")?;
    let n = ctx.conn.execute(
        "UPDATE doubts SET answer = ? WHERE id = ?",
        (&answer, doubt_id),
    )?;
    if n == 0 {
        return Err(ApiError::not_found("doubt"));
    }
    Ok(json!({ "doubtId": doubt_id, "answered": true }))
}

fn doubts_update(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    let doubt_id = required_id(params, "doubtId")?;
    let question = required_str(params, "question")?;
    authorize_owner(ctx, doubt_id)?;
    ctx.conn.execute(
        "UPDATE doubts SET question = ? WHERE id = ?",
        (&question, doubt_id),
    )?;
    Ok(json!({ "doubtId": doubt_id, "question": question }))
}

fn doubts_delete(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    let doubt_id = required_id(params, "doubtId")?;
    authorize_owner(ctx, doubt_id)?;
    ctx.conn
        .execute("DELETE FROM doubts WHERE id = ?", [doubt_id])?;
    Ok(json!({ "deleted": true }))
}

fn doubts_mine(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_role(ctx, Role::Student)?;
    let student_id = current_student_id(ctx)?;
    let mut conditions = vec!["d.student_id = ?".to_string()];
    let mut values = vec![SqlValue::Integer(student_id)];
    if let Some(hid) = optional_id(params, "homeworkId")? {
        conditions.push("d.homework_id = ?".to_string());
        values.push(SqlValue::Integer(hid));
    }
    let rows = query_doubts(ctx, conditions, values)?;
    Ok(json!({
        "doubts": rows.iter().map(DoubtRow::to_json).collect::<Vec<_>>(),
        "stats": stats_of(&rows),
    }))
}

/// Staff listing; stats describe the rows returned.
fn doubts_list(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let status = optional_str(params, "status").unwrap_or_else(|| "all".to_string());
    let mut conditions = Vec::new();
    let mut values = Vec::new();
    match status.as_str() {
        "all" => {}
        "answered" => conditions.push("(d.answer IS NOT NULL AND d.answer != '')".to_string()),
        "unanswered" => conditions.push("(d.answer IS NULL OR d.answer = '')".to_string()),
        other => {
            return Err(ApiError::bad_params(format!(
                "status must be one of: all, answered, unanswered (got {})",
                other
            )))
        }
    }
    if let Some(hid) = optional_id(params, "homeworkId")? {
        conditions.push("d.homework_id = ?".to_string());
        values.push(SqlValue::Integer(hid));
    }
    let rows = query_doubts(ctx, conditions, values)?;
    Ok(json!({
        "status": status,
        "doubts": rows.iter().map(DoubtRow::to_json).collect::<Vec<_>>(),
        "stats": stats_of(&rows),
    }))
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "doubts.forHomework" => doubts_for_homework,
        "doubts.ask" => doubts_ask,
        "doubts.answer" => doubts_answer,
        "doubts.update" => doubts_update,
        "doubts.delete" => doubts_delete,
        "doubts.mine" => doubts_mine,
        "doubts.list" => doubts_list,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
