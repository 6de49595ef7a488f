use crate::auth::Role;
use crate::dates;
use crate::ipc::error::ApiError;
use crate::ipc::handlers::{run, Handler};
use crate::ipc::helpers::{
    current_student_id, ensure_homework, ensure_student, ensure_subject, optional_day,
    optional_id, optional_str, require_role, require_staff, required_day, required_id,
    required_str,
};
use crate::ipc::types::{HandlerCtx, Request};
use chrono::{Local, NaiveDate};
use rusqlite::{params_from_iter, types::Value as SqlValue, OptionalExtension};
use serde_json::{json, Map, Value};

const CALENDAR_COLOR: &str = "#b58900";
const MAX_GRADE: i64 = 100;

fn homework_list(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    let mut stmt = ctx.conn.prepare(
        "SELECT h.id, h.title, s.name, h.due_date
         FROM homework h
         JOIN subjects s ON s.id = h.subject_id
         ORDER BY h.posted_date DESC, h.id DESC",
    )?;
    let homework = stmt
        .query_map([], |r| {
            let due: NaiveDate = r.get(3)?;
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "title": r.get::<_, String>(1)?,
                "subject": r.get::<_, String>(2)?,
                "dueDate": dates::display_day(due),
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "homework": homework }))
}

/// Staff grid: filtered homework, the roster, and grades keyed by
/// homework id then student id.
fn homework_manage(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let subject_id = optional_id(params, "subjectId")?;
    let posted = optional_day(params, "date")?;

    let mut conditions = vec!["1 = 1".to_string()];
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(sid) = subject_id {
        conditions.push("h.subject_id = ?".to_string());
        values.push(SqlValue::Integer(sid));
    }
    if let Some(d) = posted {
        conditions.push("h.posted_date = ?".to_string());
        values.push(SqlValue::Text(dates::iso_day(d)));
    }
    let sql = format!(
        "SELECT h.id, h.title, h.description, h.posted_date, h.due_date, s.name, s.id
         FROM homework h
         JOIN subjects s ON s.id = h.subject_id
         WHERE {}
         ORDER BY h.posted_date DESC, h.id DESC",
        conditions.join(" AND ")
    );
    let mut stmt = ctx.conn.prepare(&sql)?;
    let homeworks = stmt
        .query_map(params_from_iter(values), |r| {
            let posted: NaiveDate = r.get(3)?;
            let due: NaiveDate = r.get(4)?;
            Ok((
                r.get::<_, i64>(0)?,
                json!({
                    "id": r.get::<_, i64>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "description": r.get::<_, String>(2)?,
                    "postedDate": dates::display_day(posted),
                    "dueDate": dates::display_day(due),
                    "subject": r.get::<_, String>(5)?,
                    "subjectId": r.get::<_, i64>(6)?,
                }),
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut stmt = ctx
        .conn
        .prepare("SELECT id, name FROM students ORDER BY name, roll_no")?;
    let students = stmt
        .query_map([], |r| {
            Ok(json!({ "id": r.get::<_, i64>(0)?, "name": r.get::<_, String>(1)? }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut submissions = Map::new();
    if !homeworks.is_empty() {
        let placeholders = std::iter::repeat("?")
            .take(homeworks.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT homework_id, student_id, grade
             FROM homework_submissions
             WHERE homework_id IN ({})",
            placeholders
        );
        let ids: Vec<SqlValue> = homeworks
            .iter()
            .map(|(id, _)| SqlValue::Integer(*id))
            .collect();
        let mut stmt = ctx.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(ids), |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, Option<i64>>(2)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        for (hw, st, grade) in rows {
            let entry = submissions
                .entry(hw.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(obj) = entry.as_object_mut() {
                obj.insert(st.to_string(), json!(grade));
            }
        }
    }

    Ok(json!({
        "homework": homeworks.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
        "students": students,
        "submissions": submissions,
    }))
}

struct HomeworkInput {
    subject_id: i64,
    title: String,
    description: String,
    due_date: NaiveDate,
}

fn parse_homework_input(ctx: &HandlerCtx, params: &Value) -> Result<HomeworkInput, ApiError> {
    let subject_id = required_id(params, "subjectId")?;
    let title = required_str(params, "title")?;
    let description = optional_str(params, "description").unwrap_or_default();
    let due_date = required_day(params, "dueDate")?;
    ensure_subject(ctx.conn, subject_id)?;
    Ok(HomeworkInput {
        subject_id,
        title,
        description,
        due_date,
    })
}

fn homework_create(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let input = parse_homework_input(ctx, params)?;
    let posted = Local::now().date_naive();
    ctx.conn.execute(
        "INSERT INTO homework(subject_id, title, description, posted_date, due_date)
         VALUES(?, ?, ?, ?, ?)",
        (
            input.subject_id,
            &input.title,
            &input.description,
            posted,
            input.due_date,
        ),
    )?;
    let id = ctx.conn.last_insert_rowid();
    tracing::info!(homework_id = id, subject_id = input.subject_id, "homework created");
    Ok(json!({
        "homeworkId": id,
        "postedDate": dates::display_day(posted),
        "dueDate": dates::display_day(input.due_date),
    }))
}

fn homework_update(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let homework_id = required_id(params, "homeworkId")?;
    ensure_homework(ctx.conn, homework_id)?;
    let input = parse_homework_input(ctx, params)?;
    ctx.conn.execute(
        "UPDATE homework SET subject_id = ?, title = ?, description = ?, due_date = ? WHERE id = ?",
        (
            input.subject_id,
            &input.title,
            &input.description,
            input.due_date,
            homework_id,
        ),
    )?;
    Ok(json!({
        "homeworkId": homework_id,
        "dueDate": dates::display_day(input.due_date),
    }))
}

fn homework_delete(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let homework_id = required_id(params, "homeworkId")?;
    // Submissions and doubts go with it (ON DELETE CASCADE).
    let n = ctx
        .conn
        .execute("DELETE FROM homework WHERE id = ?", [homework_id])?;
    if n == 0 {
        return Err(ApiError::not_found("homework"));
    }
    Ok(json!({ "deleted": true }))
}

fn parse_grade(params: &Value) -> Result<Option<i64>, ApiError> {
    match params.get("grade") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let g = v
                .as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
                .ok_or_else(|| ApiError::bad_params("grade must be an integer"))?;
            if !(0..=MAX_GRADE).contains(&g) {
                return Err(ApiError::bad_params(format!(
                    "grade must be between 0 and {}",
                    MAX_GRADE
                )));
            }
            Ok(Some(g))
        }
    }
}

/// Creates the submission row when missing; always leaves it Graded.
fn homework_grade(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let homework_id = required_id(params, "homeworkId")?;
    let student_id = required_id(params, "studentId")?;
    let grade = parse_grade(params)?;
    ensure_homework(ctx.conn, homework_id)?;
    ensure_student(ctx.conn, student_id)?;
    ctx.conn.execute(
        "INSERT INTO homework_submissions(homework_id, student_id, grade, status)
         VALUES(?, ?, ?, 'Graded')
         ON CONFLICT(homework_id, student_id)
         DO UPDATE SET grade = excluded.grade, status = 'Graded'",
        (homework_id, student_id, grade),
    )?;
    Ok(json!({
        "homeworkId": homework_id,
        "studentId": student_id,
        "status": "Graded",
        "grade": grade,
    }))
}

fn status_target(ctx: &HandlerCtx, params: &Value) -> Result<Option<i64>, ApiError> {
    if ctx.auth.role == Role::Student {
        return current_student_id(ctx).map(Some);
    }
    if let Some(sid) = optional_id(params, "studentId")? {
        ensure_student(ctx.conn, sid)?;
        return Ok(Some(sid));
    }
    Ok(ctx
        .conn
        .query_row("SELECT id FROM students ORDER BY id LIMIT 1", [], |r| {
            r.get(0)
        })
        .optional()?)
}

/// Every homework with one student's status; no submission row reads
/// as Pending.
fn homework_status(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    let Some(student_id) = status_target(ctx, params)? else {
        return Ok(json!({ "studentId": Value::Null, "homework": [] }));
    };
    let mut stmt = ctx.conn.prepare(
        "SELECT h.id, h.title, h.description, h.due_date, s.name,
                COALESCE(hs.status, 'Pending'), hs.grade
         FROM homework h
         JOIN subjects s ON s.id = h.subject_id
         LEFT JOIN homework_submissions hs
           ON hs.homework_id = h.id AND hs.student_id = ?
         ORDER BY h.due_date ASC, h.id ASC",
    )?;
    let homework = stmt
        .query_map([student_id], |r| {
            let due: NaiveDate = r.get(3)?;
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "title": r.get::<_, String>(1)?,
                "description": r.get::<_, String>(2)?,
                "dueDate": dates::display_day(due),
                "subject": r.get::<_, String>(4)?,
                "status": r.get::<_, String>(5)?,
                "grade": r.get::<_, Option<i64>>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "studentId": student_id, "homework": homework }))
}

fn homework_submit(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_role(ctx, Role::Student)?;
    let student_id = current_student_id(ctx)?;
    let homework_id = required_id(params, "homeworkId")?;
    let status = optional_str(params, "status").unwrap_or_else(|| "Submitted".to_string());
    if status != "Pending" && status != "Submitted" {
        return Err(ApiError::bad_params("status must be Pending or Submitted"));
    }
    ensure_homework(ctx.conn, homework_id)?;
    ctx.conn.execute(
        "INSERT INTO homework_submissions(homework_id, student_id, status)
         VALUES(?, ?, ?)
         ON CONFLICT(homework_id, student_id)
         DO UPDATE SET status = excluded.status",
        (homework_id, student_id, &status),
    )?;
    Ok(json!({ "homeworkId": homework_id, "status": status }))
}

fn homework_my_grade(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_role(ctx, Role::Student)?;
    let student_id = current_student_id(ctx)?;
    let homework_id = required_id(params, "homeworkId")?;
    let grade: Option<i64> = ctx
        .conn
        .query_row(
            "SELECT grade FROM homework_submissions WHERE homework_id = ? AND student_id = ?",
            (homework_id, student_id),
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    Ok(json!({ "homeworkId": homework_id, "grade": grade }))
}

/// Calendar feed: one event per homework on its due date (ISO).
fn homework_events(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    let mut stmt = ctx
        .conn
        .prepare("SELECT id, title, due_date FROM homework ORDER BY due_date, id")?;
    let events = stmt
        .query_map([], |r| {
            let due: NaiveDate = r.get(2)?;
            Ok(json!({
                "homeworkId": r.get::<_, i64>(0)?,
                "title": r.get::<_, String>(1)?,
                "start": dates::iso_day(due),
                "color": CALENDAR_COLOR,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "events": events }))
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "homework.list" => homework_list,
        "homework.manage" => homework_manage,
        "homework.create" => homework_create,
        "homework.update" => homework_update,
        "homework.delete" => homework_delete,
        "homework.grade" => homework_grade,
        "homework.status" => homework_status,
        "homework.submit" => homework_submit,
        "homework.myGrade" => homework_my_grade,
        "homework.events" => homework_events,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
