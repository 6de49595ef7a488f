use crate::dates::{self, Period};
use crate::ipc::error::ApiError;
use crate::ipc::handlers::{run, Handler};
use crate::ipc::helpers::{
    optional_day, optional_id, optional_str, optional_text_or_number, require_staff, required_str,
};
use crate::ipc::types::{HandlerCtx, Request};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value as SqlValue, OptionalExtension};
use serde_json::{json, Value};

fn students_list(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    let mut stmt = ctx
        .conn
        .prepare("SELECT id, roll_no, name FROM students ORDER BY name, roll_no")?;
    let students = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "rollNo": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "students": students }))
}

/// Students with an external coding-profile handle.
fn students_profiles(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    let mut stmt = ctx.conn.prepare(
        "SELECT id, name, profile_handle
         FROM students
         WHERE profile_handle IS NOT NULL AND profile_handle != ''
         ORDER BY name",
    )?;
    let students = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "profileHandle": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "students": students }))
}

fn students_create(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let roll_no = required_str(params, "rollNo")?;
    let name = required_str(params, "name")?;
    let handle = optional_str(params, "profileHandle");
    ctx.conn
        .execute(
            "INSERT INTO students(roll_no, name, profile_handle) VALUES(?, ?, ?)",
            (&roll_no, &name, &handle),
        )
        .map_err(|e| ApiError::from_unique(e, "roll number already exists"))?;
    let id = ctx.conn.last_insert_rowid();
    Ok(json!({ "studentId": id, "rollNo": roll_no, "name": name, "profileHandle": handle }))
}

fn report_period(params: &Value) -> Result<Period, ApiError> {
    let year = optional_text_or_number(params, "year");
    let month = optional_text_or_number(params, "month");
    let period = match optional_str(params, "dateType").as_deref() {
        None | Some("all") => Period::all(),
        Some("year") => match &year {
            Some(y) => Period::from_year_month(Some(y.as_str()), None).map_err(ApiError::BadParams)?,
            None => Period::all(),
        },
        Some("month") => match (&year, &month) {
            (Some(y), Some(m)) => Period::from_year_month(Some(y.as_str()), Some(m.as_str()))
                .map_err(ApiError::BadParams)?,
            _ => Period::all(),
        },
        Some("date") => match optional_day(params, "date")? {
            Some(d) => Period::day(d),
            None => Period::all(),
        },
        Some(other) => {
            return Err(ApiError::bad_params(format!(
                "dateType must be one of: all, year, month, date (got {})",
                other
            )))
        }
    };
    Ok(period)
}

/// Attendance history of the first student whose roll number or name
/// matches `query`.
fn students_report(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    let q = optional_str(params, "query").unwrap_or_default();
    let subject_id = optional_id(params, "subjectId")?;
    let period = report_period(params)?;

    let pattern = format!("%{}%", q);
    let student: Option<(i64, String, String)> = ctx
        .conn
        .query_row(
            "SELECT id, roll_no, name FROM students
             WHERE roll_no LIKE ?1 OR name LIKE ?1
             ORDER BY name, roll_no
             LIMIT 1",
            [&pattern],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((student_id, roll_no, name)) = student else {
        return Ok(json!({ "student": Value::Null, "rows": [] }));
    };

    let mut conditions = vec!["a.student_id = ?".to_string()];
    let mut values: Vec<SqlValue> = vec![SqlValue::Integer(student_id)];
    if let Some(sid) = subject_id {
        conditions.push("a.subject_id = ?".to_string());
        values.push(SqlValue::Integer(sid));
    }
    period.push_filter("a.date", &mut conditions, &mut values);
    let sql = format!(
        "SELECT a.date, s.name, a.status
         FROM attendance a
         JOIN subjects s ON s.id = a.subject_id
         WHERE {}
         ORDER BY a.date ASC, s.name ASC",
        conditions.join(" AND ")
    );
    let mut stmt = ctx.conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            let date: NaiveDate = r.get(0)?;
            Ok(json!({
                "date": dates::display_day(date),
                "subject": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({
        "student": { "id": student_id, "rollNo": roll_no, "name": name },
        "rows": rows,
    }))
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "students.list" => students_list,
        "students.profiles" => students_profiles,
        "students.create" => students_create,
        "students.report" => students_report,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
