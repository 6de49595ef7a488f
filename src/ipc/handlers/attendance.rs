use crate::auth::Role;
use crate::dates::{self, Period};
use crate::ipc::error::ApiError;
use crate::ipc::handlers::{run, Handler};
use crate::ipc::helpers::{
    current_student_id, ensure_student, ensure_subject, optional_id, optional_str,
    optional_text_or_number, require_role, require_staff, required_day, required_id,
};
use crate::ipc::types::{HandlerCtx, Request};
use crate::stats::{self, ABSENT_INFORMED, ABSENT_UNINFORMED, PRESENT};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value as SqlValue};
use serde_json::{json, Value};

fn parse_status(raw: &str) -> Option<&'static str> {
    match raw {
        PRESENT => Some(PRESENT),
        ABSENT_INFORMED => Some(ABSENT_INFORMED),
        ABSENT_UNINFORMED => Some(ABSENT_UNINFORMED),
        _ => None,
    }
}

struct Mark {
    student_id: i64,
    status: &'static str,
}

fn parse_marks(ctx: &HandlerCtx, params: &Value) -> Result<Vec<Mark>, ApiError> {
    let Some(raw) = params.get("marks").and_then(|v| v.as_array()) else {
        return Err(ApiError::bad_params("missing marks"));
    };
    if raw.is_empty() {
        return Err(ApiError::bad_params("marks must not be empty"));
    }
    let mut out = Vec::with_capacity(raw.len());
    for m in raw {
        let student_id = required_id(m, "studentId")?;
        let status_raw = m.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let Some(status) = parse_status(status_raw) else {
            return Err(ApiError::bad_params(format!(
                "invalid status {:?}; use Present, Absent Informed or Absent Uninformed",
                status_raw
            )));
        };
        ensure_student(ctx.conn, student_id)?;
        out.push(Mark { student_id, status });
    }
    Ok(out)
}

/// Marks a whole class for one (date, subject). Re-marking a student
/// overwrites the stored status.
fn attendance_save(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let date = required_day(params, "date")?;
    let subject_id = required_id(params, "subjectId")?;
    ensure_subject(ctx.conn, subject_id)?;
    let marks = parse_marks(ctx, params)?;

    let tx = ctx.conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO attendance(date, subject_id, student_id, status) VALUES(?, ?, ?, ?)
             ON CONFLICT(date, subject_id, student_id) DO UPDATE SET status = excluded.status",
        )?;
        for m in &marks {
            stmt.execute((date, subject_id, m.student_id, m.status))?;
        }
    }
    tx.commit()?;

    tracing::info!(date = %date, subject_id, count = marks.len(), "attendance saved");
    Ok(json!({ "saved": marks.len(), "date": dates::display_day(date) }))
}

/// Current marks for every student, `none` where nothing is stored yet.
fn attendance_sheet(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    let subject_id = required_id(params, "subjectId")?;
    let date = required_day(params, "date")?;
    ensure_subject(ctx.conn, subject_id)?;
    let mut stmt = ctx.conn.prepare(
        "SELECT st.id, COALESCE(a.status, 'none')
         FROM students st
         LEFT JOIN attendance a
           ON a.student_id = st.id AND a.subject_id = ? AND a.date = ?
         ORDER BY st.name, st.roll_no",
    )?;
    let records = stmt
        .query_map((subject_id, date), |r| {
            Ok(json!({
                "studentId": r.get::<_, i64>(0)?,
                "status": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "date": dates::display_day(date), "records": records }))
}

fn attendance_day(ctx: &HandlerCtx, subject_id: i64, date: NaiveDate) -> Result<Value, ApiError> {
    // Unmarked students read as Absent Uninformed in the day view.
    let mut stmt = ctx.conn.prepare(
        "SELECT st.roll_no, st.name, COALESCE(a.status, 'Absent Uninformed')
         FROM students st
         LEFT JOIN attendance a
           ON a.student_id = st.id AND a.subject_id = ? AND a.date = ?
         ORDER BY st.name, st.roll_no",
    )?;
    let records = stmt
        .query_map((subject_id, date), |r| {
            Ok(json!({
                "date": dates::display_day(date),
                "rollNo": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "filterType": "day", "records": records }))
}

fn attendance_range(
    ctx: &HandlerCtx,
    subject_id: i64,
    filter_type: &str,
    period: Period,
) -> Result<Value, ApiError> {
    let mut conditions = vec!["a.subject_id = ?".to_string()];
    let mut values = vec![SqlValue::Integer(subject_id)];
    period.push_filter("a.date", &mut conditions, &mut values);
    let sql = format!(
        "SELECT a.date, st.roll_no, st.name, a.status
         FROM attendance a
         JOIN students st ON st.id = a.student_id
         WHERE {}
         ORDER BY a.date, st.name, st.roll_no",
        conditions.join(" AND ")
    );
    let mut stmt = ctx.conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(values), |r| {
            let date: NaiveDate = r.get(0)?;
            Ok(json!({
                "date": dates::display_day(date),
                "rollNo": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
                "status": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "filterType": filter_type, "records": records }))
}

fn attendance_get(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    let subject_id = optional_id(params, "subjectId")?
        .ok_or_else(|| ApiError::bad_params("subjectId is required"))?;
    ensure_subject(ctx.conn, subject_id)?;
    let filter_type = optional_str(params, "filterType").unwrap_or_else(|| "day".to_string());
    let year = optional_text_or_number(params, "year");
    let month = optional_text_or_number(params, "month");

    match filter_type.as_str() {
        "day" => {
            if optional_str(params, "date").is_none() {
                return Err(ApiError::bad_params("date is required for day view"));
            }
            let date = required_day(params, "date")?;
            attendance_day(ctx, subject_id, date)
        }
        "year" => {
            let Some(y) = year else {
                return Err(ApiError::bad_params("year is required"));
            };
            let period = Period::from_year_month(Some(y.as_str()), None).map_err(ApiError::BadParams)?;
            attendance_range(ctx, subject_id, "year", period)
        }
        "month" => {
            let (Some(y), Some(m)) = (year, month) else {
                return Err(ApiError::bad_params("year and month are required"));
            };
            let period =
                Period::from_year_month(Some(y.as_str()), Some(m.as_str())).map_err(ApiError::BadParams)?;
            attendance_range(ctx, subject_id, "month", period)
        }
        other => Err(ApiError::bad_params(format!(
            "filterType must be one of: day, month, year (got {})",
            other
        ))),
    }
}

/// The calling student's own records, newest first, with a summary over the
/// same filter.
fn attendance_mine(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_role(ctx, Role::Student)?;
    let student_id = current_student_id(ctx)?;
    let subject_id = optional_id(params, "subjectId")?;
    let year = optional_text_or_number(params, "year");
    let month = optional_text_or_number(params, "month");
    let period =
        Period::from_year_month(year.as_deref(), month.as_deref()).map_err(ApiError::BadParams)?;

    let mut conditions = vec!["a.student_id = ?".to_string()];
    let mut values = vec![SqlValue::Integer(student_id)];
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
         ORDER BY a.date DESC, s.name",
        conditions.join(" AND ")
    );
    let mut stmt = ctx.conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(values), |r| {
            let date: NaiveDate = r.get(0)?;
            Ok(json!({
                "date": dates::display_day(date),
                "subject": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let summary = stats::attendance_summary(ctx.conn, student_id, subject_id, &period)?;
    Ok(json!({
        "records": records,
        "summary": summary,
        "period": period.label(),
    }))
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "attendance.save" => attendance_save,
        "attendance.sheet" => attendance_sheet,
        "attendance.get" => attendance_get,
        "attendance.mine" => attendance_mine,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
