use crate::auth::Role;
use crate::ipc::error::ApiError;
use crate::ipc::handlers::{run, Handler};
use crate::ipc::helpers::{current_student_id, require_role, require_staff};
use crate::ipc::types::{HandlerCtx, Request};
use crate::stats;
use chrono::Local;
use serde_json::{json, Value};

fn dashboard_teacher(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let today = Local::now().date_naive();
    let dash = stats::teacher_dashboard(ctx.conn, today)?;
    Ok(json!({ "dashboard": dash }))
}

fn dashboard_student(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    require_role(ctx, Role::Student)?;
    let student_id = current_student_id(ctx)?;
    let dash = stats::student_dashboard(ctx.conn, student_id)?;
    Ok(json!({ "studentId": student_id, "dashboard": dash }))
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "dashboard.teacher" => dashboard_teacher,
        "dashboard.student" => dashboard_student,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
