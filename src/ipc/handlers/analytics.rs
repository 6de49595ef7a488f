use crate::ipc::error::ApiError;
use crate::ipc::handlers::{run, Handler};
use crate::ipc::helpers::{optional_str, require_staff};
use crate::ipc::types::{HandlerCtx, Request};
use crate::stats::{self, LeaderboardMetric};
use serde_json::{json, Value};

fn analytics_overview(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let overview = stats::system_overview(ctx.conn, &ctx.config.thresholds)?;
    Ok(json!({
        "overview": overview,
        "thresholds": {
            "lowAttendancePercent": ctx.config.thresholds.low_attendance_percent,
            "lowGrade": ctx.config.thresholds.low_grade,
        },
    }))
}

fn analytics_leaderboard(ctx: &HandlerCtx, params: &Value) -> Result<Value, ApiError> {
    require_staff(ctx)?;
    let raw = optional_str(params, "metric").unwrap_or_else(|| "attendance".to_string());
    let metric = LeaderboardMetric::parse(&raw).ok_or_else(|| {
        ApiError::bad_params(format!(
            "metric must be one of: attendance, homework, doubts (got {})",
            raw
        ))
    })?;
    let entries = stats::leaderboard(ctx.conn, metric)?;
    Ok(json!({
        "metric": metric.as_str(),
        "students": entries,
    }))
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "analytics.overview" => analytics_overview,
        "analytics.leaderboard" => analytics_leaderboard,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
