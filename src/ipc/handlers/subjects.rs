use crate::ipc::error::ApiError;
use crate::ipc::handlers::{run, Handler};
use crate::ipc::types::{HandlerCtx, Request};
use serde_json::{json, Value};

fn subjects_list(ctx: &HandlerCtx, _params: &Value) -> Result<Value, ApiError> {
    let mut stmt = ctx.conn.prepare("SELECT id, name FROM subjects ORDER BY name")?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "subjects": subjects }))
}

pub fn try_handle(ctx: &HandlerCtx, req: &Request) -> Option<Value> {
    let handler: Handler = match req.method.as_str() {
        "subjects.list" => subjects_list,
        _ => return None,
    };
    Some(run(ctx, req, handler))
}
