use crate::ipc::error::{respond, ApiError};
use crate::ipc::types::{HandlerCtx, Request};

pub mod analytics;
pub mod attendance;
pub mod auth;
pub mod core;
pub mod dashboard;
pub mod doubts;
pub mod homework;
pub mod students;
pub mod subjects;
pub mod users;

pub(crate) type Handler = fn(&HandlerCtx, &serde_json::Value) -> Result<serde_json::Value, ApiError>;

pub(crate) fn run(ctx: &HandlerCtx, req: &Request, handler: Handler) -> serde_json::Value {
    respond(&req.id, handler(ctx, &req.params))
}
