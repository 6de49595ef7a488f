use serde_json::json;
use thiserror::Error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_params(msg: impl Into<String>) -> Self {
        Self::BadParams(msg.into())
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("you do not have permission for this action".to_string())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Maps a UNIQUE violation to `conflict`; anything else stays a db error.
    pub fn from_unique(e: rusqlite::Error, msg: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(f, _) = &e {
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return Self::conflict(msg);
            }
        }
        Self::Db(e)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadParams(_) => "bad_params",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::NoWorkspace => "no_workspace",
            Self::Db(_) => "db_query_failed",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP-equivalent status for a UI that fronts the daemon over HTTP.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadParams(_) => 400,
            Self::Unauthenticated(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::NoWorkspace => 409,
            Self::Db(_) | Self::Internal(_) => 500,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        if let Self::Db(e) = &self {
            tracing::error!(error = %e, "database error");
        }
        let status = self.status();
        let mut resp = err(id, self.code(), self.to_string(), None);
        resp["error"]["status"] = json!(status);
        resp
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, ApiError>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}
