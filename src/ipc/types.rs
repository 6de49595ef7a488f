use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::config::Config;
use crate::db;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Session token from `auth.login`; public methods ignore it.
    #[serde(default)]
    pub token: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            workspace: None,
            db: None,
            config,
        }
    }

    /// Opens (creating and seeding if needed) the database under `path`.
    pub fn open_workspace(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let conn = db::open_db(&path, &self.config)?;
        tracing::info!(workspace = %path.display(), "workspace opened");
        self.workspace = Some(path);
        self.db = Some(conn);
        Ok(())
    }
}

/// Everything an authenticated handler may touch for one request.
pub struct HandlerCtx<'a> {
    pub conn: &'a Connection,
    pub auth: &'a AuthContext,
    pub config: &'a Config,
    pub token: &'a str,
}
