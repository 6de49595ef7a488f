mod auth;
mod config;
mod dates;
mod db;
mod ipc;
mod stats;

use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cfg = config::Config::discover(std::env::args().skip(1))?;

    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    tracing::info!("classtrackd v{} starting", env!("CARGO_PKG_VERSION"));

    let startup_workspace = cfg.workspace.path.clone();
    let mut state = ipc::AppState::new(cfg);
    if let Some(path) = startup_workspace {
        state.open_workspace(path)?;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("classtrackd stopped");
    Ok(())
}
