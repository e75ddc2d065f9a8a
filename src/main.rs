mod config;
mod db;
mod ipc;
mod timetable;

use env_logger::{Env, Target};
use std::io::{self, BufRead, Write};

fn main() {
    // stdout carries the protocol; logs go to stderr only.
    env_logger::Builder::from_env(Env::new().filter_or(config::LOG_ENV, "info"))
        .target(Target::Stderr)
        .init();
    let cfg = config::Config::from_env();

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    if let Some(path) = cfg.workspace.as_ref() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            log::error!("failed to open workspace {}: {:#}", path.display(), e);
        }
    }

    log::info!("schoold {} ready", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                log::warn!("dropping malformed request: {}", e);
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

    log::info!("stdin closed, shutting down");
}
