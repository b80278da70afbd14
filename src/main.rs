mod db;
mod ipc;
mod schedule;
mod session;
mod timetable;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Pre-selects a workspace before the first request.
const WORKSPACE_ENV: &str = "TIMETABLED_WORKSPACE";

fn main() {
    // stdout carries the protocol; env_logger writes to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    log::info!("timetabled {} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState::new();

    if let Some(path) = std::env::var_os(WORKSPACE_ENV).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        if let Err(e) = ipc::select_workspace(&mut state, &path) {
            log::warn!(
                "{}={} could not be opened: {}",
                WORKSPACE_ENV,
                path.display(),
                e.message
            );
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                log::debug!("request {} {}", req.id, req.method);
                ipc::handle_request(&mut state, req)
            }
            // No id to reply to.
            Err(e) => ipc::bad_json(e.to_string()),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    log::info!("stdin closed, exiting");
}
