mod backup;
mod calc;
mod config;
mod db;
mod directory;
mod error;
mod ingest;
mod ipc;
mod model;
mod normalize;
mod reports;
mod resolve;

use clap::Parser;
use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

fn main() {
    let args = config::Args::parse();
    if let Err(e) = config::setup_logging(&args.log_level) {
        eprintln!("resultsd: logging disabled: {e}");
    }

    let mut state = ipc::AppState::new(args.engine_config());
    if let Some(path) = args.workspace.as_ref() {
        match db::open_db(path) {
            Ok(conn) => {
                info!(workspace = %path.display(), "workspace opened at startup");
                state.workspace = Some(path.clone());
                state.db = Some(conn);
            }
            Err(e) => warn!(workspace = %path.display(), error = %e, "startup workspace not opened"),
        }
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        write_chunk = state.config.write_chunk,
        "resultsd ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                debug!(id = %req.id, method = %req.method, "request");
                ipc::handle_request(&mut state, req)
            }
            // Can't reply with an id we could not parse.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() }
            }),
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
