mod analysis;
mod auth;
mod db;
mod ipc;
mod logging;

use std::io::{self, BufRead, Write};

fn main() {
    // stdout carries the protocol; diagnostics go through the logger only.
    logging::init();

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back; report the parse failure and move on.
                let envelope = serde_json::json!({
                    "ok": false,
                    "error": {
                        "code": "bad_json",
                        "status": 400,
                        "message": e.to_string(),
                    },
                });
                let _ = writeln!(stdout, "{}", envelope);
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
}
