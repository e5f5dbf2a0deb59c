use flexi_logger::{FileSpec, Logger};
use log::info;

/// Starts the logger once at process startup. Level comes from the
/// `FEEDBACKD_LOG` environment variable (default `info`). When
/// `FEEDBACKD_LOG_DIR` is set, logs additionally roll to files in that
/// directory; otherwise everything goes to stderr so stdout stays clean for
/// the line protocol.
///
/// Logging must never prevent the daemon from serving requests, so setup
/// failures are swallowed after a best-effort note on stderr.
pub fn init() {
    let spec = std::env::var("FEEDBACKD_LOG").unwrap_or_else(|_| "info".to_string());
    let builder = match Logger::try_with_str(&spec) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("feedbackd: invalid FEEDBACKD_LOG '{}': {}", spec, e);
            return;
        }
    };

    let result = match std::env::var("FEEDBACKD_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => builder
            .log_to_file(
                FileSpec::default()
                    .directory(dir.trim())
                    .basename("feedbackd"),
            )
            .append()
            .start(),
        _ => builder.log_to_stderr().start(),
    };

    match result {
        Ok(handle) => {
            // Keep the handle alive for the life of the process.
            std::mem::forget(handle);
            info!(
                "feedbackd {} started (log level {})",
                env!("CARGO_PKG_VERSION"),
                spec
            );
        }
        Err(e) => eprintln!("feedbackd: logger setup failed: {}", e),
    }
}
