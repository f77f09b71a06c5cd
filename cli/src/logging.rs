use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing: env-filtered console output (stdout, or stderr when
/// the stdio transport owns stdout) plus an optional file layer.
pub fn init(debug: bool, to_stderr: bool, log_path: Option<&Path>) {
    let default_filter = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let console = if to_stderr {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let file = log_path.map(|path| {
        let file = std::fs::File::create(path)
            .unwrap_or_else(|err| panic!("failed to create log file {}: {err}", path.display()));
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Arc::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}
