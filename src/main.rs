//! Python Debug Attach MCP Server — Main Entry Point

use clap::Parser;
use tracing::{info, error, debug, warn};
use tracing_subscriber::{EnvFilter, fmt};
use rmcp::{ServiceExt, transport::stdio};

use python_debug_attach::{Args, Config, PythonDebugToolHandler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Starting Python Debug Attach MCP Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(&args);
    match config.find_python() {
        Ok(path) => debug!("Using python interpreter {}", path.display()),
        Err(e) => warn!("{}; launch sessions will still pass '{}' to the adapter", e, config.python_path),
    }

    let handler = PythonDebugToolHandler::new(config);
    let service = handler.clone()
        .serve(stdio()).await.inspect_err(|e| {
            error!("Serving error: {:?}", e);
        })?;

    service.waiting().await?;
    handler.shutdown().await;
    Ok(())
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false);

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.with_writer(std::io::stderr).init();
    }

    debug!("Logging initialized with level: {}", args.log_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use clap::Parser;
    use python_debug_attach::config::{Args, Config};

    #[test]
    fn test_args_parsing_defaults() {
        let args = Args::parse_from(["python-debug-attach"]);
        assert_eq!(args.python_path, "python3");
        assert_eq!(args.debounce_ms, 500);
        assert_eq!(args.log_level, "info");
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_args_parsing_with_options() {
        let args = Args::parse_from([
            "python-debug-attach",
            "--python-path", "/usr/bin/python3.12",
            "--debounce-ms", "250",
            "--log-level", "debug",
        ]);
        assert_eq!(args.python_path, "/usr/bin/python3.12");
        assert_eq!(args.debounce_ms, 250);
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.python_path, "python3");
        assert_eq!(config.debounce, Duration::from_millis(500));
    }

    #[test]
    fn test_config_from_args() {
        let args = Args::parse_from([
            "python-debug-attach",
            "--python-path", "/opt/python/bin/python",
            "--debounce-ms", "0",
        ]);
        let config = Config::from_args(&args);
        assert_eq!(config.python_path, "/opt/python/bin/python");
        assert_eq!(config.debounce, Duration::ZERO);
    }
}
