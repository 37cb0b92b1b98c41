use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::CommandFactory;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use irc_redirect::Error;
use irc_redirect::config::{Cli, ServiceConfig};
use irc_redirect::error::ConfigError;
use irc_redirect::supervisor::Supervisor;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_failure_code(&e));
        }
    };

    if cli.version {
        print!("{}", version_text());
        return ExitCode::SUCCESS;
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match ServiceConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => return ExitCode::from(report_config_error(e, &mut io::stderr())),
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(run_failure_code(&e))
        }
    }
}

async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    info!(
        version = VERSION,
        listeners = ?config.listeners,
        server_name = %config.server_name,
        target = ?config.target,
        "irc-redirect starting"
    );

    let supervisor = Supervisor::start(Arc::new(config), CancellationToken::new()).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown signal received, stopping listeners...");

    supervisor.shutdown();
    supervisor.wait().await;

    info!("irc-redirect stopped");
    Ok(())
}

fn version_text() -> String {
    format!(
        "irc-redirect v{}\n\
         Licensed under the Apache License, Version 2.0 <https://www.apache.org/licenses/LICENSE-2.0.txt>\n",
        VERSION
    )
}

/// Exit code for arguments clap refused. `--help` lands here too and is
/// not a failure.
fn parse_failure_code(e: &clap::Error) -> u8 {
    if e.use_stderr() { 1 } else { 0 }
}

/// Print a configuration error, followed by usage when no listener was
/// given, and return the exit code.
fn report_config_error<W: Write>(e: ConfigError, out: &mut W) -> u8 {
    let _ = writeln!(out, "error: {}\n", e);
    if let ConfigError::MissingListener = e {
        let _ = Cli::command().write_help(out);
    }
    Error::from(e).exit_code()
}

fn run_failure_code(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<Error>().map_or(1, Error::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use irc_redirect::irc::listener::ListenerWorker;

    #[test]
    fn test_help_exits_zero() {
        let err = Cli::try_parse_args(["irc-redirect", "--help"]).unwrap_err();
        assert_eq!(parse_failure_code(&err), 0);

        let err = Cli::try_parse_args(["irc-redirect", "-help"]).unwrap_err();
        assert_eq!(parse_failure_code(&err), 0);
    }

    #[test]
    fn test_version_flag() {
        let cli = Cli::try_parse_args(["irc-redirect", "--version"]).unwrap();
        assert!(cli.version);

        let text = version_text();
        assert!(text.starts_with(&format!("irc-redirect v{}\n", VERSION)));
        assert!(text.contains("Apache License, Version 2.0"));
    }

    #[test]
    fn test_usage_errors_exit_one() {
        for args in [
            &["irc-redirect", "--target-port=abc", "127.0.0.1:6667"][..],
            &["irc-redirect", "--no-such-flag", "127.0.0.1:6667"][..],
            &["irc-redirect", "--target=a", "--target-host=b", "127.0.0.1:6667"][..],
        ] {
            let err = Cli::try_parse_args(args.iter().copied()).unwrap_err();
            assert_eq!(parse_failure_code(&err), 1, "{:?}", args);
        }
    }

    #[test]
    fn test_missing_listener_prints_usage() {
        let mut out = Vec::new();
        let code = report_config_error(ConfigError::MissingListener, &mut out);
        let text = String::from_utf8(out).unwrap();

        assert_eq!(code, 1);
        assert!(text.starts_with("error: at least one listener is required\n"));
        assert!(text.contains("Usage:"));
        assert!(text.contains("--introduction-file"));
    }

    #[test]
    fn test_bad_target_exits_one_without_usage() {
        let err = irc_redirect::config::parse_target("irc.example.net:port").unwrap_err();
        let mut out = Vec::new();
        let code = report_config_error(err, &mut out);
        let text = String::from_utf8(out).unwrap();

        assert_eq!(code, 1);
        assert!(text.contains("illegal target server port"));
        assert!(!text.contains("Usage:"));
    }

    #[tokio::test]
    async fn test_bind_failure_exits_two() {
        let occupied = ListenerWorker::bind("127.0.0.1:0").await.unwrap();
        let config = ServiceConfig {
            listeners: vec![occupied.local_addr().to_string()],
            ..ServiceConfig::default()
        };

        let err = run(config).await.unwrap_err();
        assert_eq!(run_failure_code(&err), 2);
    }

    #[test]
    fn test_other_failures_exit_one() {
        let err = anyhow::anyhow!("failed to listen for Ctrl+C");
        assert_eq!(run_failure_code(&err), 1);
    }
}
