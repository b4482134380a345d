//! Binary entry point for the converge CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use converge::config::{ConfigError, PollConfig};
use converge::http::{HttpProbe, HttpProbeError};
use converge::poll::{self, Deadline, PollSpec};
use converge::{ConvergeError, ResourceId};

mod cli;

use cli::{Cli, HttpCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("probe error: {0}")]
    Probe(#[from] HttpProbeError),
    #[error("{0}")]
    Wait(#[from] ConvergeError<HttpProbeError>),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(label) => {
            writeln!(io::stdout(), "{label}").ok();
            0
        }
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<String, CliError> {
    match cli {
        Cli::Http(command) => wait_for_http(command).await,
    }
}

async fn wait_for_http(command: HttpCommand) -> Result<String, CliError> {
    let mut config = PollConfig::load_without_cli_args()?;
    apply_overrides(&mut config, &command);
    let timing = config.timing()?;

    let probe = HttpProbe::new(&command.url, command.state_pointer.clone())?;
    let token = CancellationToken::new();
    spawn_interrupt_listener(token.clone());
    let deadline = Deadline::after(config.timeout()).with_cancellation(token);

    let probe_ref = &probe;
    let spec = PollSpec::builder(ResourceId::new(probe.url().as_str()))
        .pending(command.pending)
        .target(command.target)
        .timing(timing)
        .deadline(deadline)
        .build(move || probe_ref.observe());
    let outcome = poll::run(spec).await?;
    debug!(attempts = outcome.attempts, "wait finished");
    Ok(outcome.label)
}

fn apply_overrides(config: &mut PollConfig, command: &HttpCommand) {
    if let Some(timeout) = command.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(interval) = command.min_interval {
        config.min_interval_secs = interval;
    }
    if let Some(occurrences) = command.occurrences {
        config.continuous_target_occurrences = occurrences;
    }
    if let Some(delay) = command.delay {
        config.delay_secs = delay;
    }
    if let Some(checks) = command.not_found_checks {
        config.not_found_checks = Some(checks);
    }
}

fn spawn_interrupt_listener(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("interrupt received; cancelling wait");
                token.cancel();
            }
            Err(err) => warn!(error = %err, "failed to listen for interrupts"),
        }
    });
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> HttpCommand {
        let argv = ["converge", "http"].iter().chain(args).copied();
        match Cli::try_parse_from(argv).expect("arguments should parse") {
            Cli::Http(command) => command,
        }
    }

    fn defaults() -> PollConfig {
        PollConfig {
            min_interval_secs: 10,
            timeout_secs: 1800,
            continuous_target_occurrences: 1,
            delay_secs: 0,
            not_found_checks: None,
        }
    }

    #[test]
    fn flags_override_configuration() {
        let mut config = defaults();
        let command = command(&[
            "http://localhost/x",
            "--target",
            "200",
            "--timeout",
            "20",
            "--min-interval",
            "5",
            "--occurrences",
            "3",
            "--delay",
            "2",
            "--not-found-checks",
            "4",
        ]);

        apply_overrides(&mut config, &command);

        assert_eq!(config.timeout_secs, 20);
        assert_eq!(config.min_interval_secs, 5);
        assert_eq!(config.continuous_target_occurrences, 3);
        assert_eq!(config.delay_secs, 2);
        assert_eq!(config.not_found_checks, Some(4));
    }

    #[test]
    fn absent_flags_keep_configuration() {
        let mut config = defaults();
        let command = command(&["http://localhost/x", "--target", "404"]);

        apply_overrides(&mut config, &command);

        assert_eq!(config, defaults());
    }

    #[test]
    fn repeated_state_flags_are_collected() {
        let command = command(&[
            "http://localhost/x",
            "--pending",
            "Accepted",
            "--pending",
            "Running",
            "--target",
            "Succeeded",
            "--target",
            "Failed",
        ]);

        assert_eq!(command.pending, ["Accepted", "Running"]);
        assert_eq!(command.target, ["Succeeded", "Failed"]);
    }

    #[test]
    fn target_flag_is_required() {
        let result = Cli::try_parse_from(["converge", "http", "http://localhost/x"]);
        assert!(result.is_err());
    }

    #[test]
    fn write_error_renders_wait_failures() {
        let err = CliError::Wait(ConvergeError::NotFound {
            resource: ResourceId::from("http://localhost/x"),
            checks: 3,
        });
        let mut buffer = Vec::new();

        write_error(&mut buffer, &err);

        let rendered = String::from_utf8(buffer).expect("utf8 output");
        assert!(rendered.contains("http://localhost/x"), "unexpected output: {rendered}");
        assert!(rendered.ends_with('\n'));
    }
}
