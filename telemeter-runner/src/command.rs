//! Child process execution
//!
//! Runs the wrapped command and forwards its output line by line to
//! `tracing`, where the collector layer picks it up.

use anyhow::{Context, Result};
use std::process::Stdio;
use telemeter_core::domain::telemetry::ErrorCategory;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::step::StepFailure;

/// Runs `program` with `args` until it exits
///
/// Standard output is logged at info level and standard error at warning
/// level, each line tagged with its stream.
///
/// # Errors
/// A command that cannot be started is a configuration failure, a
/// non-zero exit status an undefined one.
pub async fn run_command(program: &str, args: &[String]) -> Result<()> {
    debug!("Executing process: {} {:?}", program, args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            StepFailure::new(
                ErrorCategory::Configuration,
                format!("failed to start '{}': {}", program, e),
            )
        })?;

    let stdout = child.stdout.take().map(|out| forward_lines(out, Stream::Stdout));
    let stderr = child.stderr.take().map(|err| forward_lines(err, Stream::Stderr));

    let status = child
        .wait()
        .await
        .with_context(|| format!("Failed to wait for '{}'", program))?;

    // Drain whatever is left in the pipes before reporting
    for reader in [stdout, stderr].into_iter().flatten() {
        if let Err(e) = reader.await {
            warn!("Output reader for '{}' stopped: {}", program, e);
        }
    }

    if status.success() {
        debug!("Process '{}' exited successfully", program);
        return Ok(());
    }

    let message = match status.code() {
        Some(code) => format!("'{}' exited with status {}", program, code),
        None => format!("'{}' was terminated by a signal", program),
    };
    Err(StepFailure::new(ErrorCategory::Undefined, message).into())
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, stream: Stream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match stream {
                    Stream::Stdout => info!(stream = "stdout", "{}", line),
                    Stream::Stderr => warn!(stream = "stderr", "{}", line),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read process output: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::service::{CollectorLayer, InMemoryLogCollector, LogCollector, SecretRegistry};
    use telemeter_core::domain::log::LogLevel;
    use tracing_subscriber::layer::SubscriberExt;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_output_is_collected_by_stream() {
        let collector = InMemoryLogCollector::new();
        let subscriber = tracing_subscriber::registry()
            .with(CollectorLayer::new(collector.clone(), SecretRegistry::new()));
        let _guard = tracing::subscriber::set_default(subscriber);

        run_command("sh", &sh("echo built; echo careful >&2"))
            .await
            .unwrap();

        let messages = collector.messages();
        let stdout = messages.iter().find(|m| m.message == "built").unwrap();
        assert_eq!(stdout.level, LogLevel::Info);
        assert_eq!(stdout.data["stream"], "stdout");

        let stderr = messages.iter().find(|m| m.message == "careful").unwrap();
        assert_eq!(stderr.level, LogLevel::Warning);
        assert_eq!(stderr.data["stream"], "stderr");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_undefined_failure() {
        let err = run_command("sh", &sh("exit 3")).await.unwrap_err();
        let failure = err.downcast_ref::<StepFailure>().unwrap();

        assert_eq!(failure.category, ErrorCategory::Undefined);
        assert!(failure.message.contains("status 3"));
    }

    #[tokio::test]
    async fn test_missing_program_is_configuration_failure() {
        let err = run_command("./definitely-not-a-command", &[])
            .await
            .unwrap_err();
        let failure = err.downcast_ref::<StepFailure>().unwrap();

        assert_eq!(failure.category, ErrorCategory::Configuration);
    }
}
