use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use super::{Fetcher, RawContent};
use crate::error::FetchError;

/// Runs a shell pipeline and uses its stdout as the digest.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    shell: String,
    command: String,
    timeout: Duration,
}

impl CommandFetcher {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: "bash".into(),
            command: command.into(),
            timeout,
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl Fetcher for CommandFetcher {
    #[instrument(level = "info", skip_all, fields(shell = %self.shell))]
    async fn fetch(&self) -> Result<RawContent, FetchError> {
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so a timeout can take down every stage of the pipeline.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| FetchError::Spawn {
            command: self.shell.clone(),
            source,
        })?;

        let (status, stdout, stderr) =
            match tokio::time::timeout(self.timeout, collect_output(&mut child)).await {
                Ok(output) => output.map_err(|source| FetchError::Wait { source })?,
                Err(_) => {
                    terminate(&mut child).await;
                    return Err(FetchError::Timeout {
                        name: "command".into(),
                        after: self.timeout,
                    });
                }
            };

        if !status.success() {
            return Err(FetchError::Command {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        debug!(bytes = stdout.len(), "command finished");
        if stdout.trim().is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(stdout)
    }
}

async fn collect_output(child: &mut Child) -> std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout, stderr, status) =
        tokio::try_join!(read_all(stdout), read_all(stderr), child.wait())?;
    Ok((status, stdout, stderr))
}

async fn read_all(pipe: Option<impl AsyncRead + Unpin>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kills the whole process group of `child` and reaps it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => {
                    let _ = child.wait().await;
                    return;
                }
                Err(err) => warn!(pid, error = %err, "failed to kill command process group"),
            }
        }
    }

    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill command");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(command: &str, timeout: Duration) -> CommandFetcher {
        CommandFetcher::new(command, timeout).with_shell("sh")
    }

    #[tokio::test]
    async fn returns_stdout_of_pipeline() {
        let fetcher = sh("printf '# Markets\\nStocks rose' | tr a-z A-Z", Duration::from_secs(5));
        assert_eq!(fetcher.fetch().await.unwrap(), "# MARKETS\nSTOCKS ROSE");
    }

    #[tokio::test]
    async fn failure_reports_status_and_stderr() {
        let fetcher = sh("echo 'upstream unreachable' >&2; exit 3", Duration::from_secs(5));
        match fetcher.fetch().await {
            Err(FetchError::Command { status, stderr }) => {
                assert!(status.contains('3'));
                assert_eq!(stderr, "upstream unreachable");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_output_is_an_error() {
        let fetcher = sh("echo '   '", Duration::from_secs(5));
        assert!(matches!(fetcher.fetch().await, Err(FetchError::Empty)));
    }

    #[tokio::test]
    async fn hung_command_times_out() {
        let fetcher = sh("sleep 5", Duration::from_millis(100));
        let started = std::time::Instant::now();
        assert!(matches!(
            fetcher.fetch().await,
            Err(FetchError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_every_stage_of_the_pipeline() {
        let marker = std::env::temp_dir().join(format!(
            "news-digest-late-stage-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let command = format!("(sleep 1; echo late > '{}') | cat", marker.display());
        let fetcher = sh(&command, Duration::from_millis(200));

        assert!(matches!(
            fetcher.fetch().await,
            Err(FetchError::Timeout { .. })
        ));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let survived = marker.exists();
        let _ = std::fs::remove_file(&marker);
        assert!(!survived, "a pipeline stage outlived the timeout");
    }

    #[tokio::test]
    async fn missing_shell_fails_to_spawn() {
        let fetcher = CommandFetcher::new("true", Duration::from_secs(1))
            .with_shell("/nonexistent/shell");
        assert!(matches!(
            fetcher.fetch().await,
            Err(FetchError::Spawn { .. })
        ));
    }
}
