//! Transcoder gateway: spawn and supervise one child process per invocation.
//!
//! Arguments are always passed as a vector - nothing is ever interpreted by
//! a shell. Progress is parsed from the child's stderr (`time=HH:MM:SS.cc`
//! against a known total) and forwarded to an optional sink. On timeout the
//! child gets an interrupt, a short grace window, then a kill.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RenderError;

/// How long an interrupted child may flush before the hard kill.
const KILL_GRACE: Duration = Duration::from_secs(3);

/// Lines of stderr retained for diagnostics.
const STDERR_TAIL_LINES: usize = 40;

/// Result of a completed child run.
#[derive(Debug)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    pub stderr_tail: String,
    pub exit_code: i32,
}

/// Per-run options.
pub struct RunOptions<'a> {
    /// Wall-clock budget for this invocation.
    pub timeout: Duration,
    /// Total output duration in seconds, enabling percent mapping of
    /// `time=` progress lines.
    pub total_duration: Option<f64>,
    /// Called with (percent 0..100, raw line) for each recognized progress line.
    pub progress: Option<&'a (dyn Fn(f32, &str) + Send + Sync)>,
    /// Cooperative cancellation (process shutdown).
    pub cancel: Option<CancellationToken>,
}

impl<'a> RunOptions<'a> {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            total_duration: None,
            progress: None,
            cancel: None,
        }
    }
}

/// Whether the transcoder binaries are reachable.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub transcoder_available: bool,
    pub probe_available: bool,
    pub transcoder_version: Option<String>,
    pub probe_version: Option<String>,
}

impl Capabilities {
    pub fn ready(&self) -> bool {
        self.transcoder_available && self.probe_available
    }
}

/// Handle to the configured transcoder and its metadata tool.
#[derive(Debug, Clone)]
pub struct Transcoder {
    bin: String,
    probe_bin: String,
}

impl Transcoder {
    pub fn new(bin: impl Into<String>, probe_bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            probe_bin: probe_bin.into(),
        }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    pub fn probe_bin(&self) -> &str {
        &self.probe_bin
    }

    /// Run the transcoder with the given argument vector.
    ///
    /// Blocks until exit, timeout, or cancellation. Non-zero exit becomes
    /// [`RenderError::TranscoderFailed`] with the stderr tail attached.
    pub async fn run(
        &self,
        args: &[String],
        opts: RunOptions<'_>,
    ) -> Result<RunOutput, RenderError> {
        self.run_binary(&self.bin, args, opts).await
    }

    /// Run the metadata tool with the given argument vector.
    pub async fn run_probe_tool(
        &self,
        args: &[String],
        opts: RunOptions<'_>,
    ) -> Result<RunOutput, RenderError> {
        self.run_binary(&self.probe_bin, args, opts).await
    }

    async fn run_binary(
        &self,
        bin: &str,
        args: &[String],
        opts: RunOptions<'_>,
    ) -> Result<RunOutput, RenderError> {
        tracing::debug!(transcoder.bin = bin, transcoder.args = ?args, "spawning transcoder");

        let mut child = Command::new(bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::TranscoderUnavailable(format!("{bin}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr not captured"))?;

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut reader = stdout;
            let _ = reader.read_to_end(&mut buf).await;
            buf
        });

        let deadline = Instant::now() + opts.timeout;
        let cancel = opts.cancel.clone().unwrap_or_default();
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line.clone());

                            if let (Some(sink), Some(total)) = (opts.progress, opts.total_duration) {
                                if let Some(position) = parse_time_position(&line) {
                                    if total > 0.0 {
                                        let percent =
                                            ((position / total).clamp(0.0, 1.0) * 100.0) as f32;
                                        sink(percent, &line);
                                    }
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => return Err(RenderError::Io(e)),
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(transcoder.bin = bin, "transcoder timed out, interrupting");
                    interrupt_then_kill(&mut child).await;
                    stdout_task.abort();
                    return Err(RenderError::TimedOut);
                }
                _ = cancel.cancelled() => {
                    tracing::info!(transcoder.bin = bin, "transcoder cancelled");
                    interrupt_then_kill(&mut child).await;
                    stdout_task.abort();
                    return Err(RenderError::Cancelled);
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let status = match tokio::time::timeout(remaining, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                interrupt_then_kill(&mut child).await;
                stdout_task.abort();
                return Err(RenderError::TimedOut);
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr_tail = tail.into_iter().collect::<Vec<_>>().join("\n");
        let exit_code = status.code().unwrap_or(-1);

        if !status.success() {
            return Err(RenderError::TranscoderFailed {
                exit_code,
                stderr_tail,
            });
        }

        Ok(RunOutput {
            stdout,
            stderr_tail,
            exit_code,
        })
    }

    /// Check that the transcoder and its metadata tool are reachable.
    pub async fn probe(&self) -> Capabilities {
        let transcoder_version = version_of(&self.bin).await;
        let probe_version = version_of(&self.probe_bin).await;

        Capabilities {
            transcoder_available: transcoder_version.is_some(),
            probe_available: probe_version.is_some(),
            transcoder_version,
            probe_version,
        }
    }
}

/// First line of `<bin> -version`, or None when the binary is unusable.
async fn version_of(bin: &str) -> Option<String> {
    let output = tokio::time::timeout(
        Duration::from_secs(5),
        Command::new(bin)
            .arg("-version")
            .stdin(Stdio::null())
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Some(text.lines().next().unwrap_or_default().to_string())
}

/// SIGINT, grace window, then SIGKILL.
async fn interrupt_then_kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // Interrupt lets the transcoder finalize container indices.
        unsafe {
            libc::kill(pid as i32, libc::SIGINT);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }

    let _ = child.kill().await;
}

/// Extract the output position from a transcoder progress line.
///
/// Recognizes `time=HH:MM:SS.cc` anywhere in the line; `time=N/A` and
/// negative positions yield None.
pub fn parse_time_position(line: &str) -> Option<f64> {
    let idx = line.find("time=")?;
    let rest = &line[idx + 5..];
    let token: &str = rest.split_whitespace().next()?;

    if token == "N/A" || token.starts_with('-') {
        return None;
    }

    let mut parts = token.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_progress_lines() {
        let line = "frame= 1 fps=0.0 q=-1.0 size= 128kB time=00:01:23.45 bitrate= 12.6kbits/s speed=1x";
        let pos = parse_time_position(line).unwrap();
        assert!((pos - 83.45).abs() < 1e-9);
    }

    #[test]
    fn ignores_unparseable_positions() {
        assert_eq!(parse_time_position("time=N/A bitrate=N/A"), None);
        assert_eq!(parse_time_position("time=-00:00:00.02"), None);
        assert_eq!(parse_time_position("no progress here"), None);
        assert_eq!(parse_time_position("time=garbage"), None);
    }

    #[tokio::test]
    async fn run_reports_missing_binary() {
        let t = Transcoder::new("/nonexistent/transcoder-bin", "/nonexistent/probe-bin");
        let err = t
            .run(&[], RunOptions::with_timeout(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::TranscoderUnavailable(_)));

        let caps = t.probe().await;
        assert!(!caps.ready());
    }

    #[tokio::test]
    async fn run_succeeds_on_clean_exit() {
        let t = Transcoder::new("true", "true");
        let out = t
            .run(&[], RunOptions::with_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn run_surfaces_nonzero_exit() {
        let t = Transcoder::new("false", "true");
        let err = t
            .run(&[], RunOptions::with_timeout(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::TranscoderFailed { exit_code: 1, .. }
        ));
    }

    #[tokio::test]
    async fn run_times_out_and_kills() {
        let t = Transcoder::new("sleep", "true");
        let started = std::time::Instant::now();
        let err = t
            .run(
                &["30".to_string()],
                RunOptions::with_timeout(Duration::from_millis(200)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::TimedOut));
        // interrupt + grace must not wait out the full sleep
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancellation_stops_the_child() {
        let t = Transcoder::new("sleep", "true");
        let cancel = CancellationToken::new();
        let mut opts = RunOptions::with_timeout(Duration::from_secs(30));
        opts.cancel = Some(cancel.clone());

        let args = ["30".to_string()];
        let run = t.run(&args, opts);
        tokio::pin!(run);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(50)) => cancel.cancel(),
            _ = &mut run => panic!("run finished before cancellation"),
        }

        let err = run.await.unwrap_err();
        assert!(matches!(err, RenderError::Cancelled));
    }
}
