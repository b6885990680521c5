//! External converter processes (PDF export) with timeouts and bounded output.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::config::ExportConfig;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Short stderr excerpt for error messages.
    pub fn stderr_excerpt(&self) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let text = text.trim();
        if self.stderr_truncated > 0 {
            format!("{text} [stderr truncated {} bytes]", self.stderr_truncated)
        } else {
            text.to_string()
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stderr_truncated,
        timed_out,
    })
}

/// Convert `input` to PDF with the configured converter and place the result at `target`.
///
/// The converter writes `<outdir>/<input stem>.pdf`; `outdir` is a scratch directory
/// that is removed afterwards. A zero exit status without that file is an error.
#[instrument(skip_all, fields(input = %input.display(), target = %target.display()))]
pub fn convert_to_pdf(export: &ExportConfig, input: &Path, target: &Path) -> Result<()> {
    let outdir = tempfile::tempdir().context("create converter output directory")?;
    let outdir_str = outdir.path().to_string_lossy();
    let input_str = input.to_string_lossy();

    let mut args = export
        .pdf_command
        .iter()
        .map(|arg| arg.replace("{outdir}", &outdir_str).replace("{input}", &input_str));
    let program = args
        .next()
        .ok_or_else(|| anyhow!("export.pdf_command is empty"))?;
    let mut cmd = Command::new(&program);
    cmd.args(args);

    let output = run_command_with_timeout(
        cmd,
        Duration::from_secs(export.timeout_secs),
        export.output_limit_bytes,
    )
    .with_context(|| format!("run pdf converter '{program}'"))?;

    if output.timed_out {
        bail!("pdf converter timed out after {}s", export.timeout_secs);
    }
    if !output.status.success() {
        bail!(
            "pdf converter exited with {}: {}",
            output.status,
            output.stderr_excerpt()
        );
    }

    let stem = input
        .file_stem()
        .ok_or_else(|| anyhow!("converter input has no file name: {}", input.display()))?;
    let produced = outdir.path().join(format!("{}.pdf", stem.to_string_lossy()));
    if !produced.exists() {
        bail!("pdf converter did not produce {}", produced.display());
    }
    fs::copy(&produced, target)
        .with_context(|| format!("copy {} to {}", produced.display(), target.display()))?;
    Ok(())
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn export(pdf_command: Vec<String>) -> ExportConfig {
        ExportConfig {
            pdf_command,
            timeout_secs: 10,
            output_limit_bytes: 1024,
        }
    }

    #[test]
    fn output_is_truncated_at_the_limit() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'abcdefgh' >&2"]);
        let output = run_command_with_timeout(cmd, Duration::from_secs(5), 4).expect("run");
        assert_eq!(output.stderr, b"abcd");
        assert_eq!(output.stderr_truncated, 4);
        assert!(output.stderr_excerpt().contains("truncated 4 bytes"));
    }

    #[test]
    fn converter_output_is_copied_to_the_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let input = temp.path().join("report.csv");
        fs::write(&input, "a,b\n").expect("write input");
        let target = temp.path().join("out.pdf");

        // Stand-in converter: copy the input to <outdir>/<stem>.pdf.
        let cfg = export(shell("cp \"$1\" \"$0/report.pdf\"")
            .into_iter()
            .chain(["{outdir}".to_string(), "{input}".to_string()])
            .collect());
        convert_to_pdf(&cfg, &input, &target).expect("convert");

        assert_eq!(fs::read_to_string(&target).expect("read"), "a,b\n");
    }

    #[test]
    fn failing_converter_reports_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let input = temp.path().join("report.csv");
        fs::write(&input, "a\n").expect("write input");

        let cfg = export(shell("echo 'no office suite' >&2; exit 3"));
        let err = convert_to_pdf(&cfg, &input, &temp.path().join("out.pdf")).expect_err("fails");
        assert!(format!("{err:#}").contains("no office suite"));
    }

    #[test]
    fn silent_converter_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let input = temp.path().join("report.csv");
        fs::write(&input, "a\n").expect("write input");

        let cfg = export(shell("true"));
        let err = convert_to_pdf(&cfg, &input, &temp.path().join("out.pdf")).expect_err("fails");
        assert!(format!("{err:#}").contains("did not produce"));
    }
}
