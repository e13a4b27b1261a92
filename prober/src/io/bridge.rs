//! Transport for external collaborator commands.
//!
//! Collaborators (accessibility bridge, guided decider) are separate programs
//! speaking JSON: one request object on stdin, one response object on stdout.
//! Every exchange is guarded by a timeout and a byte limit on captured
//! output, so an unresponsive collaborator cannot hang the loop or exhaust
//! memory.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::errors::ProbeError;

/// Captured collaborator output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Run a command with a timeout, feeding `stdin` and capturing bounded
/// stdout/stderr without risking pipe deadlocks (output is drained
/// concurrently while the child runs; bytes past the limit are discarded).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning collaborator process");
    let mut child = cmd.spawn().context("spawn command")?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

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
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// One JSON request/response exchange with a collaborator command.
///
/// `argv[0]` is the program, the rest its fixed arguments. Fails with
/// [`ProbeError::Timeout`] when the collaborator does not answer in time.
pub fn call_json(
    argv: &[String],
    payload: &serde_json::Value,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<serde_json::Value> {
    let program = argv
        .first()
        .ok_or_else(|| anyhow!("collaborator command is empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(&argv[1..]);

    let mut request = serde_json::to_vec(payload).context("serialize collaborator request")?;
    request.push(b'\n');

    let output = run_command_with_timeout(cmd, Some(&request), timeout, output_limit_bytes)
        .with_context(|| format!("run collaborator {program}"))?;

    if output.timed_out {
        return Err(ProbeError::Timeout {
            what: format!("collaborator {program}"),
            timeout_ms: timeout.as_millis() as u64,
        }
        .into());
    }
    if !output.status.success() {
        return Err(anyhow!(
            "collaborator {program} failed with status {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim(),
        ));
    }

    serde_json::from_slice(&output.stdout)
        .with_context(|| format!("parse collaborator {program} response"))
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut discarded = 0usize;
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
            discarded += n.saturating_sub(keep);
        } else {
            discarded += n;
        }
    }

    if discarded > 0 {
        warn!(discarded, "collaborator output truncated");
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_round_trips_json() {
        let argv = vec!["cat".to_string()];
        let payload = serde_json::json!({"op": "ping", "value": 7});

        let reply = call_json(&argv, &payload, Duration::from_secs(5), 1_000_000).expect("call");
        assert_eq!(reply["op"], "ping");
        assert_eq!(reply["value"], 7);
    }

    #[test]
    fn nonzero_exit_is_an_error() {
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat > /dev/null; exit 3".to_string(),
        ];
        let payload = serde_json::json!({});
        let err = call_json(&argv, &payload, Duration::from_secs(5), 1_000_000).unwrap_err();
        assert!(err.to_string().contains("failed with status"));
    }

    #[test]
    fn timeout_maps_to_typed_error() {
        let argv = vec!["sleep".to_string(), "5".to_string()];
        let payload = serde_json::json!({});
        let err = call_json(&argv, &payload, Duration::from_millis(100), 1_000).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::Timeout { .. })
        ));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = call_json(&[], &serde_json::json!({}), Duration::from_secs(1), 10).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
