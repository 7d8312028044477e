//! Harness mode: supervise an external test-execution process.
//!
//! The caller supplies the command; we capture its combined output, bound
//! its startup and total runtime, and retry supervised failures. A
//! process that dies to a signal (no exit code) is an infrastructure
//! fault and is never retried.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("empty harness command")]
    EmptyCommand,

    #[error("failed to start process: {0}")]
    SpawnFailed(String),

    #[error("process produced no output within start timeout ({0:?})")]
    StartTimeout(Duration),

    #[error("process terminated by signal")]
    Killed,
}

/// One attempt's outcome.
#[derive(Debug)]
pub struct HarnessOutcome {
    pub code: i32,
    pub output: String,
    pub elapsed: Duration,
}

/// Run `cmd` once, capturing combined stdout and stderr.
///
/// `start_timeout` bounds the wait for first output or exit; `duration`
/// bounds the whole run (expiry kills the process and keeps the output
/// gathered so far).
pub fn run_once(
    cmd: &[String],
    start_timeout: Duration,
    duration: Duration,
) -> Result<HarnessOutcome, HarnessError> {
    let (program, args) = cmd.split_first().ok_or(HarnessError::EmptyCommand)?;
    let started = Instant::now();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HarnessError::SpawnFailed(e.to_string()))?;

    // Reader threads forward chunks so output order roughly interleaves
    // and the start timeout can watch for the first byte.
    let (chunk_tx, chunk_rx) = channel::<Vec<u8>>();
    let mut readers = Vec::new();
    for stream in [
        child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
        child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
    ]
    .into_iter()
    .flatten()
    {
        let tx = chunk_tx.clone();
        readers.push(std::thread::spawn(move || {
            let mut stream = stream;
            let mut buf = [0u8; 4096];
            while let Ok(n) = stream.read(&mut buf) {
                if n == 0 {
                    break;
                }
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        }));
    }
    drop(chunk_tx);

    let mut output = Vec::new();
    let mut saw_output = false;
    let mut timed_out = false;
    let deadline = started + duration;

    let status = loop {
        let now = Instant::now();
        if !saw_output && now.duration_since(started) >= start_timeout {
            warn!(timeout = ?start_timeout, "no output before process-start timeout");
            let _ = child.kill();
            let _ = child.wait();
            for reader in readers {
                let _ = reader.join();
            }
            return Err(HarnessError::StartTimeout(start_timeout));
        }
        if now >= deadline {
            warn!(duration = ?duration, "harness duration expired, killing process");
            timed_out = true;
            let _ = child.kill();
            break child.wait().map_err(|e| HarnessError::SpawnFailed(e.to_string()))?;
        }

        match chunk_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(chunk) => {
                saw_output = true;
                output.extend_from_slice(&chunk);
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some(status) =
                    child.try_wait().map_err(|e| HarnessError::SpawnFailed(e.to_string()))?
                {
                    break status;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Both pipes closed; the process is done or moments away.
                break child.wait().map_err(|e| HarnessError::SpawnFailed(e.to_string()))?;
            }
        }
    };

    for reader in readers {
        let _ = reader.join();
    }
    // Drain anything buffered after exit.
    while let Ok(chunk) = chunk_rx.try_recv() {
        output.extend_from_slice(&chunk);
    }

    // A kill of our own (duration expiry) keeps the gathered output; the
    // exit code of a killed process maps to the conventional 124.
    let code = match status.code() {
        Some(code) => code,
        None if timed_out => 124,
        None => return Err(HarnessError::Killed),
    };
    Ok(HarnessOutcome {
        code,
        output: String::from_utf8_lossy(&output).into_owned(),
        elapsed: started.elapsed(),
    })
}

/// Retry loop over [`run_once`].
///
/// Exit 0 ends the loop successfully; a signal-terminated or unstartable
/// process aborts immediately; any other exit code is retried up to
/// `retry_count` attempts, keeping the last observed outcome.
pub fn run_with_retries(
    cmd: &[String],
    start_timeout: Duration,
    duration: Duration,
    retry_count: u32,
) -> Result<HarnessOutcome, HarnessError> {
    let attempts = retry_count.max(1);
    let mut last = None;

    for attempt in 1..=attempts {
        info!(attempt, of = attempts, cmd = %cmd.join(" "), "launching harness");
        let outcome = run_once(cmd, start_timeout, duration)?;
        if outcome.code == 0 {
            return Ok(outcome);
        }
        warn!(attempt, code = outcome.code, "harness attempt failed");
        last = Some(outcome);
    }

    error!(attempts, "harness retries exhausted");
    Ok(last.expect("at least one attempt was made"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[cfg(unix)]
    fn script(dir: &std::path::Path, body: &str) -> Vec<String> {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("harness.sh");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{body}").unwrap();
        f.sync_all().unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        vec![path.to_string_lossy().into_owned()]
    }

    #[test]
    #[cfg(unix)]
    fn captures_combined_output() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "echo out; echo err >&2; exit 0");
        let outcome =
            run_once(&cmd, Duration::from_secs(10), Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.code, 0);
        assert!(outcome.output.contains("out"));
        assert!(outcome.output.contains("err"));
    }

    #[test]
    #[cfg(unix)]
    fn third_attempt_succeeds_with_retry_count_three() {
        let dir = tempfile::tempdir().unwrap();
        // Counts attempts in a side file; exits 1 twice, then 0.
        let marker = dir.path().join("attempts");
        let cmd = script(
            dir.path(),
            &format!(
                "echo attempt >> {m}\n\
                 count=$(wc -l < {m})\n\
                 echo \"run $count\"\n\
                 if [ \"$count\" -lt 3 ]; then exit 1; fi\n\
                 exit 0",
                m = marker.display()
            ),
        );

        let outcome =
            run_with_retries(&cmd, Duration::from_secs(10), Duration::from_secs(10), 3).unwrap();
        assert_eq!(outcome.code, 0);
        assert!(outcome.output.contains("run 3"));
    }

    #[test]
    #[cfg(unix)]
    fn exhausted_retries_keep_last_output() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "echo failing; exit 7");
        let outcome =
            run_with_retries(&cmd, Duration::from_secs(10), Duration::from_secs(10), 2).unwrap();
        assert_eq!(outcome.code, 7);
        assert!(outcome.output.contains("failing"));
    }

    #[test]
    #[cfg(unix)]
    fn signal_termination_is_infrastructure_fault() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "echo started; kill -9 $$");
        let result = run_once(&cmd, Duration::from_secs(10), Duration::from_secs(10));
        assert!(matches!(result, Err(HarnessError::Killed)));
    }

    #[test]
    fn unstartable_command_is_infrastructure_fault() {
        let cmd = vec!["/no/such/binary_dutrun_test".to_string()];
        let result = run_once(&cmd, Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(result, Err(HarnessError::SpawnFailed(_))));
    }

    #[test]
    #[cfg(unix)]
    fn silent_process_hits_start_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "sleep 30");
        let result = run_once(&cmd, Duration::from_millis(300), Duration::from_secs(30));
        assert!(matches!(result, Err(HarnessError::StartTimeout(_))));
    }
}
