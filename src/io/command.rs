use crate::types::{GqaError, GqaResult};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 10;

/// Outcome of a finished external command
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

/// Run `command` in `workdir`, redirecting its output to `<log_stem>.stdout.log`
/// and `<log_stem>.stderr.log`, and kill it if it outlives `timeout`.
///
/// A non-zero exit or a timeout is returned as [`GqaError::ExternalTool`].
pub fn run_command(
    mut command: Command,
    workdir: &Path,
    log_stem: &str,
    timeout: Option<Duration>,
) -> GqaResult<CommandOutput> {
    let program = command.get_program().to_string_lossy().into_owned();
    let stdout_log = workdir.join(format!("{}.stdout.log", log_stem));
    let stderr_log = workdir.join(format!("{}.stderr.log", log_stem));

    command
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(File::create(&stdout_log)?))
        .stderr(Stdio::from(File::create(&stderr_log)?));

    log::debug!("Running {:?}", command);

    let mut child = command.spawn().map_err(|e| {
        GqaError::ExternalTool(format!("failed to launch {}: {}", program, e))
    })?;

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }

        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                log::warn!("{} exceeded {}s timeout, killing", program, limit.as_secs());
                // The child may have exited between try_wait and kill
                let _ = child.kill();
                let _ = child.wait();
                return Err(GqaError::ExternalTool(format!(
                    "{} timed out after {} seconds",
                    program,
                    limit.as_secs()
                )));
            }
        }

        thread::sleep(POLL_INTERVAL);
    };

    log::debug!("{} finished in {:.1}s with {}", program, started.elapsed().as_secs_f64(), status);

    if !status.success() {
        return Err(GqaError::ExternalTool(format!(
            "{} exited with {}{}",
            program,
            status,
            stderr_tail(&stderr_log)
        )));
    }

    Ok(CommandOutput {
        status,
        stdout_log,
        stderr_log,
    })
}

fn stderr_tail(path: &Path) -> String {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return String::new(),
    };
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    format!(": {}", lines[start..].join("\n"))
}
