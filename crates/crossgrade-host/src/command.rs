use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use crossgrade_core::Interrupt;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} was interrupted")]
    Interrupted { program: String },
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// stdout and stderr joined, trimmed for log and report text.
    pub fn combined(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        match (out.is_empty(), err.is_empty()) {
            (_, true) => out.to_string(),
            (true, false) => err.to_string(),
            (false, false) => format!("{out}\n{err}"),
        }
    }
}

/// Run a command to completion, killing it if `interrupt` is raised.
///
/// A non-zero exit status is not an error; callers inspect
/// [`CommandOutput::status`].
pub fn run_command(
    program: &str,
    args: &[String],
    interrupt: &Interrupt,
) -> Result<CommandOutput, CommandError> {
    tracing::debug!(program, args = ?args, "Running command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if interrupt.is_raised() {
            kill(&mut child, program);
            return Err(CommandError::Interrupted {
                program: program.to_string(),
            });
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                kill(&mut child, program);
                return Err(CommandError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        }
    };

    let output = CommandOutput {
        // Killed by a signal has no code.
        status: status.code().unwrap_or(-1),
        stdout: collect(stdout),
        stderr: collect(stderr),
    };
    tracing::debug!(program, status = output.status, "Command finished");
    Ok(output)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        tracing::warn!(program, error = %e, "Failed to kill child process");
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn captures_output_and_status() {
        let out = run_command(
            "sh",
            &args(&["-c", "echo installed; echo warning >&2; exit 3"]),
            &Interrupt::new(),
        )
        .unwrap();
        assert_eq!(out.status, 3);
        assert!(!out.success());
        assert_eq!(out.stdout.trim(), "installed");
        assert_eq!(out.combined(), "installed\nwarning");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_command("/nonexistent/crossgrade-tool", &[], &Interrupt::new()).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn interrupt_kills_the_child() {
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.raise();
        });

        let started = Instant::now();
        let err = run_command("sleep", &args(&["30"]), &interrupt).unwrap_err();
        raiser.join().unwrap();

        assert!(matches!(err, CommandError::Interrupted { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
