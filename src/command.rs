//! Local shell commands.

use snafu::{ResultExt, Snafu, ensure};
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Snafu)]
pub enum CommandError {
    #[snafu(display("Unable to run '{}': {}", command, source))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("Command '{}' failed with exit code {}: {}", command, code, stderr))]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ensure_success(self) -> Result<Self, CommandError> {
        ensure!(
            self.exit_code == 0,
            FailedSnafu {
                command: self.command.clone(),
                code: self.exit_code,
                stderr: self.stderr.trim().to_owned(),
            }
        );
        Ok(self)
    }
}

/// Run `command_line` through `sh -c`.
pub async fn run(command_line: &str) -> Result<CommandOutput, CommandError> {
    debug!(message = "Running local command.", command = %command_line);
    let output = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .output()
        .await
        .context(SpawnSnafu {
            command: command_line,
        })?;

    Ok(CommandOutput {
        command: command_line.to_owned(),
        // Killed by a signal.
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_code() {
        let output = run("echo out; echo err >&2; exit 3").await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");

        let error = output.ensure_success().unwrap_err();
        assert_eq!(
            error.to_string(),
            "Command 'echo out; echo err >&2; exit 3' failed with exit code 3: err"
        );
    }

    #[tokio::test]
    async fn success() {
        let output = run("printf '%s' ok").await.unwrap().ensure_success().unwrap();
        assert_eq!(output.stdout, "ok");
    }
}
