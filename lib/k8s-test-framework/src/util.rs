use std::process::Stdio;

use snafu::ResultExt;
use tokio::io::AsyncWriteExt;

use crate::{CommandSnafu, IoSnafu, Result};

/// Run a local command to completion, failing on a non-zero exit status.
pub async fn run_command(mut command: tokio::process::Command) -> Result<()> {
    let exit_status = command
        .spawn()
        .context(IoSnafu {
            path: format!("{command:?}"),
        })?
        .wait()
        .await
        .context(IoSnafu {
            path: format!("{command:?}"),
        })?;
    if !exit_status.success() {
        return CommandSnafu {
            command: format!("{command:?}"),
            code: exit_status.code(),
        }
        .fail();
    }
    Ok(())
}

/// Run a local command feeding `input` to its stdin, and collect stdout.
pub async fn run_command_output(
    mut command: tokio::process::Command,
    input: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let description = format!("{command:?}");
    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = command.spawn().context(IoSnafu {
        path: description.clone(),
    })?;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(input).await.context(IoSnafu {
            path: description.clone(),
        })?;
        // Dropping stdin closes the pipe so the child sees EOF.
        drop(stdin);
    }

    let output = child.wait_with_output().await.context(IoSnafu {
        path: description.clone(),
    })?;
    if !output.status.success() {
        return CommandSnafu {
            command: description,
            code: output.status.code(),
        }
        .fail();
    }

    Ok(output.stdout)
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn output_with_stdin() {
        let mut command = tokio::process::Command::new("cat");
        command.kill_on_drop(true);
        let out = run_command_output(command, Some(b"hello")).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn failing_command() {
        let command = tokio::process::Command::new("false");
        let err = run_command(command).await.unwrap_err();
        assert!(err.to_string().contains("exit code"));
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
