//! Run commands inside pod containers.

use std::time::Duration;

use k8s_openapi::{api::core::v1::Pod, apimachinery::pkg::apis::meta::v1::Status};
use kube::{Api, api::AttachParams};
use snafu::{ResultExt, ensure};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, warn};

use crate::{
    ApiSnafu, ExitCodeSnafu, FailureReasonMismatchSnafu, Framework, MissingFailureReasonSnafu,
    Result,
};

/// Timeout applied when a step does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// What a command run in a pod produced.
#[derive(Clone, Debug, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// Final status reported by the API server, absent if the command did not
    /// finish in time.
    pub status: Option<Status>,
    pub timed_out: bool,
}

impl ExecOutput {
    /// Exit code of the command. A missing status counts as success.
    pub fn code(&self) -> i32 {
        let Some(status) = &self.status else {
            return 0;
        };
        if status.status.as_deref() == Some("Success") {
            return 0;
        }
        status
            .details
            .as_ref()
            .and_then(|details| details.causes.as_ref())
            .and_then(|causes| {
                causes
                    .iter()
                    .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
            })
            .and_then(|cause| cause.message.as_deref())
            .and_then(|message| message.trim().parse().ok())
            .unwrap_or(1)
    }

    fn reported_status(&self) -> Option<&Status> {
        self.status.as_ref().filter(|status| status.status.is_some())
    }

    /// Validate the outcome. With `failure_reason` the command must have
    /// failed with that reason; without it the command must have exited with
    /// code zero.
    pub fn check(&self, failure_reason: Option<&str>) -> Result<()> {
        match failure_reason {
            Some(expected) => {
                let Some(status) = self.reported_status() else {
                    self.log_output();
                    return MissingFailureReasonSnafu {
                        expected,
                        code: self.code(),
                    }
                    .fail();
                };
                let actual = status.reason.clone().unwrap_or_default();
                ensure!(
                    actual == expected,
                    FailureReasonMismatchSnafu { expected, actual }
                );
                Ok(())
            }
            None => {
                let code = self.code();
                if code == 0 {
                    return Ok(());
                }
                self.log_output();
                let message = match self.reported_status() {
                    Some(status) => format!(
                        "Command exit code is other than zero: {} - {} - {}",
                        code,
                        status.reason.as_deref().unwrap_or("null"),
                        status.message.as_deref().unwrap_or("null"),
                    ),
                    None => format!("Command exit code is other than zero: {code}"),
                };
                ExitCodeSnafu { message }.fail()
            }
        }
    }

    fn log_output(&self) {
        error!(message = "Exec output.", stdout = %self.stdout);
        error!(message = "Exec error output.", stderr = %self.stderr);
    }
}

/// Split an inline command the way scenario text writes it: on spaces and
/// newlines, dropping empty pieces.
pub fn split_command(command: &str) -> Vec<String> {
    command
        .split([' ', '\n'])
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

impl Framework {
    /// Run `command` in a pod and wait for it up to `timeout`. Output collected
    /// before the timeout is kept.
    pub async fn exec(
        &self,
        pod: &str,
        namespace: &str,
        container: Option<&str>,
        command: Vec<String>,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        let api: Api<Pod> = Api::namespaced(self.client(), namespace);
        let mut params = AttachParams::default().stdout(true).stderr(true);
        if let Some(container) = container {
            params = params.container(container);
        }

        debug!(message = "Executing command in pod.", %pod, %namespace, ?command);
        let mut process = api.exec(pod, command, &params).await.context(ApiSnafu {
            action: format!("exec in pod {pod}"),
        })?;

        let mut stdout_reader = process.stdout();
        let mut stderr_reader = process.stderr();
        let status = process.take_status();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let collect = async {
            let read_stdout = async {
                if let Some(reader) = stdout_reader.as_mut() {
                    if let Err(error) = reader.read_to_end(&mut stdout).await {
                        warn!(message = "Failed reading exec stdout.", %error);
                    }
                }
            };
            let read_stderr = async {
                if let Some(reader) = stderr_reader.as_mut() {
                    if let Err(error) = reader.read_to_end(&mut stderr).await {
                        warn!(message = "Failed reading exec stderr.", %error);
                    }
                }
            };
            let wait_status = async {
                match status {
                    Some(status) => status.await,
                    None => None,
                }
            };
            let ((), (), status) = tokio::join!(read_stdout, read_stderr, wait_status);
            status
        };

        let (status, timed_out) = match tokio::time::timeout(timeout, collect).await {
            Ok(status) => (status, false),
            Err(_) => {
                warn!(message = "Command did not finish within the specified time.", %pod, ?timeout);
                (None, true)
            }
        };
        process.abort();

        let output = ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            status,
            timed_out,
        };
        debug!(message = "Exec output.", stdout = %output.stdout);
        Ok(output)
    }

    /// Run a command through `sh -c` and return it after validating that it
    /// succeeded.
    pub async fn exec_shell(
        &self,
        pod: &str,
        namespace: &str,
        container: Option<&str>,
        script: &str,
    ) -> Result<ExecOutput> {
        let output = self
            .exec(
                pod,
                namespace,
                container,
                vec!["sh".into(), "-c".into(), script.into()],
                DEFAULT_TIMEOUT,
            )
            .await?;
        output.check(None)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};

    use super::*;

    fn failure(code: &str) -> Status {
        Status {
            status: Some("Failure".into()),
            reason: Some("NonZeroExitCode".into()),
            message: Some(format!("command terminated with non-zero exit code: {code}")),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some("ExitCode".into()),
                    message: Some(code.into()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn output(status: Option<Status>) -> ExecOutput {
        ExecOutput {
            status,
            ..Default::default()
        }
    }

    #[test]
    fn success_passes() {
        let success = Status {
            status: Some("Success".into()),
            ..Default::default()
        };
        let out = output(Some(success));
        assert_eq!(out.code(), 0);
        out.check(None).unwrap();
    }

    #[test]
    fn non_zero_exit_reports_reason_and_message() {
        let out = output(Some(failure("2")));
        assert_eq!(out.code(), 2);
        assert_eq!(
            out.check(None).unwrap_err().to_string(),
            "Command exit code is other than zero: 2 - NonZeroExitCode - \
             command terminated with non-zero exit code: 2"
        );
    }

    #[test]
    fn expected_failure_reason() {
        let out = output(Some(failure("1")));
        out.check(Some("NonZeroExitCode")).unwrap();
        assert!(out.check(Some("Forbidden")).is_err());
    }

    #[test]
    fn expected_failure_without_status() {
        let out = output(None);
        assert_eq!(
            out.check(Some("NonZeroExitCode")).unwrap_err().to_string(),
            "Expected failureReason is NonZeroExitCode but status returned is null with code 0"
        );
    }

    #[test]
    fn timed_out_without_status_is_not_a_failure() {
        let out = ExecOutput {
            timed_out: true,
            ..Default::default()
        };
        out.check(None).unwrap();
    }

    #[test]
    fn inline_commands_split_on_whitespace() {
        assert_eq!(
            split_command("ls -la\n/tmp"),
            vec!["ls".to_owned(), "-la".to_owned(), "/tmp".to_owned()]
        );
    }
}
