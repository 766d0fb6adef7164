//! Copy files and directories between the local machine and pods.
//!
//! Transfers go through exec, base64 encoded so that binary content survives
//! the text channel. Directories travel as tar archives.

use std::{path::Path, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use snafu::ResultExt;
use tracing::info;

use crate::{
    ExecSnafu, Framework, IoSnafu, Result,
    util::{run_command_output, shell_quote},
};

const COPY_TIMEOUT: Duration = Duration::from_secs(300);

/// Raw bytes sent per exec call. Keeps the encoded argument well under
/// request line limits.
const CHUNK_SIZE: usize = 3 * 1024;

fn parent_dir(remote: &str) -> &str {
    match remote.rfind('/') {
        Some(0) => "/",
        Some(i) => &remote[..i],
        None => ".",
    }
}

/// Decode base64 text that may be wrapped over several lines.
fn decode_wrapped(text: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact)
}

impl Framework {
    async fn run_copy_step(
        &self,
        pod: &str,
        namespace: &str,
        container: Option<&str>,
        script: String,
    ) -> Result<String> {
        let output = self
            .exec(
                pod,
                namespace,
                container,
                vec!["sh".into(), "-c".into(), script],
                COPY_TIMEOUT,
            )
            .await?;
        if output.timed_out {
            return ExecSnafu {
                pod,
                message: "copy did not finish in time",
            }
            .fail();
        }
        output.check(None)?;
        Ok(output.stdout)
    }

    async fn upload_bytes(
        &self,
        pod: &str,
        namespace: &str,
        container: Option<&str>,
        content: &[u8],
        remote: &str,
    ) -> Result<()> {
        let target = shell_quote(remote);
        self.run_copy_step(
            pod,
            namespace,
            container,
            format!(
                "mkdir -p {} && : > {}",
                shell_quote(parent_dir(remote)),
                target
            ),
        )
        .await?;
        for chunk in content.chunks(CHUNK_SIZE) {
            let encoded = STANDARD.encode(chunk);
            self.run_copy_step(
                pod,
                namespace,
                container,
                format!("printf '%s' '{encoded}' | base64 -d >> {target}"),
            )
            .await?;
        }
        Ok(())
    }

    /// Copy a local file or directory into a pod.
    pub async fn copy_to_pod(
        &self,
        pod: &str,
        namespace: &str,
        container: Option<&str>,
        local: impl AsRef<Path>,
        remote: &str,
    ) -> Result<()> {
        let local = local.as_ref();
        let metadata = tokio::fs::metadata(local).await.context(IoSnafu {
            path: local.display().to_string(),
        })?;

        if metadata.is_dir() {
            let mut tar = tokio::process::Command::new("tar");
            tar.arg("cf").arg("-").arg("-C").arg(local).arg(".");
            let archive = run_command_output(tar, None).await?;
            let staging = format!("/tmp/.bdt-upload-{}.tar", std::process::id());
            self.upload_bytes(pod, namespace, container, &archive, &staging)
                .await?;
            self.run_copy_step(
                pod,
                namespace,
                container,
                format!(
                    "mkdir -p {dest} && tar xf {tmp} -C {dest}; status=$?; rm -f {tmp}; exit $status",
                    dest = shell_quote(remote),
                    tmp = shell_quote(&staging),
                ),
            )
            .await?;
        } else {
            let content = tokio::fs::read(local).await.context(IoSnafu {
                path: local.display().to_string(),
            })?;
            self.upload_bytes(pod, namespace, container, &content, remote)
                .await?;
        }

        info!(message = "Copied to pod.", local = %local.display(), %pod, %remote);
        Ok(())
    }

    /// Copy a file or directory out of a pod. When `local` is an existing
    /// directory the remote path is treated as a directory and unpacked into
    /// it.
    pub async fn copy_from_pod(
        &self,
        pod: &str,
        namespace: &str,
        remote: &str,
        local: impl AsRef<Path>,
    ) -> Result<()> {
        let local = local.as_ref();
        let local_path = || local.display().to_string();

        if local.is_dir() {
            let encoded = self
                .run_copy_step(
                    pod,
                    namespace,
                    None,
                    format!("tar cf - -C {} . | base64", shell_quote(remote)),
                )
                .await?;
            let archive = decode_wrapped(&encoded).map_err(|error| {
                ExecSnafu {
                    pod,
                    message: format!("invalid archive from pod: {error}"),
                }
                .build()
            })?;
            let mut tar = tokio::process::Command::new("tar");
            tar.arg("xf").arg("-").arg("-C").arg(local);
            run_command_output(tar, Some(&archive)).await?;
        } else {
            let encoded = self
                .run_copy_step(pod, namespace, None, format!("base64 < {}", shell_quote(remote)))
                .await?;
            let content = decode_wrapped(&encoded).map_err(|error| {
                ExecSnafu {
                    pod,
                    message: format!("invalid file content from pod: {error}"),
                }
                .build()
            })?;
            if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context(IoSnafu { path: local_path() })?;
            }
            tokio::fs::write(local, content)
                .await
                .context(IoSnafu { path: local_path() })?;
        }

        info!(message = "Copied from pod.", %pod, %remote, local = %local.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_remote_paths() {
        assert_eq!(parent_dir("/tmp/file.txt"), "/tmp");
        assert_eq!(parent_dir("/file.txt"), "/");
        assert_eq!(parent_dir("file.txt"), ".");
    }

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = STANDARD.encode(vec![7u8; 100]);
        let (a, b) = encoded.split_at(40);
        let wrapped = format!("{a}\n{b}\n");
        assert_eq!(decode_wrapped(&wrapped).unwrap(), vec![7u8; 100]);
    }
}
