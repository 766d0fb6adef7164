//! Process-wide settings read from the environment.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::Duration,
};

use snafu::{ResultExt, Snafu};

use crate::aws::AwsAuthentication;

pub const DEFAULT_RESOURCES_DIR: &str = "resources";
pub const DEFAULT_OUTPUT_DIR: &str = "target/test-classes";
pub const DEFAULT_CLUSTER_TYPE: &str = "vmware";
pub const DEFAULT_KEOS_YAML_PATH: &str = "/workspace/keos.yaml";
pub const DEFAULT_KEOS_PASSWORD: &str = "1234";
pub const DEFAULT_WORKSPACE_HOST: &str = "keos-workspaces.int.stratio.com";
pub const DEFAULT_AWS_REGION: &str = "eu-west-1";
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;

static SETTINGS: OnceLock<Arc<Settings>> = OnceLock::new();

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Invalid value for {}: {}", name, source))]
    InvalidNumber {
        name: &'static str,
        source: std::num::ParseIntError,
    },
}

/// Keos cluster description handed to the workspace loader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeosSettings {
    pub cluster_id: Option<String>,
    pub kube_config_path: Option<String>,
    pub cluster_type: String,
    pub keos_yaml_path: String,
    pub ssh_user: Option<String>,
    pub ssh_pem_path: Option<String>,
    pub keos_version: Option<String>,
    pub universe_version: Option<String>,
    pub domain: Option<String>,
    pub external_domain: Option<String>,
    pub external_registry: Option<String>,
    pub password: String,
    pub artifact_repository: Option<String>,
    pub workspace_host: String,
}

impl KeosSettings {
    pub fn is_eks(&self) -> bool {
        self.cluster_type == "eks"
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub resources_dir: PathBuf,
    pub output_dir: PathBuf,
    pub exec_timeout: Duration,
    pub aws_region: String,
    pub aws_endpoint: Option<String>,
    pub aws_auth: AwsAuthentication,
    pub keos: KeosSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self::assemble(&|_| None, DEFAULT_EXEC_TIMEOUT_SECS)
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let exec_timeout = match lookup("BDT_EXEC_TIMEOUT") {
            Some(value) => value.parse().context(InvalidNumberSnafu {
                name: "BDT_EXEC_TIMEOUT",
            })?,
            None => DEFAULT_EXEC_TIMEOUT_SECS,
        };
        Ok(Self::assemble(&lookup, exec_timeout))
    }

    fn assemble(lookup: &dyn Fn(&str) -> Option<String>, exec_timeout: u64) -> Self {
        let or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_owned());

        Self {
            resources_dir: or("BDT_RESOURCES_DIR", DEFAULT_RESOURCES_DIR).into(),
            output_dir: or("BDT_OUTPUT_DIR", DEFAULT_OUTPUT_DIR).into(),
            exec_timeout: Duration::from_secs(exec_timeout),
            aws_region: or("AWS_REGION", DEFAULT_AWS_REGION),
            aws_endpoint: lookup("AWS_ENDPOINT_URL"),
            aws_auth: AwsAuthentication::from_lookup(lookup),
            keos: KeosSettings {
                cluster_id: lookup("KEOS_CLUSTER_ID"),
                kube_config_path: lookup("CLUSTER_KUBE_CONFIG_PATH"),
                cluster_type: or("CLUSTER_TYPE", DEFAULT_CLUSTER_TYPE),
                keos_yaml_path: or("CLUSTER_KEOS_YAML_PATH", DEFAULT_KEOS_YAML_PATH),
                ssh_user: lookup("CLUSTER_SSH_USER"),
                ssh_pem_path: lookup("CLUSTER_SSH_PEM_PATH"),
                keos_version: lookup("KEOS_VERSION"),
                universe_version: lookup("UNIVERSE_VERSION"),
                domain: lookup("KEOS_DOMAIN"),
                external_domain: lookup("KEOS_EXTERNAL_DOMAIN"),
                external_registry: lookup("KEOS_EXTERNAL_REGISTRY"),
                password: or("KEOS_PASSWORD", DEFAULT_KEOS_PASSWORD),
                artifact_repository: lookup("ARTIFACT_REPOSITORY"),
                workspace_host: or("KEOS_WORKSPACE_HOST", DEFAULT_WORKSPACE_HOST),
            },
        }
    }

    /// Install the settings every scenario will see. Only the first call wins.
    pub fn install(self) -> Arc<Self> {
        Arc::clone(SETTINGS.get_or_init(|| Arc::new(self)))
    }

    /// Installed settings, or defaults when nothing was installed.
    pub fn current() -> Arc<Self> {
        Arc::clone(SETTINGS.get_or_init(Default::default))
    }

    /// Where `save it in file` steps write `file`.
    pub fn output_path(&self, file: impl AsRef<Path>) -> PathBuf {
        self.output_dir.join(file)
    }

    /// Where `based on` and `defined in file` steps read `file` from.
    pub fn resource_path(&self, file: impl AsRef<Path>) -> PathBuf {
        let file = file.as_ref();
        if file.is_absolute() {
            file.to_owned()
        } else {
            self.resources_dir.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.resources_dir, PathBuf::from("resources"));
        assert_eq!(settings.output_dir, PathBuf::from("target/test-classes"));
        assert_eq!(settings.exec_timeout, Duration::from_secs(30));
        assert_eq!(settings.aws_region, "eu-west-1");
        assert_eq!(settings.keos.cluster_type, "vmware");
        assert_eq!(settings.keos.password, "1234");
        assert!(settings.keos.cluster_id.is_none());
        assert_eq!(settings.aws_auth, AwsAuthentication::Default);
    }

    #[test]
    fn static_aws_keys() {
        let settings = Settings::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY_ID", "AKIA1"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(
            settings.aws_auth,
            AwsAuthentication::AccessKey {
                access_key_id: "AKIA1".to_owned(),
                secret_access_key: "secret".to_owned(),
                session_token: None,
            }
        );

        let half = Settings::from_lookup(lookup(&[("AWS_ACCESS_KEY_ID", "AKIA1")])).unwrap();
        assert_eq!(half.aws_auth, AwsAuthentication::Default);
    }

    #[test]
    fn overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("BDT_OUTPUT_DIR", "/tmp/out"),
            ("BDT_EXEC_TIMEOUT", "90"),
            ("CLUSTER_TYPE", "eks"),
            ("KEOS_CLUSTER_ID", "c1"),
        ]))
        .unwrap();
        assert_eq!(settings.output_path("a.json"), PathBuf::from("/tmp/out/a.json"));
        assert_eq!(settings.exec_timeout, Duration::from_secs(90));
        assert!(settings.keos.is_eks());
        assert_eq!(settings.keos.cluster_id.as_deref(), Some("c1"));
    }

    #[test]
    fn invalid_timeout() {
        let error = Settings::from_lookup(lookup(&[("BDT_EXEC_TIMEOUT", "soon")])).unwrap_err();
        assert!(error.to_string().starts_with("Invalid value for BDT_EXEC_TIMEOUT"));
    }

    #[test]
    fn absolute_resources_are_kept() {
        let settings = Settings::default();
        assert_eq!(settings.resource_path("/etc/x.json"), PathBuf::from("/etc/x.json"));
        assert_eq!(
            settings.resource_path("schemas/x.json"),
            PathBuf::from("resources/schemas/x.json")
        );
    }
}
