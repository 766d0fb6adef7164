//! Gherkin step definitions.
//!
//! Every step receives the scenario's [`BdtWorld`]. Captured parameters are
//! expanded through the run's [`PropertyStore`] before use, and optional
//! groups that did not match arrive as empty strings, which [`opt`] turns into
//! `None`.

use std::{
    fmt, mem,
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use cucumber::{World, gherkin::Step};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::{
    Result,
    config::Settings,
    gosec::{Gosec, Scope},
    k8s::Framework,
    properties::PropertyStore,
    rest::{Login, RestClient},
};

mod common;
mod gosec;
mod kubernetes;
mod ldap;
mod s3;

#[derive(Debug, Snafu)]
pub enum StepError {
    #[snafu(display("{}", message))]
    Assertion { message: String },

    #[snafu(display(
        "No Kubernetes cluster connected; load the workspace or connect with a config file first"
    ))]
    NoCluster,

    #[snafu(display("Step '{}' needs a data table", step))]
    MissingTable { step: String },

    #[snafu(display("Invalid {} '{}'", what, value))]
    InvalidArgument { what: &'static str, value: String },

    #[snafu(display("Unable to write {}: {}", path.display(), source))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to read {}: {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Fail the step with `message` unless `condition` holds.
pub fn check(condition: bool, message: impl fmt::Display) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        AssertionSnafu {
            message: message.to_string(),
        }
        .fail()
    }
}

/// An optional capture: `None` when the group did not participate.
pub fn opt(value: &str) -> Option<&str> {
    Some(value).filter(|value| !value.is_empty())
}

/// Parse a capture with `FromStr`, naming `what` on failure.
pub fn parse<T: std::str::FromStr>(what: &'static str, value: &str) -> Result<T, StepError> {
    value.parse().ok().context(InvalidArgumentSnafu { what, value })
}

/// Rows of the step's data table.
pub fn table(step: &Step) -> Result<&[Vec<String>], StepError> {
    step.table
        .as_ref()
        .map(|table| table.rows.as_slice())
        .context(MissingTableSnafu {
            step: step.value.clone(),
        })
}

fn ensure_rest(slot: &mut Option<RestClient>) -> Result<&mut RestClient> {
    let rest = match slot.take() {
        Some(rest) => rest,
        None => RestClient::new()?,
    };
    Ok(slot.insert(rest))
}

/// State carried from one scenario to the next: the properties, the REST
/// session with its SSO cookie cache, and the cluster connection.
#[derive(Debug, Default)]
pub struct Session {
    pub props: PropertyStore,
    rest: Option<RestClient>,
    framework: Option<Framework>,
}

static SESSION: LazyLock<Arc<Mutex<Session>>> = LazyLock::new(Default::default);

/// World of one scenario.
///
/// Worlds created by the runner take the run's [`Session`] over and hand it
/// back when dropped, so scenarios take turns and each one sees what the
/// previous ones left behind.
#[derive(Debug, World)]
#[world(init = Self::resume)]
pub struct BdtWorld {
    pub props: PropertyStore,
    pub settings: Arc<Settings>,
    rest: Option<RestClient>,
    framework: Option<Framework>,
    session: Option<OwnedMutexGuard<Session>>,
}

impl BdtWorld {
    /// A world with a fresh session of its own.
    pub fn new() -> Self {
        Self {
            props: PropertyStore::new(),
            settings: Settings::current(),
            rest: None,
            framework: None,
            session: None,
        }
    }

    /// A world continuing the run's session. Waits until the world holding
    /// it is dropped.
    pub async fn resume() -> Self {
        let mut session = Arc::clone(&SESSION).lock_owned().await;
        let Session {
            props,
            rest,
            framework,
        } = mem::take(&mut *session);
        Self {
            props,
            settings: Settings::current(),
            rest,
            framework,
            session: Some(session),
        }
    }

    /// Replace placeholders in a step parameter.
    pub fn expand(&self, value: &str) -> String {
        self.props.expand(value)
    }

    pub fn expand_all<const N: usize>(&self, values: [String; N]) -> [String; N] {
        values.map(|value| self.props.expand(&value))
    }

    pub fn expand_rows(&self, rows: &[Vec<String>]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| self.expand(cell)).collect())
            .collect()
    }

    /// Data-table rows with every cell expanded.
    pub fn expanded_table(&self, step: &Step) -> Result<Vec<Vec<String>>, StepError> {
        Ok(self.expand_rows(table(step)?))
    }

    /// REST client of the scenario, created on first use.
    pub fn rest(&mut self) -> Result<&mut RestClient> {
        ensure_rest(&mut self.rest)
    }

    pub fn framework(&self) -> Result<&Framework, StepError> {
        self.framework.as_ref().context(NoClusterSnafu)
    }

    pub fn framework_mut(&mut self) -> Result<&mut Framework, StepError> {
        self.framework.as_mut().context(NoClusterSnafu)
    }

    pub fn set_framework(&mut self, framework: Framework) {
        self.framework = Some(framework);
    }

    /// Gosec operations over the scenario's REST session and cluster.
    pub fn gosec(&mut self) -> Result<Gosec<'_>> {
        let rest = ensure_rest(&mut self.rest)?;
        Ok(Gosec::new(
            rest,
            &mut self.props,
            self.framework.as_ref(),
            &self.settings,
        ))
    }

    /// Scope of a Gosec request from its optional tenant and login captures.
    pub fn scope(&self, tenant: &str, tenant_login: &str, login: &str) -> Result<Scope> {
        let login_of = |value: &str| -> Result<Option<Login>> {
            Ok(match opt(value) {
                Some(value) => Some(self.expand(value).parse()?),
                None => None,
            })
        };
        Ok(Scope {
            tenant: opt(tenant).map(|tenant| self.expand(tenant)),
            tenant_login: login_of(tenant_login)?,
            login: login_of(login)?,
        })
    }

    /// Write `content` to `file` in the output directory.
    pub async fn write_output(&self, file: &str, content: &str) -> Result<(), StepError> {
        let path = self.settings.output_path(file);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(WriteFileSnafu { path: parent })?;
        }
        tokio::fs::write(&path, content)
            .await
            .context(WriteFileSnafu { path: &path })?;
        debug!(message = "Saved step output.", path = %path.display());
        Ok(())
    }

    /// Store `content` in the property `variable` and in the output `file`,
    /// each only when given.
    pub async fn save(
        &mut self,
        content: &str,
        variable: Option<&str>,
        file: Option<&str>,
    ) -> Result<(), StepError> {
        if let Some(variable) = variable {
            let variable = self.expand(variable);
            self.props.set(variable, content);
        }
        if let Some(file) = file {
            let file = self.expand(file);
            self.write_output(&file, content).await?;
        }
        Ok(())
    }

    /// Contents of `file`, relative to the resources directory.
    pub async fn read_resource(&self, file: &str) -> Result<String, StepError> {
        let path = self.settings.resource_path(file);
        tokio::fs::read_to_string(&path)
            .await
            .context(ReadFileSnafu { path })
    }
}

impl Default for BdtWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BdtWorld {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            **session = Session {
                props: mem::take(&mut self.props),
                rest: self.rest.take(),
                framework: self.framework.take(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn optional_captures() {
        assert_eq!(opt(""), None);
        assert_eq!(opt("ns"), Some("ns"));
    }

    #[test]
    fn checks() {
        assert!(check(true, "unused").is_ok());
        let error = check(false, "Error obtaining ID from policy p").unwrap_err();
        assert_eq!(error.to_string(), "Error obtaining ID from policy p");
    }

    #[test]
    fn tables() {
        let mut world = BdtWorld::new();
        world.props.set("NS", "keos-core");
        let rows = vec![vec!["namespace".to_owned(), "!{NS}".to_owned()]];
        assert_eq!(
            world.expand_rows(&rows),
            vec![vec!["namespace".to_owned(), "keos-core".to_owned()]]
        );
    }

    #[test]
    fn scopes() {
        let mut world = BdtWorld::new();
        world.props.set("TENANT", "NONE");
        let scope = world.scope("!{TENANT}", "admin:1234", "").unwrap();
        assert_eq!(scope.tenant.as_deref(), Some("NONE"));
        assert_eq!(scope.tenant_login.map(|login| login.user), Some("admin".to_owned()));
        assert!(scope.login.is_none());
        assert!(world.scope("", "", "no-colon").is_err());
    }

    #[tokio::test]
    async fn saves_to_property_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = BdtWorld::new();
        world.settings = Arc::new(Settings {
            output_dir: dir.path().to_path_buf(),
            ..Settings::default()
        });
        world
            .save("pod-a\npod-b", Some("PODS"), Some("pods.txt"))
            .await
            .unwrap();
        assert_eq!(world.props.get("PODS"), Some("pod-a\npod-b"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pods.txt")).unwrap(),
            "pod-a\npod-b"
        );
    }

    #[tokio::test]
    async fn session_outlives_scenarios() {
        let mut first = BdtWorld::resume().await;
        first.props.set("SHARED", "abc");
        first.rest().unwrap().set_host("keos.example.com", true).unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), BdtWorld::resume()).await;
        assert!(waiting.is_err());
        drop(first);

        let mut second = BdtWorld::resume().await;
        assert_eq!(second.expand("!{SHARED}"), "abc");
        assert_eq!(
            second.rest().unwrap().base().map(|base| base.as_str()),
            Some("https://keos.example.com/")
        );
        second.props.remove("SHARED");
    }

    #[test]
    fn detached_worlds_start_empty() {
        let world = BdtWorld::new();
        assert!(!world.props.contains("SHARED"));
    }

    #[test]
    fn no_cluster() {
        let world = BdtWorld::new();
        assert!(matches!(world.framework(), Err(StepError::NoCluster)));
    }
}
