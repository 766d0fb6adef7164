//! Loads the configuration of a Keos cluster into the run properties:
//! kube config, domains and virtual hosts, Vault access, ingress paths and the
//! central configuration of the command center.

use std::{path::Path, time::Duration};

use k8s_openapi::api::{
    core::v1::{ConfigMap, Node, Secret, Service},
    networking::v1::Ingress,
};
use kube::{Api, api::ListParams};
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{error, info, warn};

use crate::{
    command::{self, CommandError},
    config::Settings,
    json::scalar_to_string,
    k8s::{self, Framework, ResourceKind, resource::ListFilter},
    properties::PropertyStore,
    version,
};

pub const OPERATOR_NAMESPACE: &str = "keos-ops";
pub const OPERATOR_LABELS: &str =
    "app.kubernetes.io/instance=keos-operator,app.kubernetes.io/name=keos-operator";
const OPERATOR_KEOS_YAML: &str = "/workspace/keos.yaml";
const CORE_NAMESPACE: &str = "keos-core";
const AUTH_NAMESPACE: &str = "keos-auth";
const CCT_NAMESPACE: &str = "keos-cct";
const GOSEC_BAAS: &str = "gosec-management-baas";
const DEFAULT_ARTIFACT_REPOSITORY: &str = "http://qa.int.stratio.com/repository";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Snafu)]
pub enum KeosError {
    #[snafu(display("cluster_versions.yaml or cluster.yaml not found, so KEOS_VERSION must be defined"))]
    MissingVersion,

    #[snafu(display("{}", source))]
    Cluster { source: k8s::Error },

    #[snafu(display("Kubernetes API call failed while trying to {}: {}", action, source))]
    Api { action: String, source: kube::Error },

    #[snafu(display("No keos-operator pod found in {}", OPERATOR_NAMESPACE))]
    OperatorNotFound,

    #[snafu(display("Unable to download workspace {}: {}", url, source))]
    Download { url: String, source: reqwest::Error },

    #[snafu(display("{}", source))]
    Command { source: CommandError },

    #[snafu(display("I/O error on {}: {}", path, source))]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse {}: {}", path, source))]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
}

type Result<T, E = KeosError> = std::result::Result<T, E>;

async fn read_yaml(path: &Path) -> Result<Value> {
    let display = path.display().to_string();
    let text = tokio::fs::read_to_string(path)
        .await
        .context(IoSnafu { path: &display })?;
    serde_yaml::from_str(&text).context(YamlSnafu { path: display })
}

async fn read_yaml_if_exists(path: &Path) -> Result<Option<Value>> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        read_yaml(path).await.map(Some)
    } else {
        Ok(None)
    }
}

/// Scalar at a dotted path such as `keos.ingress.admin.subdomain`.
pub fn lookup(doc: &Value, path: &str) -> Option<String> {
    path.split('.')
        .try_fold(doc, |value, key| value.get(key))
        .filter(|value| !value.is_null())
        .map(scalar_to_string)
}

/// Keos version without its build suffix: `0.5.2-b1` is `0.5.2`.
pub fn short_version(version: &str) -> &str {
    version.split_once('-').map_or(version, |(short, _)| short)
}

/// Keos and universe versions from `cluster_versions.yaml`, or the Keos
/// version alone from `cluster.yaml`.
pub fn workspace_versions(
    cluster_versions: Option<&Value>,
    cluster: Option<&Value>,
) -> (Option<String>, Option<String>) {
    match (cluster_versions, cluster) {
        (Some(versions), _) => (
            lookup(versions, "clusterVersions.keosVersion"),
            lookup(versions, "clusterVersions.universeVersion"),
        ),
        (None, Some(cluster)) => (lookup(cluster, "keos.version"), None),
        (None, None) => (None, None),
    }
}

/// Domains, virtual hosts and base paths declared in `keos.yaml`.
pub fn set_domains(props: &mut PropertyStore, keos: &Value, keos_version: &str, settings: &Settings) {
    let cluster_id = settings.keos.cluster_id.as_deref().unwrap_or_default();

    if version::below(keos_version, "0.5.0") {
        let domain = lookup(keos, "keos.domain").unwrap_or_default();
        let admin_vhost = lookup(keos, "keos.auth.admin.vHost")
            .map_or_else(|| format!("admin.{domain}"), |vhost| format!("{vhost}{domain}"));
        let sis_vhost = lookup(keos, "keos.auth.sis.vHost")
            .map_or_else(|| format!("sis.{domain}"), |vhost| format!("{vhost}{domain}"));
        props.set("ADMIN_VHOST", admin_vhost);
        props.set(
            "ADMIN_BASEPATH",
            lookup(keos, "keos.auth.admin.basepath").unwrap_or_else(|| "/".to_owned()),
        );
        props.set("SIS_VHOST", sis_vhost);
        props.set(
            "SIS_BASEPATH",
            lookup(keos, "keos.auth.sis.basepath").unwrap_or_else(|| "/sso".to_owned()),
        );
        props.set("KEOS_DOMAIN", domain);
        return;
    }

    let domain = lookup(keos, "keos.domain")
        .or_else(|| settings.keos.domain.clone())
        .unwrap_or_else(|| format!("{cluster_id}.int"));
    let external_domain = lookup(keos, "keos.external_domain")
        .or_else(|| settings.keos.external_domain.clone())
        .unwrap_or_else(|| format!("{cluster_id}.ext"));
    let registry = lookup(keos, "external_registry.url")
        .or_else(|| settings.keos.external_registry.clone())
        .unwrap_or_else(|| "qa.int.stratio.com".to_owned());

    let admin_subdomain = lookup(keos, "keos.ingress.admin.subdomain").unwrap_or_else(|| "admin".to_owned());
    let admin_basepath = lookup(keos, "keos.ingress.admin.basepath").unwrap_or_else(|| "/".to_owned());
    let sis_subdomain = lookup(keos, "keos.ingress.sis.subdomain").unwrap_or_else(|| "sis".to_owned());
    let sis_basepath = lookup(keos, "keos.ingress.sis.basepath").unwrap_or_else(|| "/sso".to_owned());

    let admin_vhost = format!("{admin_subdomain}.{external_domain}");
    let sis_vhost = format!("{sis_subdomain}.{external_domain}");
    let admin_url = if admin_basepath == "/" {
        admin_vhost.clone()
    } else {
        format!("{admin_vhost}{admin_basepath}")
    };

    props.set("KEOS_DOMAIN", domain);
    props.set("KEOS_EXTERNAL_DOMAIN", external_domain);
    props.set("KEOS_EXTERNAL_REGISTRY", registry);
    props.set("ADMIN_SUBDOMAIN", admin_subdomain);
    props.set("SIS_SUBDOMAIN", sis_subdomain);
    props.set("SIS_URL", format!("{sis_vhost}{sis_basepath}"));
    props.set("ADMIN_URL", admin_url);
    props.set("ADMIN_BASEPATH", admin_basepath);
    props.set("SIS_BASEPATH", sis_basepath);
    props.set("ADMIN_VHOST", admin_vhost);
    props.set("SIS_VHOST", sis_vhost);
}

/// Service ids of the command center applications.
pub fn cct_service_ids(keos_version: &str) -> [(&'static str, &'static str); 6] {
    if version::below(keos_version, "0.6.0") {
        [
            ("cct-applications-query_id", "cct-applications-query-service"),
            ("cct-central-configuration_id", "cct-central-configuration-service"),
            ("cct-orchestrator_id", "cct-orchestrator-service"),
            ("cct_ui_id", "cct-ui"),
            ("cct-universe_id", "cct-universe-service"),
            ("cct-paas-services_id", "cct-paas-services-service"),
        ]
    } else {
        [
            ("cct-applications-query_id", "cct-applications-query"),
            ("cct-central-configuration_id", "cct-central-configuration"),
            ("cct-orchestrator_id", "cct-orchestrator"),
            ("cct_ui_id", "cct-ui"),
            ("cct-universe_id", "cct-universe"),
            ("cct-paas-services_id", "cct-paas-services"),
        ]
    }
}

/// Fields of the central configuration exposed as properties.
const CENTRAL_CONFIG: &[(&str, &str)] = &[
    ("admin_fqdn", "KEOS_FQDN"),
    ("eos.dockerRegistry", "DOCKER_REGISTRY"),
    ("eos.proxyAccessPointURL", "KEOS_ACCESS_POINT"),
    ("globals.sso.ssoTenantDefault", "KEOS_TENANT"),
    ("globals.kerberos.realm", "KEOS_REALM"),
    ("globals.kerberos.kdcHost", "KDC_HOST"),
    ("globals.kerberos.kdcPort", "KDC_PORT"),
    ("globals.kerberos.kadminHost", "KADMIN_HOST"),
    ("globals.kerberos.kadminPort", "KADMIN_PORT"),
    ("globals.ldap.adminUserUuid", "KEOS_USER"),
    ("globals.ldap.url", "LDAP_URL"),
    ("globals.ldap.port", "LDAP_PORT"),
    ("globals.ldap.userDn", "LDAP_USER_DN"),
    ("globals.ldap.groupDN", "LDAP_GROUP_DN"),
    ("globals.ldap.ldapBase", "LDAP_BASE"),
    ("globals.ldap.adminrouterAuthorizedGroup", "LDAP_ADMIN_GROUP"),
    ("globals.vault.vaultHost", "KEOS_VAULT_HOST_INTERNAL"),
];

pub fn set_central_config(props: &mut PropertyStore, central: &Value) {
    for (path, property) in CENTRAL_CONFIG {
        props.set(*property, lookup(central, path).unwrap_or_default());
    }
}

/// The part of an ingress path before its first capture group.
pub fn ingress_prefix(path: &str) -> &str {
    path.split_once('(').map_or(path, |(prefix, _)| prefix)
}

/// Label key gosec deployments are selected by.
pub fn gosec_label<'a>(match_labels: impl IntoIterator<Item = &'a String>) -> Option<&'static str> {
    let keys: Vec<_> = match_labels.into_iter().collect();
    if keys.iter().any(|key| key.contains("app.kubernetes.io")) {
        Some("app.kubernetes.io/name")
    } else if keys.iter().any(|key| key.contains("gosec.stratio.com")) {
        Some("gosec.stratio.com/identifier")
    } else {
        None
    }
}

/// Loads a cluster's workspace into the run properties.
#[derive(Debug)]
pub struct WorkspaceLoader<'a> {
    settings: &'a Settings,
    props: &'a mut PropertyStore,
}

impl<'a> WorkspaceLoader<'a> {
    pub fn new(settings: &'a Settings, props: &'a mut PropertyStore) -> Self {
        Self { settings, props }
    }

    /// Load the workspace of `KEOS_CLUSTER_ID` and return a client connected
    /// to its cluster. Without a cluster id nothing is loaded.
    pub async fn load(mut self) -> Result<Option<Framework>> {
        let settings = self.settings;
        let Some(cluster_id) = settings.keos.cluster_id.clone() else {
            info!(message = "Info cannot be retrieved from workspace without KEOS_CLUSTER_ID variable.");
            return Ok(None);
        };

        let keos = &settings.keos;
        let mut keos_version = keos.keos_version.clone();
        let (framework, keos_yaml) = match &keos.kube_config_path {
            Some(kube_config) => {
                self.props.set("CLUSTER_KUBE_CONFIG_PATH", kube_config);
                self.props.set(
                    "CLUSTER_SSH_USER",
                    keos.ssh_user.as_deref().unwrap_or("NotSet"),
                );
                self.props.set(
                    "CLUSTER_SSH_PEM_PATH",
                    keos.ssh_pem_path.as_deref().unwrap_or("NotSet"),
                );
                let framework = Framework::connect(kube_config).await.context(ClusterSnafu)?;
                let keos_yaml = self.fetch_keos_yaml(&framework).await?;
                (framework, keos_yaml)
            }
            None => {
                let workspace = self.download_workspace(&cluster_id).await?;
                let (workspace_keos, universe) = workspace_versions(
                    read_yaml_if_exists(&workspace.join("cluster_versions.yaml")).await?.as_ref(),
                    read_yaml_if_exists(&workspace.join("cluster.yaml")).await?.as_ref(),
                );
                keos_version = keos_version.or(workspace_keos);
                if let Some(universe) = keos.universe_version.clone().or(universe) {
                    self.props.set("UNIVERSE_VERSION", universe);
                }
                let keos_yaml = read_yaml(&workspace.join("keos.yaml")).await?;

                let kube_config = workspace.join(".kube").join("config");
                self.props.set("CLUSTER_SSH_PEM_PATH", workspace.join("key").display().to_string());
                self.props.set("CLUSTER_KUBE_CONFIG_PATH", kube_config.display().to_string());
                let framework = Framework::connect(&kube_config).await.context(ClusterSnafu)?;
                (framework, keos_yaml)
            }
        };

        if keos.is_eks() {
            info!(message = "CLUSTER_SSH_USER cannot be set: keos.yaml of eks clusters has no infra section.");
        } else {
            self.props.set(
                "CLUSTER_SSH_USER",
                lookup(&keos_yaml, "infra.ssh_user").unwrap_or_default(),
            );
        }

        let full_version = keos_version.context(MissingVersionSnafu)?;
        let keos_version = short_version(&full_version).to_owned();
        self.props.set("KEOS_VERSION", &full_version);
        self.props.set("keosVersion", &keos_version);
        set_domains(self.props, &keos_yaml, &keos_version, settings);

        self.vault_config(&framework).await?;
        self.worker_and_ingress_hosts(&framework).await?;
        if lookup(&keos_yaml, "keos.calico.service_loadbalancer_pools").is_none() {
            info!(
                message = "Cluster without load balancer pools; map the SSO hosts in /etc/hosts if needed.",
                sis = self.props.get("KEOS_SIS_HOST").unwrap_or_default(),
                sis_ip = self.props.get("KEOS_SIS_HOST_IP").unwrap_or_default(),
            );
        }
        self.cct_config(&framework, &keos_version).await;
        self.ingress_paths(&framework, &keos_version).await?;
        self.props.set("KEOS_PASSWORD", &keos.password);
        self.gosec_variables(&framework).await;

        info!(message = "Workspace loaded.", cluster = %cluster_id, keos_version = %full_version);
        Ok(Some(framework))
    }

    async fn fetch_keos_yaml(&mut self, framework: &Framework) -> Result<Value> {
        let local = self.settings.output_path("keos.yaml");
        if self.settings.keos.is_eks() {
            info!(message = "There is no keos-operator in eks cluster.");
            let source = &self.settings.keos.keos_yaml_path;
            self.props.set("CLUSTER_KEOS_YAML_PATH", source);
            tokio::fs::copy(source, &local)
                .await
                .context(IoSnafu { path: source })?;
        } else {
            let pod = framework
                .list_names(
                    ResourceKind::Pod,
                    Some(OPERATOR_NAMESPACE),
                    &ListFilter {
                        labels: Some(OPERATOR_LABELS.to_owned()),
                        fields: None,
                    },
                )
                .await
                .context(ClusterSnafu)?;
            let pod = pod.lines().next().context(OperatorNotFoundSnafu)?;
            framework
                .copy_from_pod(pod, OPERATOR_NAMESPACE, OPERATOR_KEOS_YAML, &local)
                .await
                .context(ClusterSnafu)?;
        }
        read_yaml(&local).await
    }

    async fn download_workspace(&self, cluster_id: &str) -> Result<std::path::PathBuf> {
        let name = format!("keos-workspace-{cluster_id}");
        let url = format!("http://{}/{name}.tgz", self.settings.keos.workspace_host);
        let output = &self.settings.output_dir;
        let archive = self.settings.output_path(format!("{name}.tgz"));

        info!(message = "Downloading workspace.", %url);
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context(DownloadSnafu { url: &url })?;
        let bytes = client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(DownloadSnafu { url: &url })?
            .bytes()
            .await
            .context(DownloadSnafu { url: &url })?;

        tokio::fs::create_dir_all(output)
            .await
            .context(IoSnafu { path: output.display().to_string() })?;
        tokio::fs::write(&archive, &bytes)
            .await
            .context(IoSnafu { path: archive.display().to_string() })?;
        command::run(&format!(
            "tar -C {} -xf {}",
            output.display(),
            archive.display()
        ))
        .await
        .and_then(command::CommandOutput::ensure_success)
        .context(CommandSnafu)?;
        if let Err(error) = tokio::fs::remove_file(&archive).await {
            warn!(message = "Unable to remove workspace archive.", %error);
        }

        Ok(output.join(name))
    }

    async fn vault_config(&mut self, framework: &Framework) -> Result<()> {
        let secrets: Api<Secret> = Api::namespaced(framework.client(), CORE_NAMESPACE);
        let secret = secrets.get("vault-unseal-keys").await.context(ApiSnafu {
            action: "get secret vault-unseal-keys",
        })?;
        let token = secret
            .data
            .as_ref()
            .and_then(|data| data.get("vault-root"))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).trim().to_owned())
            .unwrap_or_default();
        self.props.set("VAULT_TOKEN", token);
        self.props.set("VAULT_HOST", "127.0.0.1");

        let services: Api<Service> = Api::namespaced(framework.client(), CORE_NAMESPACE);
        let vault = services.get("vault").await.context(ApiSnafu {
            action: "get service vault",
        })?;
        let port = vault
            .spec
            .and_then(|spec| spec.ports)
            .and_then(|ports| ports.first().map(|port| port.port))
            .map(|port| port.to_string())
            .unwrap_or_default();
        self.props.set("VAULT_PORT", port);
        Ok(())
    }

    async fn worker_and_ingress_hosts(&mut self, framework: &Framework) -> Result<()> {
        let nodes: Api<Node> = Api::all(framework.client());
        let workers = nodes
            .list(&ListParams::default().labels("node-role.kubernetes.io/worker="))
            .await
            .context(ApiSnafu {
                action: "list worker nodes",
            })?;
        let worker_ip = workers.items.iter().find_map(|node| {
            let status = node.status.as_ref()?;
            let ready = status.conditions.iter().flatten().any(|condition| {
                condition.type_ == "Ready" && condition.status == "True"
            });
            if !ready {
                return None;
            }
            status
                .addresses
                .iter()
                .flatten()
                .filter(|address| address.type_ == "InternalIP")
                .map(|address| address.address.clone())
                .last()
        });
        if let Some(ip) = worker_ip {
            self.props.set("WORKER_IP", ip);
        }

        let ingresses: Api<Ingress> = Api::namespaced(framework.client(), AUTH_NAMESPACE);
        let list = ingresses.list(&ListParams::default()).await.context(ApiSnafu {
            action: "list ingresses in keos-auth",
        })?;
        for ingress in list.items {
            let property = match ingress.metadata.name.as_deref() {
                Some("sis") => "KEOS_SIS_HOST",
                Some("oauth2-proxy") => "KEOS_OAUTH2_PROXY_HOST",
                _ => continue,
            };
            let host = ingress
                .spec
                .as_ref()
                .and_then(|spec| spec.rules.as_ref())
                .and_then(|rules| rules.first())
                .and_then(|rule| rule.host.clone())
                .unwrap_or_default();
            self.props.set(property, host);

            let balancer = ingress
                .status
                .and_then(|status| status.load_balancer)
                .and_then(|balancer| balancer.ingress)
                .and_then(|ingress| ingress.into_iter().next());
            if self.settings.keos.is_eks() {
                let hostname = balancer.and_then(|b| b.hostname).unwrap_or_default();
                self.props.set(format!("{property}_HOSTNAME"), hostname);
            } else {
                let ip = balancer.and_then(|b| b.ip).unwrap_or_default();
                self.props.set(format!("{property}_IP"), ip);
            }
        }
        Ok(())
    }

    async fn cct_config(&mut self, framework: &Framework, keos_version: &str) {
        let name = if version::below(keos_version, "0.6.0") {
            "command-center-config"
        } else {
            "cct-central-configuration-central-config"
        };
        let config_maps: Api<ConfigMap> = Api::namespaced(framework.client(), CCT_NAMESPACE);
        let central = match config_maps.get(name).await {
            Ok(config_map) => config_map
                .data
                .and_then(|mut data| data.remove("central-config.json"))
                .and_then(|text| serde_json::from_str::<Value>(&text).ok()),
            Err(error) => {
                error!(message = "Error reading command center config.", %error);
                None
            }
        };
        if let Some(central) = central {
            set_central_config(self.props, &central);
        }
        self.props.set(
            "ARTIFACT_REPOSITORY",
            self.settings
                .keos
                .artifact_repository
                .as_deref()
                .unwrap_or(DEFAULT_ARTIFACT_REPOSITORY),
        );
    }

    async fn ingress_paths(&mut self, framework: &Framework, keos_version: &str) -> Result<()> {
        for (property, id) in cct_service_ids(keos_version) {
            self.props.set(property, id);
        }

        let cct = |property: &str| self.props.get(property).unwrap_or_default().to_owned();
        let targets = [
            ("gosec-management-ui".to_owned(), CORE_NAMESPACE, "KEOS_GOSEC_INGRESS_PATH"),
            (cct("cct_ui_id"), CCT_NAMESPACE, "KEOS_CCT_INGRESS_PATH"),
            (cct("cct-orchestrator_id"), CCT_NAMESPACE, "KEOS_CCT_ORCHESTRATOR_INGRESS_PATH"),
            (cct("cct-universe_id"), CCT_NAMESPACE, "KEOS_CCT_UNIVERSE_SERVICE_INGRESS_PATH"),
            (
                cct("cct-applications-query_id"),
                CCT_NAMESPACE,
                "KEOS_CCT_APPLICATIONS_QUERY_SERVICE_INGRESS_PATH",
            ),
            (cct("cct-paas-services_id"), CCT_NAMESPACE, "KEOS_CCT_PAAS_INGRESS_PATH"),
            (GOSEC_BAAS.to_owned(), CORE_NAMESPACE, "KEOS_GOSEC_BAAS_INGRESS_PATH"),
            ("sis-api".to_owned(), AUTH_NAMESPACE, "KEOS_GOSEC_SIS_API_INGRESS_PATH"),
        ];

        for (name, namespace, property) in targets {
            let ingresses: Api<Ingress> = Api::namespaced(framework.client(), namespace);
            let ingress = ingresses.get_opt(&name).await.context(ApiSnafu {
                action: format!("get ingress {name}"),
            })?;
            let path = ingress
                .and_then(|ingress| ingress.spec)
                .and_then(|spec| spec.rules)
                .and_then(|rules| rules.into_iter().next())
                .and_then(|rule| rule.http)
                .and_then(|http| http.paths.into_iter().next())
                .and_then(|path| path.path)
                .map_or_else(
                    || "ingress_not_found".to_owned(),
                    |path| ingress_prefix(&path).to_owned(),
                );
            self.props.set(property, path);
        }
        Ok(())
    }

    async fn gosec_variables(&mut self, framework: &Framework) {
        let deployment = match framework.deployment(GOSEC_BAAS, CORE_NAMESPACE).await {
            Ok(deployment) => deployment,
            Err(error) => {
                error!(message = "Error setting GOSEC_LABEL variable.", %error);
                return;
            }
        };

        let match_labels = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.match_labels.as_ref());
        match match_labels.and_then(|labels| gosec_label(labels.keys())) {
            Some(label) => self.props.set("GOSEC_LABEL", label),
            None => warn!(message = "Not able to set the variable 'GOSEC_LABEL'."),
        }

        let image = deployment
            .spec
            .and_then(|spec| spec.template.spec)
            .and_then(|spec| spec.containers.into_iter().next())
            .and_then(|container| container.image);
        if let Some(image) = image {
            self.props.set(
                format!("{GOSEC_BAAS}_version"),
                k8s::workload::image_tag(&image),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn settings() -> Settings {
        Settings::from_lookup(|name| (name == "KEOS_CLUSTER_ID").then(|| "demo".to_owned())).unwrap()
    }

    #[test]
    fn versions_from_workspace_files() {
        let versions = json!({"clusterVersions": {"keosVersion": "0.6.1-abc", "universeVersion": "4.1"}});
        let cluster = json!({"keos": {"version": "0.4.0"}});
        assert_eq!(
            workspace_versions(Some(&versions), Some(&cluster)),
            (Some("0.6.1-abc".to_owned()), Some("4.1".to_owned()))
        );
        assert_eq!(
            workspace_versions(None, Some(&cluster)),
            (Some("0.4.0".to_owned()), None)
        );
        assert_eq!(short_version("0.6.1-abc"), "0.6.1");
    }

    #[test]
    fn domains_before_0_5() {
        let keos = json!({"keos": {"domain": "cluster.int", "auth": {"sis": {"vHost": "login.", "basepath": "/auth"}}}});
        let mut props = PropertyStore::new();
        set_domains(&mut props, &keos, "0.4.2", &settings());

        assert_eq!(props.get("KEOS_DOMAIN"), Some("cluster.int"));
        assert_eq!(props.get("ADMIN_VHOST"), Some("admin.cluster.int"));
        assert_eq!(props.get("ADMIN_BASEPATH"), Some("/"));
        assert_eq!(props.get("SIS_VHOST"), Some("login.cluster.int"));
        assert_eq!(props.get("SIS_BASEPATH"), Some("/auth"));
        assert_eq!(props.get("SIS_URL"), None);
    }

    #[test]
    fn domains_since_0_5() {
        let keos = yaml_doc(
            r#"
keos:
  domain: demo.int
  external_domain: demo.example.com
  ingress:
    admin:
      basepath: /admin
"#,
        );
        let mut props = PropertyStore::new();
        set_domains(&mut props, &keos, "0.5.0", &settings());

        assert_eq!(props.get("KEOS_EXTERNAL_DOMAIN"), Some("demo.example.com"));
        assert_eq!(props.get("KEOS_EXTERNAL_REGISTRY"), Some("qa.int.stratio.com"));
        assert_eq!(props.get("ADMIN_URL"), Some("admin.demo.example.com/admin"));
        assert_eq!(props.get("SIS_URL"), Some("sis.demo.example.com/sso"));
    }

    fn yaml_doc(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn central_config() {
        let central = json!({
            "admin_fqdn": "admin.demo",
            "globals": {"sso": {"ssoTenantDefault": "NONE"}, "kerberos": {"kdcPort": 88}},
        });
        let mut props = PropertyStore::new();
        set_central_config(&mut props, &central);
        assert_eq!(props.get("KEOS_FQDN"), Some("admin.demo"));
        assert_eq!(props.get("KEOS_TENANT"), Some("NONE"));
        assert_eq!(props.get("KDC_PORT"), Some("88"));
        assert_eq!(props.get("LDAP_URL"), Some(""));
    }

    #[test]
    fn ingress_paths_and_ids() {
        assert_eq!(ingress_prefix("/gosec/baas(/|$)(.*)"), "/gosec/baas");
        assert_eq!(ingress_prefix("/plain"), "/plain");
        assert_eq!(cct_service_ids("0.5.9")[0].1, "cct-applications-query-service");
        assert_eq!(cct_service_ids("0.6.0")[0].1, "cct-applications-query");
    }

    #[test]
    fn gosec_labels() {
        let labels: BTreeMap<String, String> =
            [("app.kubernetes.io/name".to_owned(), "gosec".to_owned())].into();
        assert_eq!(gosec_label(labels.keys()), Some("app.kubernetes.io/name"));
        let labels: BTreeMap<String, String> =
            [("gosec.stratio.com/identifier".to_owned(), "x".to_owned())].into();
        assert_eq!(gosec_label(labels.keys()), Some("gosec.stratio.com/identifier"));
        assert_eq!(gosec_label(std::iter::empty()), None);
    }
}
