//! Pods, deployments, statefulsets, autoscalers and volume claims.

use std::{collections::BTreeMap, str::FromStr};

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec, StatefulSet},
        autoscaling::v1::HorizontalPodAutoscaler,
        core::v1::{
            Container, EnvVar, PersistentVolumeClaim, Pod, PodSpec, PodTemplateSpec, Service,
            ServicePort, ServiceSpec,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity, apis::meta::v1::LabelSelector, util::intstr::IntOrString,
    },
};
use kube::{
    Api,
    api::{ListParams, LogParams, ObjectMeta, Patch, PatchParams, PostParams},
};
use serde_json::json;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::info;

use crate::{
    ApiSnafu, ContainerNotFoundSnafu, Framework, InvalidEnvSnafu, MismatchSnafu, NotFoundSnafu,
    Result, UnsupportedPvcPathSnafu, resource::label_selector,
};

/// The only claim field that may be patched.
pub const PVC_STORAGE_PATH: &str = "/spec/resources/requests/storage";

/// Image pull policy used when a step does not give one.
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";

/// Everything needed to start a single pod.
#[derive(Clone, Debug, Default)]
pub struct RunPod {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub image_pull_policy: Option<String>,
    pub restart_policy: String,
    pub service_account: String,
    pub env: BTreeMap<String, String>,
    pub command: String,
    pub args: Vec<String>,
}

/// Parse `K=V,K2=V2` into a map.
pub fn parse_env(value: &str) -> Result<BTreeMap<String, String>> {
    value
        .split(',')
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
            _ => InvalidEnvSnafu { value }.fail(),
        })
        .collect()
}

/// How a service selects the pods of an exposed deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AppSelector {
    #[default]
    App,
    Cct,
}

impl AppSelector {
    const fn key(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Cct => "cct.stratio.com/application_id",
        }
    }
}

/// Pod phase as written in scenarios.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    Running,
    Failed,
    Succeeded,
}

impl FromStr for PodPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "failed" => Ok(Self::Failed),
            "succeeded" => Ok(Self::Succeeded),
            other => Err(format!("unknown pod status {other}")),
        }
    }
}

impl PodPhase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
        }
    }
}

/// Check a pod's phase and, optionally, the readiness of its last container.
pub fn check_pod(pod: &Pod, phase: PodPhase, ready: Option<bool>) -> Result<()> {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let status = pod.status.as_ref();
    let actual = status
        .and_then(|s| s.phase.as_deref())
        .unwrap_or_default()
        .to_lowercase();
    ensure!(
        actual == phase.as_str(),
        MismatchSnafu {
            what: format!("Expected status of pod {name}"),
            expected: phase.as_str(),
            actual,
        }
    );
    if let Some(expected) = ready {
        let actual = status
            .and_then(|s| s.container_statuses.as_ref())
            .and_then(|statuses| statuses.last())
            .map(|last| last.ready)
            .unwrap_or(false);
        ensure!(
            actual == expected,
            MismatchSnafu {
                what: format!("Pod {name} ready?"),
                expected: expected.to_string(),
                actual: actual.to_string(),
            }
        );
    }
    Ok(())
}

/// One edit of a container's environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvEdit {
    Add { name: String, value: String },
    Replace { name: String, value: String },
    Remove { name: String },
}

impl EnvEdit {
    /// Build an edit from a `name | ADD|REPLACE|REMOVE | value` row. Unknown
    /// actions are ignored.
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        match cell(1).as_str() {
            "ADD" => Some(Self::Add {
                name: cell(0),
                value: cell(2),
            }),
            "REPLACE" => Some(Self::Replace {
                name: cell(0),
                value: cell(2),
            }),
            "REMOVE" => Some(Self::Remove { name: cell(0) }),
            _ => None,
        }
    }
}

fn env_var(name: String, value: String) -> EnvVar {
    EnvVar {
        name,
        value: Some(value),
        value_from: None,
    }
}

/// Apply `edits` in order to an environment list, removing duplicates first.
pub fn edit_env(env: Vec<EnvVar>, edits: &[EnvEdit]) -> Vec<EnvVar> {
    let mut result: Vec<EnvVar> = Vec::with_capacity(env.len());
    for var in env {
        if !result.contains(&var) {
            result.push(var);
        }
    }
    for edit in edits {
        match edit {
            EnvEdit::Add { name, value } => result.push(env_var(name.clone(), value.clone())),
            EnvEdit::Replace { name, value } => {
                if let Some(position) = result.iter().position(|var| var.name == *name) {
                    result.remove(position);
                }
                result.push(env_var(name.clone(), value.clone()));
            }
            EnvEdit::Remove { name } => {
                if let Some(position) = result.iter().position(|var| var.name == *name) {
                    result.remove(position);
                }
            }
        }
    }
    result
}

/// Tag of an image reference: the text after its last `:`.
pub fn image_tag(image: &str) -> &str {
    image.rsplit(':').next().unwrap_or(image)
}

fn deployment_manifest(name: &str, image: &str, pull_policy: Option<&str>) -> Deployment {
    let labels = BTreeMap::from([("app".to_owned(), name.to_owned())]);
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: name.to_owned(),
                        image: Some(image.to_owned()),
                        image_pull_policy: Some(
                            pull_policy.unwrap_or(DEFAULT_PULL_POLICY).to_owned(),
                        ),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_manifest(
    deployment: &str,
    service_name: &str,
    service_type: &str,
    port: i32,
    selector: AppSelector,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(service_name.to_owned()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                selector.key().to_owned(),
                deployment.to_owned(),
            )])),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_owned()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            type_: Some(service_type.to_owned()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_manifest(config: &RunPod) -> Pod {
    let env = (!config.env.is_empty()).then(|| {
        config
            .env
            .iter()
            .map(|(name, value)| env_var(name.clone(), value.clone()))
            .collect()
    });
    Pod {
        metadata: ObjectMeta {
            name: Some(config.name.clone()),
            labels: Some(BTreeMap::from([("run".to_owned(), config.name.clone())])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some(config.restart_policy.clone()),
            service_account_name: Some(config.service_account.clone()),
            containers: vec![Container {
                name: config.name.clone(),
                image: Some(config.image.clone()),
                image_pull_policy: Some(
                    config
                        .image_pull_policy
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PULL_POLICY.to_owned()),
                ),
                command: Some(vec![config.command.clone()]),
                args: Some(config.args.clone()),
                env,
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl Framework {
    pub async fn run_pod(&self, config: &RunPod) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client(), &config.namespace);
        api.create(&PostParams::default(), &pod_manifest(config))
            .await
            .context(ApiSnafu {
                action: format!("run pod {}", config.name),
            })?;
        info!(message = "Pod created.", name = %config.name, namespace = %config.namespace);
        Ok(())
    }

    pub async fn pod(&self, name: &str, namespace: &str) -> Result<Pod> {
        let api: Api<Pod> = Api::namespaced(self.client(), namespace);
        api.get(name).await.context(ApiSnafu {
            action: format!("get pod {name}"),
        })
    }

    pub async fn pod_log(&self, name: &str, namespace: &str) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client(), namespace);
        api.logs(name, &LogParams::default())
            .await
            .context(ApiSnafu {
                action: format!("get log of pod {name}"),
            })
    }

    /// Check that exactly `count` pods match `labels` and all of them are in
    /// the given state.
    pub async fn check_pods_by_label(
        &self,
        labels: &str,
        namespace: &str,
        count: usize,
        phase: PodPhase,
        ready: Option<bool>,
    ) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client(), namespace);
        let pods = api
            .list(&ListParams::default().labels(&label_selector(labels)?))
            .await
            .context(ApiSnafu {
                action: format!("list pods with labels {labels}"),
            })?;
        ensure!(
            pods.items.len() == count,
            MismatchSnafu {
                what: "Expected pods",
                expected: count.to_string(),
                actual: pods.items.len().to_string(),
            }
        );
        pods.items
            .iter()
            .try_for_each(|pod| check_pod(pod, phase, ready))
    }

    pub async fn deployment(&self, name: &str, namespace: &str) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client(), namespace);
        api.get(name).await.context(ApiSnafu {
            action: format!("get deployment {name}"),
        })
    }

    /// Create a one-replica deployment labelled and selected by `app=name`.
    pub async fn create_deployment(
        &self,
        name: &str,
        namespace: &str,
        image: &str,
        pull_policy: Option<&str>,
    ) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client(), namespace);
        api.create(
            &PostParams::default(),
            &deployment_manifest(name, image, pull_policy),
        )
        .await
        .context(ApiSnafu {
            action: format!("create deployment {name}"),
        })?;
        info!(message = "Deployment created.", %name, %namespace);
        Ok(())
    }

    /// Create a service for a deployment, on the same port it targets.
    pub async fn expose_deployment(
        &self,
        deployment: &str,
        service_name: Option<&str>,
        service_type: &str,
        namespace: &str,
        port: i32,
        selector: AppSelector,
    ) -> Result<()> {
        let service_name = service_name.unwrap_or(deployment);
        let api: Api<Service> = Api::namespaced(self.client(), namespace);
        api.create(
            &PostParams::default(),
            &service_manifest(deployment, service_name, service_type, port, selector),
        )
        .await
        .context(ApiSnafu {
            action: format!("expose deployment {deployment}"),
        })?;
        info!(message = "Deployment exposed.", %deployment, service = %service_name, %port);
        Ok(())
    }

    pub async fn scale_deployment(&self, name: &str, namespace: &str, replicas: i32) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client(), namespace);
        api.patch_scale(
            name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "spec": { "replicas": replicas } })),
        )
        .await
        .context(ApiSnafu {
            action: format!("scale deployment {name}"),
        })?;
        Ok(())
    }

    /// Ready replicas of a deployment; absent counts as zero.
    pub async fn deployment_ready_replicas(&self, name: &str, namespace: &str) -> Result<i32> {
        let deployment = self.deployment(name, namespace).await?;
        Ok(deployment
            .status
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0))
    }

    /// Ready replicas of a statefulset; absent counts as zero.
    pub async fn statefulset_ready_replicas(&self, name: &str, namespace: &str) -> Result<i32> {
        let api: Api<StatefulSet> = Api::namespaced(self.client(), namespace);
        let statefulset = api.get(name).await.context(ApiSnafu {
            action: format!("get statefulset {name}"),
        })?;
        Ok(statefulset
            .status
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0))
    }

    /// Tag of the image of the deployment's first container.
    pub async fn deployment_version(&self, name: &str, namespace: &str) -> Result<String> {
        let deployment = self.deployment(name, namespace).await?;
        let image = deployment
            .spec
            .and_then(|spec| spec.template.spec)
            .and_then(|spec| spec.containers.into_iter().next())
            .and_then(|container| container.image)
            .context(NotFoundSnafu {
                kind: format!("image of deployment {name}"),
            })?;
        Ok(image_tag(&image).to_owned())
    }

    /// Edit the environment of one container of a deployment.
    pub async fn update_deployment_env(
        &self,
        name: &str,
        namespace: &str,
        container: &str,
        edits: &[EnvEdit],
    ) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client(), namespace);
        let mut deployment = self.deployment(name, namespace).await?;
        let target = deployment
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .and_then(|spec| spec.containers.iter_mut().find(|c| c.name == container))
            .context(ContainerNotFoundSnafu {
                container,
                deployment: name,
                namespace,
            })?;
        let env = target.env.take().unwrap_or_default();
        target.env = Some(edit_env(env, edits));

        api.replace(name, &PostParams::default(), &deployment)
            .await
            .context(ApiSnafu {
                action: format!("update deployment {name}"),
            })?;
        Ok(())
    }

    /// Set `maxReplicas`, and `minReplicas` when given, of an autoscaler.
    pub async fn update_autoscaler(
        &self,
        name: &str,
        namespace: &str,
        min_replicas: Option<i32>,
        max_replicas: i32,
    ) -> Result<()> {
        let api: Api<HorizontalPodAutoscaler> = Api::namespaced(self.client(), namespace);
        let mut hpa = api.get(name).await.context(ApiSnafu {
            action: format!("get horizontalpodautoscaler {name}"),
        })?;
        let spec = hpa.spec.get_or_insert_with(Default::default);
        spec.max_replicas = max_replicas;
        if min_replicas.is_some() {
            spec.min_replicas = min_replicas;
        }
        api.replace(name, &PostParams::default(), &hpa)
            .await
            .context(ApiSnafu {
                action: format!("update horizontalpodautoscaler {name}"),
            })?;
        Ok(())
    }

    /// Resize a volume claim. Only [`PVC_STORAGE_PATH`] is supported.
    pub async fn patch_volume_claim(
        &self,
        name: &str,
        namespace: &str,
        path: &str,
        value: &str,
    ) -> Result<i32> {
        ensure!(path == PVC_STORAGE_PATH, UnsupportedPvcPathSnafu { path });
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client(), namespace);
        let mut claim = api.get(name).await.context(ApiSnafu {
            action: format!("get persistentvolumeclaim {name}"),
        })?;
        claim
            .spec
            .get_or_insert_with(Default::default)
            .resources
            .get_or_insert_with(Default::default)
            .requests
            .get_or_insert_with(BTreeMap::new)
            .insert("storage".to_owned(), Quantity(value.to_owned()));
        api.replace(name, &PostParams::default(), &claim)
            .await
            .context(ApiSnafu {
                action: format!("update persistentvolumeclaim {name}"),
            })?;
        info!(message = "Volume claim resized.", %name, %namespace, storage = %value);
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{ContainerStatus, PodStatus};

    use super::*;

    fn pod(phase: &str, ready: &[bool]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("p".into()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.into()),
                container_statuses: Some(
                    ready
                        .iter()
                        .map(|ready| ContainerStatus {
                            ready: *ready,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pod_phase_is_case_insensitive() {
        check_pod(&pod("Running", &[true]), PodPhase::Running, None).unwrap();
        assert!(check_pod(&pod("Pending", &[true]), PodPhase::Running, None).is_err());
    }

    #[test]
    fn readiness_uses_last_container() {
        let p = pod("Running", &[true, false]);
        check_pod(&p, PodPhase::Running, Some(false)).unwrap();
        assert!(check_pod(&p, PodPhase::Running, Some(true)).is_err());
    }

    #[test]
    fn env_edits() {
        let env = vec![
            env_var("A".into(), "1".into()),
            env_var("A".into(), "1".into()),
            env_var("B".into(), "2".into()),
        ];
        let rows = [
            ["C", "ADD", "3"].map(String::from),
            ["A", "REPLACE", "9"].map(String::from),
            ["B", "REMOVE", ""].map(String::from),
            ["D", "UNKNOWN", "x"].map(String::from),
        ];
        let edits: Vec<_> = rows.iter().filter_map(|row| EnvEdit::from_row(row)).collect();
        let names: Vec<_> = edit_env(env, &edits)
            .into_iter()
            .map(|var| format!("{}={}", var.name, var.value.unwrap_or_default()))
            .collect();
        assert_eq!(names, vec!["C=3", "A=9"]);
    }

    #[test]
    fn tags() {
        assert_eq!(image_tag("qa.stratio.com/gosec-management-baas:2.1.0"), "2.1.0");
        assert_eq!(image_tag("registry:5000/app:1.0"), "1.0");
    }

    #[test]
    fn env_parsing() {
        let env = parse_env("A=1,B=x=y").unwrap();
        assert_eq!(env.get("B").map(String::as_str), Some("x=y"));
        assert!(parse_env("novalue").is_err());
    }

    #[test]
    fn deployment_defaults() {
        let deployment = deployment_manifest("web", "nginx:1", None);
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));
        let container = &spec.template.spec.unwrap().containers[0];
        assert_eq!(container.name, "web");
        assert_eq!(container.image_pull_policy.as_deref(), Some("IfNotPresent"));
    }

    #[test]
    fn service_selector() {
        let service = service_manifest("web", "web-svc", "ClusterIP", 8080, AppSelector::Cct);
        let spec = service.spec.unwrap();
        assert_eq!(
            spec.selector.unwrap().get("cct.stratio.com/application_id").map(String::as_str),
            Some("web")
        );
        assert_eq!(spec.ports.unwrap()[0].target_port, Some(IntOrString::Int(8080)));
    }
}
