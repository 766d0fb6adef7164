//! Built-in resource kinds and the kind-generic operations on them:
//! listing names, describing and deleting.

use std::{fmt, str::FromStr};

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, ReplicaSet, StatefulSet},
        batch::v1::Job,
        core::v1::{
            ConfigMap, Namespace, PersistentVolumeClaim, Pod, ResourceQuota, Secret, Service,
            ServiceAccount,
        },
        networking::v1::Ingress,
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use kube::{
    Api, Resource,
    api::{DeleteParams, DynamicObject, ListParams},
    core::ApiResource,
};
use snafu::{OptionExt, ResultExt};

use crate::{
    ApiSnafu, Framework, InvalidSelectorSnafu, NotFoundSnafu, Result, SerializeJsonSnafu,
    SerializeYamlSnafu,
};

/// Serialization used when describing an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yaml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format {other}")),
        }
    }
}

/// The built-in kinds steps can address by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    ConfigMap,
    ServiceAccount,
    ReplicaSet,
    Secret,
    ClusterRole,
    ClusterRoleBinding,
    StatefulSet,
    Role,
    RoleBinding,
    CustomResourceDefinition,
    Deployment,
    Service,
    Ingress,
    PersistentVolumeClaim,
    Namespace,
    Job,
    ResourceQuota,
}

impl FromStr for ResourceKind {
    type Err = String;

    /// Accepts the singular and plural spellings used in scenario text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pod" | "pods" => Self::Pod,
            "configmap" | "configmaps" => Self::ConfigMap,
            "serviceaccount" | "serviceaccounts" | "serviceacounts" => Self::ServiceAccount,
            "replicaset" | "replicasets" => Self::ReplicaSet,
            "secret" | "secrets" => Self::Secret,
            "clusterrole" | "clusterroles" => Self::ClusterRole,
            "clusterrolebinding" | "clusterrolebindings" => Self::ClusterRoleBinding,
            "statefulset" | "statefulsets" => Self::StatefulSet,
            "role" | "roles" => Self::Role,
            "rolebinding" | "rolebindings" => Self::RoleBinding,
            "customresourcedefinition" | "customresourcedefinitions" => {
                Self::CustomResourceDefinition
            }
            "deployment" | "deployments" => Self::Deployment,
            "service" | "services" => Self::Service,
            "ingress" | "ingresses" => Self::Ingress,
            "persistentVolumeClaim" | "persistentVolumeClaims" | "pvc" => {
                Self::PersistentVolumeClaim
            }
            "namespace" | "namespaces" => Self::Namespace,
            "job" | "jobs" => Self::Job,
            "resourcequota" | "resourcequotas" => Self::ResourceQuota,
            other => return Err(format!("unknown resource kind {other}")),
        })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.api_resource().kind)
    }
}

fn erase<K: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

impl ResourceKind {
    /// Type information used to address the kind through the dynamic API.
    pub fn api_resource(self) -> ApiResource {
        match self {
            Self::Pod => erase::<Pod>(),
            Self::ConfigMap => erase::<ConfigMap>(),
            Self::ServiceAccount => erase::<ServiceAccount>(),
            Self::ReplicaSet => erase::<ReplicaSet>(),
            Self::Secret => erase::<Secret>(),
            Self::ClusterRole => erase::<ClusterRole>(),
            Self::ClusterRoleBinding => erase::<ClusterRoleBinding>(),
            Self::StatefulSet => erase::<StatefulSet>(),
            Self::Role => erase::<Role>(),
            Self::RoleBinding => erase::<RoleBinding>(),
            Self::CustomResourceDefinition => erase::<CustomResourceDefinition>(),
            Self::Deployment => erase::<Deployment>(),
            Self::Service => erase::<Service>(),
            Self::Ingress => erase::<Ingress>(),
            Self::PersistentVolumeClaim => erase::<PersistentVolumeClaim>(),
            Self::Namespace => erase::<Namespace>(),
            Self::Job => erase::<Job>(),
            Self::ResourceQuota => erase::<ResourceQuota>(),
        }
    }

    /// Whether objects of this kind live outside namespaces.
    pub const fn is_cluster_scoped(self) -> bool {
        matches!(
            self,
            Self::ClusterRole
                | Self::ClusterRoleBinding
                | Self::CustomResourceDefinition
                | Self::Namespace
        )
    }
}

/// Parse a `k=v,k2` label filter into selector syntax. A key without a value
/// matches the empty value.
pub fn label_selector(filter: &str) -> Result<String> {
    filter
        .split(',')
        .map(|entry| {
            let mut parts = entry.splitn(2, '=');
            let key = parts.next().unwrap_or_default().trim();
            if key.is_empty() {
                return InvalidSelectorSnafu { selector: filter }.fail();
            }
            let value = parts
                .next()
                .map(|v| v.split('=').next().unwrap_or_default())
                .unwrap_or_default()
                .trim();
            Ok(format!("{key}={value}"))
        })
        .collect::<Result<Vec<_>>>()
        .map(|pairs| pairs.join(","))
}

/// Parse a `k=v,...` field filter. Every entry needs a value.
pub fn field_selector(filter: &str) -> Result<String> {
    filter
        .split(',')
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok(format!("{}={}", key.trim(), value.trim()))
            }
            _ => InvalidSelectorSnafu { selector: filter }.fail(),
        })
        .collect::<Result<Vec<_>>>()
        .map(|pairs| pairs.join(","))
}

/// Filters applied when listing.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    pub labels: Option<String>,
    pub fields: Option<String>,
}

impl ListFilter {
    fn params(&self) -> Result<ListParams> {
        let mut params = ListParams::default();
        if let Some(labels) = &self.labels {
            params = params.labels(&label_selector(labels)?);
        }
        if let Some(fields) = &self.fields {
            params = params.fields(&field_selector(fields)?);
        }
        Ok(params)
    }
}

/// Render `value` in the requested format.
pub fn render<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serde_yaml::to_string(value).context(SerializeYamlSnafu),
        OutputFormat::Json => serde_json::to_string(value).context(SerializeJsonSnafu),
    }
}

impl Framework {
    pub(crate) fn dynamic_api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client(), namespace, resource),
            None => Api::all_with(self.client(), resource),
        }
    }

    fn kind_api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let namespace = if kind.is_cluster_scoped() {
            None
        } else {
            namespace
        };
        self.dynamic_api(&kind.api_resource(), namespace)
    }

    /// Names of every object of `kind`, one per line. With no namespace all
    /// namespaces are listed.
    pub async fn list_names(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        filter: &ListFilter,
    ) -> Result<String> {
        let list = self
            .kind_api(kind, namespace)
            .list(&filter.params()?)
            .await
            .context(ApiSnafu {
                action: format!("list {kind}"),
            })?;
        Ok(list
            .items
            .iter()
            .filter_map(|item| item.metadata.name.as_deref())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Fetch one object of `kind`, or `None` if it does not exist.
    pub async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<DynamicObject>> {
        self.kind_api(kind, namespace)
            .get_opt(name)
            .await
            .context(ApiSnafu {
                action: format!("get {kind} {name}"),
            })
    }

    /// Serialize one object of `kind`.
    pub async fn describe(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
        format: OutputFormat,
    ) -> Result<String> {
        let object = self.get(kind, name, namespace).await?.context(NotFoundSnafu {
            kind: kind.to_string().to_lowercase(),
        })?;
        render(&object, format)
    }

    /// Delete one object of `kind`.
    pub async fn delete(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<()> {
        self.kind_api(kind, Some(namespace))
            .delete(name, &DeleteParams::default())
            .await
            .context(ApiSnafu {
                action: format!("delete {kind} {name}"),
            })?;
        tracing::info!(message = "Deleted object.", %kind, %name, %namespace);
        Ok(())
    }

    /// Delete every object of `kind` matching a label filter.
    pub async fn delete_by_label(
        &self,
        kind: ResourceKind,
        filter: &str,
        namespace: &str,
    ) -> Result<()> {
        let params = ListParams::default().labels(&label_selector(filter)?);
        self.kind_api(kind, Some(namespace))
            .delete_collection(&DeleteParams::default(), &params)
            .await
            .context(ApiSnafu {
                action: format!("delete {kind} with labels {filter}"),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_label_key_means_empty_value() {
        assert_eq!(label_selector("app=web,tier").unwrap(), "app=web,tier=");
    }

    #[test]
    fn label_value_stops_at_second_equals() {
        assert_eq!(label_selector("a=b=c").unwrap(), "a=b");
    }

    #[test]
    fn empty_label_key_is_rejected() {
        assert!(label_selector("=x").is_err());
    }

    #[test]
    fn field_selector_requires_values() {
        assert_eq!(
            field_selector("status.phase=Running,spec.nodeName=n1").unwrap(),
            "status.phase=Running,spec.nodeName=n1"
        );
        assert!(field_selector("status.phase").is_err());
    }

    #[test]
    fn kinds_parse_from_step_spellings() {
        assert_eq!("serviceacounts".parse(), Ok(ResourceKind::ServiceAccount));
        assert_eq!(
            "persistentVolumeClaims".parse(),
            Ok(ResourceKind::PersistentVolumeClaim)
        );
        assert_eq!("ingress".parse(), Ok(ResourceKind::Ingress));
        assert!("widgets".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn cluster_scoped_kinds() {
        assert!(ResourceKind::Namespace.is_cluster_scoped());
        assert!(ResourceKind::ClusterRole.is_cluster_scoped());
        assert!(!ResourceKind::Pod.is_cluster_scoped());
    }

    #[test]
    fn display_uses_api_kind() {
        assert_eq!(ResourceKind::ConfigMap.to_string(), "ConfigMap");
        assert_eq!(ResourceKind::Ingress.api_resource().plural, "ingresses");
    }
}
