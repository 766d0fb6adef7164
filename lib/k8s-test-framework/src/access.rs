//! Namespaces, service accounts, RBAC and quotas.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        core::v1::{Namespace, ResourceQuota, ResourceQuotaSpec, ServiceAccount},
        rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject},
    },
    apimachinery::pkg::api::resource::Quantity,
};
use kube::{
    Api,
    api::{ObjectMeta, PostParams},
};
use snafu::{OptionExt, ResultExt};
use tracing::{info, warn};

use crate::{ApiSnafu, Framework, InvalidServiceAccountSnafu, Result};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::to_owned).collect()
}

/// A single rule granting `verbs` on `resources`. Without `api_groups` the
/// core group is used.
pub fn policy_rule(resources: &str, verbs: &str, api_groups: Option<&str>) -> PolicyRule {
    PolicyRule {
        api_groups: Some(api_groups.map(split_list).unwrap_or_else(|| vec![String::new()])),
        resources: Some(split_list(resources)),
        verbs: split_list(verbs),
        ..Default::default()
    }
}

/// Split `namespace:name` into a service account subject.
pub fn service_account_subject(value: &str) -> Result<Subject> {
    let (namespace, name) = value
        .split_once(':')
        .filter(|(namespace, name)| !namespace.is_empty() && !name.is_empty())
        .context(InvalidServiceAccountSnafu { value })?;
    Ok(Subject {
        kind: "ServiceAccount".to_owned(),
        name: name.to_owned(),
        namespace: Some(namespace.to_owned()),
        api_group: None,
    })
}

/// Hard limits of a resource quota.
#[derive(Clone, Debug, Default)]
pub struct QuotaLimits {
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub pods: Option<String>,
}

impl QuotaLimits {
    fn hard(&self) -> BTreeMap<String, Quantity> {
        [("cpu", &self.cpu), ("memory", &self.memory), ("pods", &self.pods)]
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|value| (key.to_owned(), Quantity(value.clone())))
            })
            .collect()
    }
}

fn named(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: namespace.map(str::to_owned),
        ..Default::default()
    }
}

impl Framework {
    /// Create a namespace, only warning if it already exists.
    pub async fn create_namespace(
        &self,
        name: &str,
        labels: Option<BTreeMap<String, String>>,
    ) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client());
        let existing = api.get_opt(name).await.context(ApiSnafu {
            action: format!("get namespace {name}"),
        })?;
        if existing.is_some() {
            warn!(message = "Namespace already exists.", %name);
            return Ok(());
        }
        let namespace = Namespace {
            metadata: ObjectMeta {
                labels,
                ..named(name, None)
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &namespace)
            .await
            .context(ApiSnafu {
                action: format!("create namespace {name}"),
            })?;
        info!(message = "Namespace created.", %name);
        Ok(())
    }

    pub async fn create_service_account(&self, name: &str, namespace: &str) -> Result<()> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client(), namespace);
        let account = ServiceAccount {
            metadata: named(name, Some(namespace)),
            ..Default::default()
        };
        self.apply_object(&api, name, &account).await?;
        Ok(())
    }

    pub async fn create_role(
        &self,
        name: &str,
        namespace: &str,
        resources: &str,
        verbs: &str,
        api_groups: Option<&str>,
    ) -> Result<()> {
        let api: Api<Role> = Api::namespaced(self.client(), namespace);
        let role = Role {
            metadata: named(name, Some(namespace)),
            rules: Some(vec![policy_rule(resources, verbs, api_groups)]),
        };
        self.apply_object(&api, name, &role).await?;
        Ok(())
    }

    pub async fn create_cluster_role(
        &self,
        name: &str,
        resources: &str,
        verbs: &str,
        api_groups: Option<&str>,
    ) -> Result<()> {
        let api: Api<ClusterRole> = Api::all(self.client());
        let role = ClusterRole {
            metadata: named(name, None),
            rules: Some(vec![policy_rule(resources, verbs, api_groups)]),
            ..Default::default()
        };
        self.apply_object(&api, name, &role).await?;
        Ok(())
    }

    /// Bind `role` to a `namespace:name` service account. The binding lives
    /// in the service account's namespace.
    pub async fn create_role_binding(&self, name: &str, role: &str, service_account: &str) -> Result<()> {
        let subject = service_account_subject(service_account)?;
        let namespace = subject.namespace.clone().unwrap_or_default();
        let api: Api<RoleBinding> = Api::namespaced(self.client(), &namespace);
        let binding = RoleBinding {
            metadata: named(name, Some(&namespace)),
            role_ref: RoleRef {
                api_group: RBAC_GROUP.to_owned(),
                kind: "Role".to_owned(),
                name: role.to_owned(),
            },
            subjects: Some(vec![subject]),
        };
        self.apply_object(&api, name, &binding).await?;
        Ok(())
    }

    pub async fn create_cluster_role_binding(
        &self,
        name: &str,
        cluster_role: &str,
        service_account: &str,
    ) -> Result<()> {
        let subject = service_account_subject(service_account)?;
        let api: Api<ClusterRoleBinding> = Api::all(self.client());
        let binding = ClusterRoleBinding {
            metadata: named(name, None),
            role_ref: RoleRef {
                api_group: RBAC_GROUP.to_owned(),
                kind: "ClusterRole".to_owned(),
                name: cluster_role.to_owned(),
            },
            subjects: Some(vec![subject]),
        };
        self.apply_object(&api, name, &binding).await?;
        Ok(())
    }

    pub async fn create_resource_quota(
        &self,
        name: &str,
        namespace: &str,
        limits: &QuotaLimits,
    ) -> Result<()> {
        let api: Api<ResourceQuota> = Api::namespaced(self.client(), namespace);
        let quota = ResourceQuota {
            metadata: named(name, Some(namespace)),
            spec: Some(ResourceQuotaSpec {
                hard: Some(limits.hard()),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.apply_object(&api, name, &quota).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_defaults_to_core_group() {
        let rule = policy_rule("pods,services", "get,list", None);
        assert_eq!(rule.api_groups, Some(vec![String::new()]));
        assert_eq!(rule.resources, Some(vec!["pods".to_owned(), "services".to_owned()]));
        assert_eq!(rule.verbs, vec!["get".to_owned(), "list".to_owned()]);
    }

    #[test]
    fn subject_from_namespace_and_name() {
        let subject = service_account_subject("keos-ops:operator").unwrap();
        assert_eq!(subject.name, "operator");
        assert_eq!(subject.namespace.as_deref(), Some("keos-ops"));
        assert!(service_account_subject("operator").is_err());
    }

    #[test]
    fn quota_only_sets_given_limits() {
        let limits = QuotaLimits {
            cpu: Some("2".into()),
            pods: Some("10".into()),
            ..Default::default()
        };
        let hard = limits.hard();
        assert_eq!(hard.len(), 2);
        assert_eq!(hard.get("pods"), Some(&Quantity("10".into())));
    }
}
