//! Custom resources addressed through their CustomResourceDefinition name,
//! e.g. `pgclusters.postgres.stratio.com`.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    Api,
    api::{DeleteParams, DynamicObject, ListParams, PostParams},
    core::ApiResource,
};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, warn};

use crate::{
    ApiSnafu, CrdNotFoundSnafu, Framework, NotFoundSnafu, PatchSnafu, Result,
    patch::{self, FieldPatch},
};

/// Type information of the custom resource kind a CRD defines.
pub fn definition_resource(crd: &CustomResourceDefinition) -> ApiResource {
    let spec = &crd.spec;
    let version = spec
        .versions
        .iter()
        .find(|v| v.storage)
        .or_else(|| spec.versions.iter().find(|v| v.served))
        .or_else(|| spec.versions.first())
        .map(|v| v.name.clone())
        .unwrap_or_default();
    let api_version = if spec.group.is_empty() {
        version.clone()
    } else {
        format!("{}/{}", spec.group, version)
    };
    ApiResource {
        group: spec.group.clone(),
        version,
        api_version,
        kind: spec.names.kind.clone(),
        plural: spec.names.plural.clone(),
    }
}

/// Follow `path` (a sequence of object keys) inside `value`.
fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Framework {
    /// Dynamic API over the resources of the CRD called `crd` in `namespace`.
    pub async fn custom_resource_api(&self, crd: &str, namespace: &str) -> Result<Api<DynamicObject>> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client());
        let definition = crds
            .get_opt(crd)
            .await
            .context(ApiSnafu {
                action: format!("get customresourcedefinition {crd}"),
            })?
            .context(CrdNotFoundSnafu { name: crd })?;
        let resource = definition_resource(&definition);
        let namespaced = definition.spec.scope == "Namespaced";
        Ok(self.dynamic_api(&resource, namespaced.then_some(namespace)))
    }

    /// Names of every resource of the CRD in `namespace`, one per line.
    pub async fn list_custom_resources(&self, crd: &str, namespace: &str) -> Result<String> {
        let list = self
            .custom_resource_api(crd, namespace)
            .await?
            .list(&ListParams::default())
            .await
            .context(ApiSnafu {
                action: format!("list {crd}"),
            })?;
        Ok(list
            .items
            .iter()
            .filter_map(|item| item.metadata.name.as_deref())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// One custom resource, or `None` if there is no such item.
    pub async fn get_custom_resource(
        &self,
        crd: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DynamicObject>> {
        self.custom_resource_api(crd, namespace)
            .await?
            .get_opt(name)
            .await
            .context(ApiSnafu {
                action: format!("get {crd} {name}"),
            })
    }

    /// The custom resource as a JSON document.
    pub async fn describe_custom_resource(
        &self,
        crd: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Value> {
        let object = self
            .get_custom_resource(crd, name, namespace)
            .await?
            .context(NotFoundSnafu {
                kind: format!("{crd} {name}"),
            })?;
        serde_json::to_value(&object).context(crate::SerializeJsonSnafu)
    }

    pub async fn delete_custom_resource(&self, crd: &str, name: &str, namespace: &str) -> Result<()> {
        self.custom_resource_api(crd, namespace)
            .await?
            .delete(name, &DeleteParams::default())
            .await
            .context(ApiSnafu {
                action: format!("delete {crd} {name}"),
            })?;
        Ok(())
    }

    /// Ready instances from `status.readyInstances` (`"ready/total"`), zero
    /// when the resource does not exist.
    pub async fn custom_resource_ready_replicas(
        &self,
        crd: &str,
        name: &str,
        namespace: &str,
    ) -> Result<i64> {
        let Some(object) = self.get_custom_resource(crd, name, namespace).await? else {
            return Ok(0);
        };
        let ready = lookup(&object.data, &["status", "readyInstances"]).context(
            crate::MissingFieldSnafu {
                name,
                field: "status.readyInstances",
            },
        )?;
        let ready = text(ready);
        ready
            .split('/')
            .next()
            .and_then(|count| count.trim().parse().ok())
            .context(crate::MissingFieldSnafu {
                name,
                field: "status.readyInstances",
            })
    }

    /// `status.globalStatus.status` and `status.globalStatus.description`, empty
    /// when the resource does not exist.
    pub async fn custom_resource_global_status(
        &self,
        crd: &str,
        name: &str,
        namespace: &str,
    ) -> Result<(String, String)> {
        let Some(object) = self.get_custom_resource(crd, name, namespace).await? else {
            return Ok(Default::default());
        };
        let global = lookup(&object.data, &["status", "globalStatus"]).context(
            crate::MissingFieldSnafu {
                name,
                field: "status.globalStatus",
            },
        )?;
        let status = global.get("status").map(text).unwrap_or_default();
        let description = global.get("description").map(text).unwrap_or_default();
        Ok((status, description))
    }

    /// Apply `patches` to a custom resource and replace it. Returns the exit
    /// status of the operation: 0 when the replace succeeded, 1 otherwise.
    pub async fn patch_custom_resource(
        &self,
        crd: &str,
        name: &str,
        namespace: &str,
        patches: &[FieldPatch],
    ) -> Result<i32> {
        let api = self.custom_resource_api(crd, namespace).await?;
        let Some(mut object) = api.get_opt(name).await.context(ApiSnafu {
            action: format!("get {crd} {name}"),
        })?
        else {
            warn!(message = "Custom resource to patch not found.", %crd, %name, %namespace);
            return Ok(1);
        };

        for field in patches {
            patch::apply(&mut object.data, field).context(PatchSnafu)?;
        }

        match api.replace(name, &PostParams::default(), &object).await {
            Ok(_) => {
                debug!(message = "Patched.", %crd, %name);
                Ok(0)
            }
            Err(error) => {
                warn!(message = "Error in custom resource patch.", %crd, %name, %error);
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
        CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
        CustomResourceDefinitionVersion,
    };
    use serde_json::json;

    use super::*;

    fn version(name: &str, served: bool, storage: bool) -> CustomResourceDefinitionVersion {
        CustomResourceDefinitionVersion {
            name: name.into(),
            served,
            storage,
            ..Default::default()
        }
    }

    #[test]
    fn resource_uses_storage_version() {
        let crd = CustomResourceDefinition {
            spec: CustomResourceDefinitionSpec {
                group: "postgres.stratio.com".into(),
                names: CustomResourceDefinitionNames {
                    kind: "PgCluster".into(),
                    plural: "pgclusters".into(),
                    ..Default::default()
                },
                scope: "Namespaced".into(),
                versions: vec![version("v1beta1", true, false), version("v1", true, true)],
                ..Default::default()
            },
            ..Default::default()
        };
        let resource = definition_resource(&crd);
        assert_eq!(resource.api_version, "postgres.stratio.com/v1");
        assert_eq!(resource.plural, "pgclusters");
        assert_eq!(resource.kind, "PgCluster");
    }

    #[test]
    fn lookup_nested_status() {
        let data = json!({"status": {"readyInstances": "2/3"}});
        assert_eq!(
            lookup(&data, &["status", "readyInstances"]).map(text),
            Some("2/3".to_owned())
        );
        assert_eq!(lookup(&data, &["status", "globalStatus"]), None);
    }
}
