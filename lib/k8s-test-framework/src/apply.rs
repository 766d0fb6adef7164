//! Create-or-replace of objects, from typed values and from manifest files.

use std::{fmt::Debug, path::Path};

use kube::{
    Api, Resource,
    api::{DynamicObject, Patch, PatchParams},
    core::{ApiResource, GroupVersionKind},
    discovery::{self, Scope},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt};
use tracing::info;

use crate::{ApiSnafu, Framework, IoSnafu, ManifestTypeSnafu, ParseManifestSnafu, Result};

/// Field manager recorded on objects this crate applies.
pub const FIELD_MANAGER: &str = "bdt";

/// Explicit type information for a custom resource whose definition is not
/// looked up on the cluster.
#[derive(Clone, Debug)]
pub struct CustomResourceDefinitionContext {
    pub version: String,
    pub plural: String,
    pub kind: String,
    pub name: String,
    pub scope: String,
    pub group: String,
}

impl CustomResourceDefinitionContext {
    fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: if self.group.is_empty() {
                self.version.clone()
            } else {
                format!("{}/{}", self.group, self.version)
            },
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }

    fn is_namespaced(&self) -> bool {
        self.scope.eq_ignore_ascii_case("namespaced")
    }
}

/// Split a YAML or JSON manifest into its non-empty documents.
pub fn parse_manifest(text: &str, path: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document).context(ParseManifestSnafu { path })?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject =
            serde_yaml::from_value(value).context(ParseManifestSnafu { path })?;
        objects.push(object);
    }
    Ok(objects)
}

async fn read_manifest(path: &Path) -> Result<(String, String)> {
    let display = path.display().to_string();
    let text = tokio::fs::read_to_string(path)
        .await
        .context(IoSnafu { path: &display })?;
    Ok((display, text))
}

impl Framework {
    /// Server-side apply a typed object, taking ownership of conflicting
    /// fields.
    pub(crate) async fn apply_object<K>(&self, api: &Api<K>, name: &str, object: &K) -> Result<K>
    where
        K: Resource + Clone + Debug + Serialize + DeserializeOwned,
    {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &params, &Patch::Apply(object))
            .await
            .context(ApiSnafu {
                action: format!("apply {name}"),
            })
    }

    /// Apply every object of a manifest file into `namespace`.
    pub async fn apply_file(&self, path: impl AsRef<Path>, namespace: &str) -> Result<()> {
        let (display, text) = read_manifest(path.as_ref()).await?;
        for mut object in parse_manifest(&text, &display)? {
            let types = object
                .types
                .clone()
                .context(ManifestTypeSnafu { path: &display })?;
            let gvk = GroupVersionKind::try_from(&types)
                .ok()
                .context(ManifestTypeSnafu { path: &display })?;
            let (resource, capabilities) = discovery::pinned_kind(&self.client(), &gvk)
                .await
                .context(ApiSnafu {
                    action: format!("discover {}", types.kind),
                })?;
            let name = object
                .metadata
                .name
                .clone()
                .context(ManifestTypeSnafu { path: &display })?;

            let api = if capabilities.scope == Scope::Namespaced {
                object.metadata.namespace = Some(namespace.to_owned());
                self.dynamic_api(&resource, Some(namespace))
            } else {
                self.dynamic_api(&resource, None)
            };
            self.apply_object(&api, &name, &object).await?;
            info!(message = "Applied object.", kind = %types.kind, %name, %namespace);
        }
        Ok(())
    }

    /// Apply the custom resource in a manifest file, typed by `definition`.
    pub async fn apply_custom_resource_file(
        &self,
        path: impl AsRef<Path>,
        namespace: &str,
        definition: &CustomResourceDefinitionContext,
    ) -> Result<()> {
        let (display, text) = read_manifest(path.as_ref()).await?;
        let resource = definition.api_resource();
        let namespaced = definition.is_namespaced();
        for mut object in parse_manifest(&text, &display)? {
            let name = object
                .metadata
                .name
                .clone()
                .context(ManifestTypeSnafu { path: &display })?;
            if namespaced {
                object.metadata.namespace = Some(namespace.to_owned());
            }
            object.types.get_or_insert_with(|| kube::core::TypeMeta {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
            let api = self.dynamic_api(&resource, namespaced.then_some(namespace));
            self.apply_object(&api, &name, &object).await?;
            info!(message = "Applied custom resource.", definition = %definition.name, %name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn multi_document_manifest() {
        let text = indoc! {"
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: first
            data:
              key: value
            ---
            ---
            apiVersion: apps/v1
            kind: Deployment
            metadata:
              name: second
            spec:
              replicas: 2
        "};
        let objects = parse_manifest(text, "test.yaml").unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].metadata.name.as_deref(), Some("first"));
        assert_eq!(objects[1].types.as_ref().map(|t| t.kind.as_str()), Some("Deployment"));
        assert_eq!(objects[1].data["spec"]["replicas"], 2);
    }

    #[test]
    fn json_manifest() {
        let text = r#"{"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "s"}}"#;
        let objects = parse_manifest(text, "test.json").unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn definition_context_api_version() {
        let definition = CustomResourceDefinitionContext {
            version: "v1".into(),
            plural: "pgclusters".into(),
            kind: "PgCluster".into(),
            name: "pgclusters.postgres.stratio.com".into(),
            scope: "Namespaced".into(),
            group: "postgres.stratio.com".into(),
        };
        assert_eq!(definition.api_resource().api_version, "postgres.stratio.com/v1");
        assert!(definition.is_namespaced());
    }
}
