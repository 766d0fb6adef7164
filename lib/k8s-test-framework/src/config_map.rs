use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    Api,
    api::{ObjectMeta, PostParams},
};
use snafu::{OptionExt, ResultExt};
use tracing::info;

use crate::{ApiSnafu, Framework, NotFoundSnafu, Result};

impl Framework {
    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client(), namespace)
    }

    pub async fn config_map(&self, name: &str, namespace: &str) -> Result<Option<ConfigMap>> {
        self.config_maps(namespace)
            .get_opt(name)
            .await
            .context(ApiSnafu {
                action: format!("get configmap {name}"),
            })
    }

    /// Create the config map, or replace all of its data if it exists.
    pub async fn create_or_replace_config_map(
        &self,
        name: &str,
        namespace: &str,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        let api = self.config_maps(namespace);
        let existing = self.config_map(name, namespace).await?;
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                resource_version: existing
                    .as_ref()
                    .and_then(|current| current.metadata.resource_version.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        let result = match existing {
            Some(_) => api.replace(name, &PostParams::default(), &config_map).await,
            None => api.create(&PostParams::default(), &config_map).await,
        };
        result.context(ApiSnafu {
            action: format!("write configmap {name}"),
        })?;
        info!(message = "Configmap written.", %name, %namespace);
        Ok(())
    }

    /// Add or overwrite keys of an existing config map.
    pub async fn add_config_map_values(
        &self,
        name: &str,
        namespace: &str,
        values: BTreeMap<String, String>,
    ) -> Result<()> {
        let mut config_map = self
            .config_map(name, namespace)
            .await?
            .context(NotFoundSnafu {
                kind: format!("configmap {name}"),
            })?;
        config_map
            .data
            .get_or_insert_with(BTreeMap::new)
            .extend(values);
        self.config_maps(namespace)
            .replace(name, &PostParams::default(), &config_map)
            .await
            .context(ApiSnafu {
                action: format!("update configmap {name}"),
            })?;
        Ok(())
    }

    /// Value of `key`, or `None` when the key is absent.
    pub async fn config_map_key(&self, name: &str, namespace: &str, key: &str) -> Result<Option<String>> {
        let config_map = self
            .config_map(name, namespace)
            .await?
            .context(NotFoundSnafu {
                kind: format!("configmap {name}"),
            })?;
        Ok(config_map.data.and_then(|mut data| data.remove(key)))
    }
}
