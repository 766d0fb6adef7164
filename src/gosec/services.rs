use std::{fmt, str::FromStr, time::Duration};

use reqwest::Method;
use serde_json::{Value, json};
use snafu::{OptionExt, ensure};
use tracing::{info, warn};

use super::{
    AssetAlgorithmSnafu, Gosec, GosecError, KeyNotFoundSnafu, Result, Scope, ServiceListSnafu,
    UnknownResourceSnafu, expect_status, response_json,
};
use crate::{json, rest::Login};

/// Cipher of an encryption asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Aes256,
    Chacha256,
}

impl FromStr for Algorithm {
    type Err = GosecError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aes256" => Ok(Self::Aes256),
            "chacha256" => Ok(Self::Chacha256),
            _ => UnknownResourceSnafu { resource: s }.fail(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Aes256 => "aes256",
            Self::Chacha256 => "chacha256",
        })
    }
}

/// Scope of an LDAP synchronisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncType {
    Partial,
    Total,
}

impl FromStr for SyncType {
    type Err = GosecError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "partial" => Ok(Self::Partial),
            "total" => Ok(Self::Total),
            _ => UnknownResourceSnafu { resource: s }.fail(),
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Partial => "partial",
            Self::Total => "total",
        })
    }
}

fn array<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn has_str(value: &Value, key: &str, expected: &str) -> bool {
    value.get(key).and_then(Value::as_str) == Some(expected)
}

/// Versions of the `service_type` services that run an instance called `id`,
/// from a management BaaS service listing.
pub fn baas_service_version(doc: &Value, service_type: &str, id: &str) -> Vec<String> {
    doc.as_array()
        .into_iter()
        .flatten()
        .filter(|service| has_str(service, "serviceType", service_type))
        .flat_map(|service| array(service, "versionList"))
        .filter(|version| array(version, "serviceList").any(|s| has_str(s, "name", id)))
        .filter_map(|version| version.get("version").map(json::scalar_to_string))
        .collect()
}

/// Versions of the `service_type` plugins with a ready instance called `id`,
/// from a legacy `gosecmanagement` service listing.
pub fn management_service_version(doc: &Value, service_type: &str, id: &str) -> Vec<String> {
    doc.as_array()
        .into_iter()
        .flatten()
        .filter(|service| has_str(service, "type", service_type))
        .flat_map(|service| array(service, "pluginList"))
        .filter(|plugin| {
            array(plugin, "instanceList")
                .any(|instance| has_str(instance, "name", id) && has_str(instance, "status", "READY"))
        })
        .filter_map(|plugin| plugin.get("version").map(json::scalar_to_string))
        .collect()
}

impl Gosec<'_> {
    /// Version of the service instance `id` of `service_type` registered in
    /// Gosec, saved in `variable`. Several matches are saved one per line.
    pub async fn service_version(
        &mut self,
        service_type: &str,
        id: &str,
        scope: &Scope,
        variable: &str,
    ) -> Result<()> {
        self.connect_scope(scope).await?;
        let endpoints = self.endpoints();
        let endpoint = endpoints.services();
        let response = self.get(&endpoint, scope.login.as_ref()).await?;
        ensure!(
            response.is(200),
            ServiceListSnafu {
                endpoint: &endpoint,
                status: response.status,
            }
        );

        let versions = if endpoints.is_baas() {
            baas_service_version(&response_json(&response, &endpoint)?, service_type, id)
        } else if self
            .management_version()
            .is_some_and(|management| management.starts_with('0'))
        {
            vec!["N/A".to_owned()]
        } else {
            management_service_version(&response_json(&response, &endpoint)?, service_type, id)
        };
        let version = versions.join("\n");
        info!(message = "Service version obtained.", %service_type, %id, %version);
        self.props.set(variable, version);
        Ok(())
    }

    /// Create the encryption key `name` in `tenant`, with `value` as key
    /// material when given.
    pub async fn create_key(
        &mut self,
        name: &str,
        value: Option<&str>,
        tenant: &str,
        login: &Login,
        only_if_missing: bool,
    ) -> Result<()> {
        self.connect(Some(tenant), Some(login)).await?;
        let endpoint = format!("{}/encryption/key", self.endpoints().management());
        let mut key = json!({ "name": name, "assets": [] });
        if let Some(value) = value {
            key["value"] = Value::from(value);
        }

        let response = self.send_json(Method::POST, &endpoint, &key).await?;
        if only_if_missing && (response.is(409) || response.is(412)) {
            warn!(message = "Key existed previously.", key = %name);
            return Ok(());
        }
        expect_status(&response, &[200], &format!("POST {endpoint}"))?;
        info!(message = "Key created.", key = %name, %tenant);
        Ok(())
    }

    /// Create the encryption asset `name` ciphered with the key `key`.
    pub async fn create_asset(
        &mut self,
        name: &str,
        key: &str,
        algorithm: Algorithm,
        tenant: &str,
        login: &Login,
        only_if_missing: bool,
    ) -> Result<()> {
        self.connect(Some(tenant), Some(login)).await?;
        let encryption = format!("{}/encryption", self.endpoints().management());

        let keys = format!("{encryption}/keys");
        let response = self.get(&keys, None).await?;
        expect_status(&response, &[200], &format!("GET {keys}"))?;
        let key_doc = array(&response_json(&response, &keys)?, "list")
            .find(|entry| has_str(entry, "name", key))
            .cloned()
            .context(KeyNotFoundSnafu { name: key })?;

        let endpoint = format!("{encryption}/asset");
        let asset = json!({
            "name": name,
            "algorithm": algorithm.to_string(),
            "key": key_doc,
        });
        let response = self.send_json(Method::POST, &endpoint, &asset).await?;
        if only_if_missing && response.is(409) {
            let assets = format!("{encryption}/assets?from=0&count=10000&orderBy=name&order=asc");
            let response = self.get(&assets, None).await?;
            expect_status(&response, &[200], &format!("GET {assets}"))?;
            let listed = response_json(&response, &assets)?;
            let current = json::select_field(&listed, Some("list"), "name", name, "algorithm")
                .map(json::scalar_to_string)
                .unwrap_or_default();
            ensure!(
                current == algorithm.to_string(),
                AssetAlgorithmSnafu {
                    expected: algorithm.to_string(),
                    current,
                }
            );
            warn!(message = "Asset existed previously.", asset = %name);
            return Ok(());
        }
        expect_status(&response, &[201], &format!("POST {endpoint}"))?;
        info!(message = "Asset created.", asset = %name, %key, %algorithm);
        Ok(())
    }

    /// Ask the management BaaS to synchronise identities from LDAP.
    pub async fn run_ldap_synchronizer(&mut self, sync: SyncType) -> Result<()> {
        self.connect(None, None).await?;
        let endpoint = format!("{}/ldap/synchronize", self.endpoints().management());
        let response = self
            .send_json(Method::POST, &endpoint, &json!({ "type": sync.to_string() }))
            .await?;
        expect_status(&response, &[201], &format!("POST {endpoint}"))?;
        info!(message = "LDAP synchronisation launched.", %sync);
        Ok(())
    }

    /// Launch an LDAP synchronisation, trying again up to `retries` times
    /// while it is rejected.
    pub async fn run_ldap_synchronizer_with_retries(
        &mut self,
        sync: SyncType,
        retries: usize,
        interval: Duration,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.run_ldap_synchronizer(sync).await {
                Err(error) if attempt < retries => {
                    attempt += 1;
                    warn!(message = "LDAP synchronisation failed; retrying.", %error, attempt, retries);
                    tokio::time::sleep(interval).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn baas_versions() {
        let services = json!([
            {
                "serviceType": "community",
                "versionList": [
                    {"version": "1.0.0", "serviceList": [{"name": "postgres"}]},
                    {"version": "2.1.0", "serviceList": [{"name": "pg-2"}, {"name": "postgres"}]},
                    {"version": "3.0.0", "serviceList": []}
                ]
            },
            {
                "serviceType": "hdfs",
                "versionList": [{"version": "9.9.9", "serviceList": [{"name": "postgres"}]}]
            }
        ]);
        assert_eq!(
            baas_service_version(&services, "community", "postgres"),
            vec!["1.0.0", "2.1.0"]
        );
        assert!(baas_service_version(&services, "community", "missing").is_empty());
        assert!(baas_service_version(&json!({}), "community", "postgres").is_empty());
    }

    #[test]
    fn management_versions() {
        let services = json!([{
            "type": "postgres",
            "pluginList": [
                {"version": "1.2", "instanceList": [{"name": "pg", "status": "READY"}]},
                {"version": "1.3", "instanceList": [{"name": "pg", "status": "STOPPED"}]}
            ]
        }]);
        assert_eq!(management_service_version(&services, "postgres", "pg"), vec!["1.2"]);
        assert!(management_service_version(&services, "hdfs", "pg").is_empty());
    }

    #[test]
    fn names() {
        assert_eq!("chacha256".parse::<Algorithm>().unwrap(), Algorithm::Chacha256);
        assert!("des".parse::<Algorithm>().is_err());
        assert_eq!(SyncType::Total.to_string(), "total");
        assert_eq!("partial".parse::<SyncType>().unwrap(), SyncType::Partial);
    }
}
