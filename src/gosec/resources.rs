use reqwest::Method;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{error, info, warn};

use super::{
    BodyTemplate, DCOS_BAAS, DCOS_MANAGEMENT, EmptyPolicySnafu, Endpoints, Gosec, PolicyFetchSnafu,
    PolicyIdNotFoundSnafu, PolicyListSnafu, PolicyLookup, PolicyNotFoundSnafu, Resource, Result,
    Scope, WriteFileSnafu, expect_status, strip_whitespace,
};
use crate::{json, rest::Login};

/// Placeholder id for policies absent from the listing, so that the
/// following lookup misses.
const MISSING_POLICY_ID: &str = "thisPolicyDoesNotExistId";

impl Gosec<'_> {
    /// Endpoint of the resource `id` of `kind`. Policies are looked up by
    /// name in their listing first, and addressed by name when the listing
    /// can't be read.
    async fn resource_endpoint(
        &mut self,
        endpoints: &Endpoints,
        kind: Resource,
        item: &str,
        id: &str,
        login: Option<&Login>,
    ) -> Result<String> {
        if !kind.is_policy() {
            return Ok(format!("{item}{id}"));
        }
        let listing = endpoints.policy_listing(kind);
        let policy = match self
            .find_policy(&listing, id, endpoints.is_baas(), login)
            .await?
        {
            PolicyLookup::Found(policy) => policy,
            PolicyLookup::Missing => MISSING_POLICY_ID.to_owned(),
            PolicyLookup::Unlisted => id.to_owned(),
        };
        Ok(format!("{item}{policy}"))
    }

    /// Create a policy, user or group from `body` unless it exists. An
    /// existing policy is replaced unless `only_if_missing` is set.
    pub async fn create_resource(
        &mut self,
        kind: Resource,
        id: &str,
        scope: &Scope,
        endpoint: Option<&str>,
        body: &BodyTemplate,
        only_if_missing: bool,
    ) -> Result<()> {
        self.connect_scope(scope).await?;
        let login = scope.login.as_ref();
        let endpoints = self.endpoints();
        let location = endpoints.locate(kind, endpoint)?;

        let mut body = body.clone();
        if kind == Resource::User
            && !endpoints.is_keos()
            && let Some(management) = self.management_version()
            && crate::version::at_least(management, "1.4")
        {
            warn!(message = "Adding inputSourceType = CUSTOM.", gosec_version = %management);
            body = body.with_field("$.inputSourceType", "CUSTOM");
        }

        let mut replaced = false;
        loop {
            let item = self
                .resource_endpoint(&endpoints, kind, &location.item, id, login)
                .await?;
            if !self.get(&item, login).await?.is(200) {
                let response = self
                    .send_template(Method::POST, &location.create, &body, login)
                    .await?;
                if response.is(409) {
                    warn!(message = "The resource already exists.", resource = %kind, %id);
                } else {
                    expect_status(&response, &[201], &format!("POST {}", location.create))?;
                    info!(message = "Resource created.", resource = %kind, %id);
                }
                return Ok(());
            }

            warn!(message = "Resource already exists.", resource = %kind, %id);
            if kind != Resource::Policy || only_if_missing || replaced {
                return Ok(());
            }
            let response = self.request(Method::DELETE, &item, None, login).await?;
            expect_status(&response, &[200, 204], &format!("DELETE {item}"))?;
            warn!(message = "Policy deleted to be created again.", policy = %id);
            replaced = true;
        }
    }

    /// Delete a policy, collection policy, user or group when it exists.
    pub async fn delete_resource(
        &mut self,
        kind: Resource,
        id: &str,
        scope: &Scope,
        endpoint: Option<&str>,
    ) -> Result<()> {
        self.connect_scope(scope).await?;
        let login = scope.login.as_ref();
        let endpoints = self.endpoints();
        let id = if kind == Resource::Policy || endpoints.is_keos() {
            id.to_owned()
        } else {
            strip_whitespace(id)
        };
        let location = endpoints.locate(kind, endpoint)?;
        let item = self
            .resource_endpoint(&endpoints, kind, &location.item, &id, login)
            .await?;
        if self.delete_if_present(&item, login).await? {
            return Ok(());
        }

        if endpoints.is_keos() && self.uses_stratio_identities().await? {
            let identity = super::stratio_identity(&id);
            if self.delete_if_present(&location.of(&identity), login).await? {
                return Ok(());
            }
            warn!(message = "Resource not found under its stratio identity, so it's not deleted.", resource = %kind, %identity);
            return Ok(());
        }
        warn!(message = "Resource not found, so it's not deleted.", resource = %kind, %id);
        Ok(())
    }

    /// Update an existing policy, user, group or tenant with `body`.
    pub async fn update_resource(
        &mut self,
        kind: Resource,
        id: &str,
        scope: &Scope,
        body: &BodyTemplate,
    ) -> Result<()> {
        self.connect_scope(scope).await?;
        let login = scope.login.as_ref();
        let endpoints = self.endpoints();
        let location = endpoints.locate(kind, None)?;
        let item = self
            .resource_endpoint(&endpoints, kind, &location.item, id, login)
            .await?;

        if !self.get(&item, login).await?.is(200) {
            error!(message = "Resource not found, so it's not updated.", resource = %kind, %id);
            return Ok(());
        }

        let mut body = body.clone();
        if endpoints.is_keos() && self.uses_stratio_identities().await? {
            match kind {
                Resource::User => body = body.with_field("$.username", id),
                Resource::Group => body = body.with_field("$.groupname", id),
                _ => {}
            }
        }
        let method = if kind == Resource::Tenant {
            Method::PATCH
        } else {
            Method::PUT
        };
        let response = self.send_template(method.clone(), &item, &body, login).await?;
        expect_status(&response, &[200, 201, 204], &format!("{method} {item}"))?;
        info!(message = "Resource updated.", resource = %kind, %id);
        Ok(())
    }

    /// Id of the policy called `name`, or of the tag policy when `tag` is
    /// set, saved in the property `variable`.
    pub async fn policy_id(
        &mut self,
        tag: bool,
        name: &str,
        scope: &Scope,
        variable: &str,
    ) -> Result<()> {
        let endpoints = self.endpoints();
        let listing = if tag {
            endpoints.policy_tags()
        } else {
            endpoints.policies()
        };
        self.save_policy_id(&listing, name, scope, variable).await
    }

    /// Id of the domain policy called `name`, saved in `variable`.
    pub async fn domain_policy_id(&mut self, name: &str, scope: &Scope, variable: &str) -> Result<()> {
        let listing = self.endpoints().domain_policies();
        self.save_policy_id(&listing, name, scope, variable).await
    }

    async fn save_policy_id(
        &mut self,
        listing: &str,
        name: &str,
        scope: &Scope,
        variable: &str,
    ) -> Result<()> {
        self.connect_scope(scope).await?;
        let response = self.get(listing, None).await?;
        match response.status {
            200 => {
                let id = json::policy_id_in(&response.body, name, true);
                ensure!(!id.is_empty(), PolicyIdNotFoundSnafu { name });
                self.props.set(variable, id);
                Ok(())
            }
            404 => PolicyListSnafu {
                endpoint: listing,
                status: response.status,
            }
            .fail(),
            status => {
                warn!(message = "Policies could not be listed.", endpoint = %listing, status);
                Ok(())
            }
        }
    }

    /// JSON of the policy (or tag policy) called `name`, saved in the
    /// property `variable` and/or in `file` under the output directory.
    pub async fn policy_json(
        &mut self,
        tag: bool,
        name: &str,
        scope: &Scope,
        variable: Option<&str>,
        file: Option<&str>,
    ) -> Result<()> {
        self.connect_scope(scope).await?;
        let policy = match self.endpoints() {
            Endpoints::Dcos { .. } => self.legacy_policy_json(tag, name).await?,
            endpoints => {
                let (listing, item) = match (&endpoints, tag) {
                    (Endpoints::DcosBaas, true) => (
                        format!("{DCOS_BAAS}/policies"),
                        format!("{DCOS_BAAS}/policy?pid="),
                    ),
                    (_, true) => (
                        endpoints.policy_tags(),
                        format!("{}/policy/tags?pid=", endpoints.management()),
                    ),
                    (_, false) => (
                        endpoints.policies(),
                        format!("{}/policy?pid=", endpoints.management()),
                    ),
                };
                let response = self.get(&listing, None).await?;
                ensure!(
                    response.is(200),
                    PolicyListSnafu {
                        endpoint: listing,
                        status: response.status,
                    }
                );
                let id = json::policy_id_in(&response.body, name, true);
                ensure!(!id.is_empty(), PolicyNotFoundSnafu { name });
                self.fetch_policy(&format!("{item}{id}"), &id).await?
            }
        };
        self.save_policy(name, policy, variable, file).await
    }

    /// Policy JSON from the legacy API, trying the listing endpoints of
    /// Gosec 1.1.1 when the older ones are gone.
    async fn legacy_policy_json(&mut self, tag: bool, name: &str) -> Result<String> {
        let (listing, fallback) = if tag {
            ("api/policy/tag", "api/policies/tags")
        } else {
            ("api/policy", "api/policies")
        };
        let response = self.get(&format!("{DCOS_MANAGEMENT}/{listing}"), None).await?;
        match response.status {
            200 => {
                let id = json::policy_id_in(&response.body, name, false);
                ensure!(!id.is_empty(), PolicyNotFoundSnafu { name });
                self.fetch_policy(&format!("{DCOS_MANAGEMENT}/api/policy/{id}"), &id)
                    .await
            }
            404 => {
                warn!(message = "Policy listing not found; checking the endpoint of Gosec 1.1.1.", endpoint = %listing);
                let response = self
                    .get(&format!("{DCOS_MANAGEMENT}/{fallback}"), None)
                    .await?;
                ensure!(
                    response.is(200),
                    PolicyListSnafu {
                        endpoint: fallback,
                        status: response.status,
                    }
                );
                let id = json::policy_id_in(&response.body, name, false);
                ensure!(!id.is_empty(), PolicyNotFoundSnafu { name });
                self.fetch_policy(&format!("{DCOS_MANAGEMENT}/api/policy?id={id}"), &id)
                    .await
            }
            status => PolicyListSnafu {
                endpoint: listing,
                status,
            }
            .fail(),
        }
    }

    async fn fetch_policy(&mut self, endpoint: &str, id: &str) -> Result<String> {
        let response = self.get(endpoint, None).await?;
        ensure!(
            response.is(200),
            PolicyFetchSnafu {
                id,
                status: response.status,
            }
        );
        Ok(response.body)
    }

    async fn save_policy(
        &mut self,
        name: &str,
        policy: String,
        variable: Option<&str>,
        file: Option<&str>,
    ) -> Result<()> {
        if let Some(file) = file {
            let path = self.settings.output_path(file);
            tokio::fs::write(&path, &policy)
                .await
                .context(WriteFileSnafu { path: &path })?;
            info!(message = "Policy saved.", policy = %name, path = %path.display());
        }
        if let Some(variable) = variable {
            let policy = Some(policy).filter(|policy| !policy.trim().is_empty());
            let policy = policy.context(EmptyPolicySnafu { name })?;
            self.props.set(variable, policy);
        }
        Ok(())
    }
}
