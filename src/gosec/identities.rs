use reqwest::Method;
use serde_json::{Map, Value, json};
use snafu::{OptionExt, ensure};
use tracing::{debug, error, info, warn};

use super::{
    BodyTemplate, DCOS_BAAS, DCOS_IDENTITIES, DCOS_MANAGEMENT, Endpoints, Gosec, GroupFetchSnafu,
    Identity, IdentityListSnafu, KEOS_BAAS, ManagementUnavailableSnafu, ProfileFetchSnafu,
    ProfileGroupSnafu, ProfileIdNotFoundSnafu, Result, Scope, TenantInfoSnafu,
    TenantMembershipSnafu, UnknownIdentitySnafu, expect_status, post_endpoint, response_json,
    strip_whitespace,
};
use crate::{json, version};

/// Options of a generated user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserOptions {
    /// `system` rather than `custom` user.
    pub system: bool,
    pub keytab: bool,
    pub certificate: bool,
    pub groups: Vec<String>,
}

/// Options of a generated group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupOptions {
    /// `system` rather than `custom` group.
    pub system: bool,
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

fn source_type(system: bool) -> &'static str {
    if system { "System" } else { "Custom" }
}

fn legacy_source(object: &mut Map<String, Value>, source_type: bool) {
    if source_type {
        object.insert("inputSourceType".to_owned(), json!("CUSTOM"));
    } else {
        object.insert("custom".to_owned(), json!("true"));
    }
}

fn id_objects(key: &str, ids: &[String]) -> Value {
    ids.iter().map(|id| json!({ key: id })).collect()
}

/// User for the legacy management API. Gosec 1.4 onwards expects
/// `inputSourceType` instead of the `custom` flag.
pub fn management_user_json(uid: &str, name: &str, options: &UserOptions, source_type: bool) -> Value {
    let mut user = Map::new();
    user.insert("id".to_owned(), json!(uid));
    user.insert("name".to_owned(), json!(name));
    user.insert("email".to_owned(), json!(format!("{uid}@stratio.com")));
    user.insert("groups".to_owned(), json!(options.groups));
    legacy_source(&mut user, source_type);
    if options.keytab {
        user.insert("keytab".to_owned(), json!(true));
    }
    if options.certificate {
        user.insert("certificate".to_owned(), json!(true));
    }
    Value::Object(user)
}

/// User for the management BaaS. `enable` is understood from 1.4 and
/// `username` from 2.0.
pub fn baas_user_json(
    uid: &str,
    name: &str,
    options: &UserOptions,
    enable: bool,
    username: bool,
) -> Value {
    let mut user = Map::new();
    user.insert("uid".to_owned(), json!(uid));
    user.insert("name".to_owned(), json!(name));
    user.insert("email".to_owned(), json!(format!("{uid}@stratio.com")));
    user.insert("inputSourceType".to_owned(), json!(source_type(options.system)));
    user.insert("groups".to_owned(), id_objects("gid", &options.groups));
    if options.keytab {
        user.insert("keytab".to_owned(), json!(true));
    }
    if options.certificate {
        user.insert("certificate".to_owned(), json!(true));
    }
    if enable {
        user.insert("enable".to_owned(), json!(true));
    }
    if username {
        user.insert("username".to_owned(), json!(uid));
    }
    Value::Object(user)
}

pub fn management_group_json(gid: &str, name: &str, options: &GroupOptions, source_type: bool) -> Value {
    let mut group = Map::new();
    group.insert("id".to_owned(), json!(gid));
    group.insert("name".to_owned(), json!(name));
    group.insert("users".to_owned(), json!(options.users));
    group.insert("groups".to_owned(), json!(options.groups));
    legacy_source(&mut group, source_type);
    Value::Object(group)
}

/// Group for the management BaaS; `groupname` is understood from 2.0.
pub fn baas_group_json(gid: &str, name: &str, options: &GroupOptions, groupname: bool) -> Value {
    let mut group = Map::new();
    group.insert("gid".to_owned(), json!(gid));
    group.insert("name".to_owned(), json!(name));
    group.insert("inputSourceType".to_owned(), json!(source_type(options.system)));
    group.insert("users".to_owned(), id_objects("uid", &options.users));
    group.insert("groups".to_owned(), id_objects("gid", &options.groups));
    if groupname {
        group.insert("groupname".to_owned(), json!(gid));
    }
    Value::Object(group)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Membership {
    Include,
    Remove,
}

impl Gosec<'_> {
    /// Create tenant `id` from `body` unless it exists.
    pub async fn create_tenant(&mut self, id: &str, body: &BodyTemplate) -> Result<()> {
        self.connect(None, None).await?;
        let tenants = self.endpoints().tenants();
        if self.get(&format!("{tenants}/{id}"), None).await?.is(200) {
            warn!(message = "Tenant already exists, not created.", tenant = %id);
            return Ok(());
        }
        let response = self.send_template(Method::POST, &tenants, body, None).await?;
        expect_status(&response, &[201], &format!("POST {tenants}"))?;
        info!(message = "Tenant created.", tenant = %id);
        Ok(())
    }

    pub async fn delete_tenant(&mut self, id: &str) -> Result<()> {
        self.connect(None, None).await?;
        let tenant = format!("{}/{id}", self.endpoints().tenants());
        if !self.get(&tenant, None).await?.is(200) {
            warn!(message = "Tenant does not exist, not deleted.", tenant = %id);
            return Ok(());
        }
        let response = self.request(Method::DELETE, &tenant, None, None).await?;
        expect_status(&response, &[204], &format!("DELETE {tenant}"))?;
        info!(message = "Tenant deleted.", tenant = %id);
        Ok(())
    }

    pub async fn include_in_tenant(&mut self, identity: Identity, id: &str, tenant: &str) -> Result<()> {
        self.tenant_membership(Membership::Include, identity, id, tenant)
            .await
    }

    pub async fn remove_from_tenant(&mut self, identity: Identity, id: &str, tenant: &str) -> Result<()> {
        self.tenant_membership(Membership::Remove, identity, id, tenant)
            .await
    }

    /// Id under which `identity` `id` is registered: the id itself, or on
    /// Keos with management BaaS 2.0 its stratio identity.
    pub(super) async fn registered_identity(
        &mut self,
        identity: Identity,
        id: &str,
        listing: &str,
    ) -> Result<String> {
        let response = self.get(listing, None).await?;
        ensure!(
            response.is(200),
            IdentityListSnafu {
                resource: identity,
                status: response.status,
            }
        );
        let listed = response_json(&response, listing)?;
        if json::contains_id(&listed, identity.id_key(), id) {
            return Ok(id.to_owned());
        }
        ensure!(
            self.props.is_keos() && self.uses_stratio_identities().await?,
            UnknownIdentitySnafu { resource: identity, id }
        );
        let stratio = super::stratio_identity(id);
        ensure!(
            json::contains_id(&listed, identity.id_key(), &stratio),
            UnknownIdentitySnafu {
                resource: identity,
                id: &stratio,
            }
        );
        debug!(message = "Using stratio identity.", %id, identity = %stratio);
        Ok(stratio)
    }

    async fn tenant_membership(
        &mut self,
        membership: Membership,
        identity: Identity,
        id: &str,
        tenant: &str,
    ) -> Result<()> {
        self.connect(None, None).await?;
        let keos = self.props.is_keos();
        let (listing, tenant_endpoint, method, expected) = if keos {
            (
                format!("{KEOS_BAAS}/{}", identity.plural()),
                format!("{KEOS_BAAS}/tenant?tid={tenant}"),
                Method::PUT,
                200,
            )
        } else {
            let expected = match membership {
                Membership::Include => 204,
                Membership::Remove => 200,
            };
            (
                format!("{DCOS_IDENTITIES}/{}", identity.plural()),
                format!("{DCOS_IDENTITIES}/tenants/{tenant}"),
                Method::PATCH,
                expected,
            )
        };

        let id = self.registered_identity(identity, id, &listing).await?;
        let response = self.get(&tenant_endpoint, None).await?;
        ensure!(
            response.is(200),
            TenantInfoSnafu {
                tenant,
                status: response.status,
            }
        );
        let mut info = response_json(&response, &tenant_endpoint)?;
        let Some(members) = info
            .as_object_mut()
            .map(|info| info.entry(identity.ids_key()).or_insert_with(|| json!([])))
            .and_then(Value::as_array_mut)
        else {
            return TenantInfoSnafu {
                tenant,
                status: response.status,
            }
            .fail();
        };
        let present = members.iter().any(|member| member.as_str() == Some(id.as_str()));

        let action = match membership {
            Membership::Include if present => {
                debug!(message = "Already included in tenant.", %id, %tenant);
                return Ok(());
            }
            Membership::Remove if !present => {
                error!(message = "Not included in tenant, so it's not removed.", %id, %tenant);
                return Ok(());
            }
            Membership::Include => {
                members.push(json!(id));
                "adding"
            }
            Membership::Remove => {
                members.retain(|member| member.as_str() != Some(id.as_str()));
                "removing"
            }
        };

        let response = self.send_json(method, &tenant_endpoint, &info).await?;
        ensure!(
            response.is(expected),
            TenantMembershipSnafu {
                action,
                resource: identity,
                id: &id,
                tenant,
                status: response.status,
            }
        );
        info!(message = "Tenant membership updated.", %action, resource = %identity, %id, %tenant);
        Ok(())
    }

    /// Id of the profile called `name` saved in `variable`.
    pub async fn profile_id(&mut self, name: &str, scope: &Scope, variable: &str) -> Result<()> {
        let endpoint = match &scope.tenant {
            Some(tenant) => format!("{DCOS_IDENTITIES}/profiles?tid={tenant}"),
            None => format!("{DCOS_IDENTITIES}/profiles"),
        };
        self.connect_scope(scope).await?;
        let response = self.get(&endpoint, None).await?;
        if !response.is(200) {
            warn!(message = "Profile does not exist.", profile = %name, status = response.status);
            return Ok(());
        }
        let profiles = response_json(&response, &endpoint)?;
        let pid = json::select_field(&profiles, Some("list"), "name", name, "pid")
            .map(json::scalar_to_string)
            .filter(|pid| !pid.trim().is_empty())
            .context(ProfileIdNotFoundSnafu { name })?;
        self.props.set(variable, pid);
        Ok(())
    }

    /// Add group `group` to profile `profile` through the management API.
    pub async fn include_group_in_profile(
        &mut self,
        group: &str,
        profile: &str,
        scope: &Scope,
    ) -> Result<()> {
        self.connect_scope(scope).await?;
        let login = scope.login.as_ref();
        let group_endpoint = format!("{DCOS_MANAGEMENT}/api/group?id={group}");
        let profile_endpoint = format!("{DCOS_MANAGEMENT}/api/profile?id={profile}");

        let response = self.get(&group_endpoint, login).await?;
        ensure!(
            response.is(200),
            GroupFetchSnafu {
                group,
                status: response.status,
            }
        );
        let response = self.get(&profile_endpoint, login).await?;
        ensure!(
            response.is(200),
            ProfileFetchSnafu {
                profile,
                status: response.status,
            }
        );

        let mut info = response_json(&response, &profile_endpoint)?;
        let mut gids: Vec<String> = info
            .get("groups")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|group| group.get("id").map(json::scalar_to_string))
            .collect();
        if gids.iter().any(|gid| gid == group) {
            warn!(message = "Group already included in profile.", %group, %profile);
            return Ok(());
        }
        gids.push(group.to_owned());

        if let Some(info) = info.as_object_mut() {
            info.remove("groups");
            info.remove("roles");
            info.insert("gids".to_owned(), json!(gids));
        }
        let response = self
            .request(
                Method::PUT,
                &profile_endpoint,
                Some(crate::rest::Body::json(info.to_string())),
                login,
            )
            .await?;
        ensure!(
            response.is(204),
            ProfileGroupSnafu {
                group,
                profile,
                status: response.status,
            }
        );
        info!(message = "Group included in profile.", %group, %profile);
        Ok(())
    }

    /// Create a custom or system user. An existing user is recreated unless
    /// `only_if_missing` is set.
    pub async fn create_user(
        &mut self,
        name: &str,
        scope: &Scope,
        options: &UserOptions,
        only_if_missing: bool,
    ) -> Result<()> {
        let uid = strip_whitespace(name);
        let endpoints = self.endpoints();
        let (item, create, user) = match &endpoints {
            Endpoints::Keos { management } => {
                let baas = self.baas_version().await?.unwrap_or_default();
                let user = baas_user_json(
                    &uid,
                    name,
                    options,
                    version::at_least(&baas, "1.4"),
                    version::at_least(&baas, "2.0"),
                );
                (format!("{management}/user?uid="), format!("{management}/user"), user)
            }
            Endpoints::DcosBaas => {
                let baas = self.baas_version().await?.unwrap_or_default();
                let enable = version::at_least(&baas, "1.4");
                let user = baas_user_json(&uid, name, options, enable, false);
                (format!("{DCOS_BAAS}/user?uid="), format!("{DCOS_BAAS}/user"), user)
            }
            Endpoints::Dcos { user: item, .. } => {
                let management = self.management_version().context(ManagementUnavailableSnafu)?;
                let source_type = version::at_least(management, "1.4");
                let user = management_user_json(&uid, name, options, source_type);
                (item.clone(), post_endpoint(item).to_owned(), user)
            }
        };
        self.create_identity(
            Identity::User,
            name,
            scope,
            &format!("{item}{uid}"),
            &create,
            &user,
            options.system,
            only_if_missing,
        )
        .await
    }

    /// Create a custom or system group. An existing group is recreated
    /// unless `only_if_missing` is set.
    pub async fn create_group(
        &mut self,
        name: &str,
        scope: &Scope,
        options: &GroupOptions,
        only_if_missing: bool,
    ) -> Result<()> {
        let gid = strip_whitespace(name);
        let endpoints = self.endpoints();
        let (item, create, group) = match &endpoints {
            Endpoints::Keos { management } => {
                let groupname = self.uses_stratio_identities().await?;
                let group = baas_group_json(&gid, name, options, groupname);
                (format!("{management}/group?gid="), format!("{management}/group"), group)
            }
            Endpoints::DcosBaas => (
                format!("{DCOS_BAAS}/group?gid="),
                format!("{DCOS_BAAS}/group"),
                baas_group_json(&gid, name, options, false),
            ),
            Endpoints::Dcos { group: item, .. } => {
                let management = self.management_version().context(ManagementUnavailableSnafu)?;
                let source_type = version::at_least(management, "1.4");
                let group = management_group_json(&gid, name, options, source_type);
                (item.clone(), post_endpoint(item).to_owned(), group)
            }
        };
        self.create_identity(
            Identity::Group,
            name,
            scope,
            &format!("{item}{gid}"),
            &create,
            &group,
            options.system,
            only_if_missing,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_identity(
        &mut self,
        identity: Identity,
        name: &str,
        scope: &Scope,
        item: &str,
        create: &str,
        body: &Value,
        system: bool,
        only_if_missing: bool,
    ) -> Result<()> {
        self.connect_scope(scope).await?;
        let kind = if system { "system" } else { "custom" };
        if self.get(item, None).await?.is(200) {
            if only_if_missing {
                warn!(message = "Identity already exists.", %kind, resource = %identity, %name);
                return Ok(());
            }
            self.delete_if_present(item, None).await?;
        }

        let response = self.send_json(Method::POST, create, body).await?;
        if response.is(409) {
            warn!(message = "Identity already exists.", %kind, resource = %identity, %name);
            return Ok(());
        }
        expect_status(&response, &[201], &format!("POST {create}"))?;
        info!(message = "Identity created.", %kind, resource = %identity, %name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn management_user() {
        let options = UserOptions {
            keytab: true,
            groups: ids(&["g1", "g2"]),
            ..UserOptions::default()
        };
        assert_eq!(
            management_user_json("qauser", "qa user", &options, true),
            json!({
                "id": "qauser",
                "name": "qa user",
                "email": "qauser@stratio.com",
                "groups": ["g1", "g2"],
                "inputSourceType": "CUSTOM",
                "keytab": true,
            })
        );
        assert_eq!(
            management_user_json("qauser", "qa user", &UserOptions::default(), false)["custom"],
            json!("true")
        );
    }

    #[test]
    fn baas_user() {
        let options = UserOptions {
            system: true,
            certificate: true,
            groups: ids(&["g1"]),
            ..UserOptions::default()
        };
        assert_eq!(
            baas_user_json("qauser", "qauser", &options, true, true),
            json!({
                "uid": "qauser",
                "name": "qauser",
                "email": "qauser@stratio.com",
                "inputSourceType": "System",
                "groups": [{"gid": "g1"}],
                "certificate": true,
                "enable": true,
                "username": "qauser",
            })
        );
        let older = baas_user_json("qauser", "qauser", &UserOptions::default(), false, false);
        assert_eq!(older.get("enable"), None);
        assert_eq!(older.get("username"), None);
        assert_eq!(older["inputSourceType"], json!("Custom"));
    }

    #[test]
    fn groups() {
        let options = GroupOptions {
            users: ids(&["u1"]),
            ..GroupOptions::default()
        };
        assert_eq!(
            baas_group_json("qagroup", "qa group", &options, true),
            json!({
                "gid": "qagroup",
                "name": "qa group",
                "inputSourceType": "Custom",
                "users": [{"uid": "u1"}],
                "groups": [],
                "groupname": "qagroup",
            })
        );
        assert_eq!(
            management_group_json("qagroup", "qa group", &options, false),
            json!({
                "id": "qagroup",
                "name": "qa group",
                "users": ["u1"],
                "groups": [],
                "custom": "true",
            })
        );
    }
}
