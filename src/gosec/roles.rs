use reqwest::Method;
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, error, info, warn};

use super::{
    DCOS_IDENTITIES, DCOS_PROFILING, Gosec, Identity, KEOS_BAAS, ResourceNameSnafu, Result,
    RidNotFoundSnafu, RoleMembershipSnafu, RoleNotFoundSnafu, response_json,
};
use crate::{
    json,
    modify::{DataType, Modification, Operation, ValueType},
};

/// Rid of the first role of a role search: `profiles[0].rid` on the
/// identities service, `list[0].rid` on the management BaaS.
pub fn rid_from_roles(doc: &Value, keos: bool) -> Option<String> {
    let list = if keos { "list" } else { "profiles" };
    doc.get(list)?
        .get(0)?
        .get("rid")
        .map(json::scalar_to_string)
        .filter(|rid| !rid.trim().is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Add,
    Delete,
}

impl Op {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
        }
    }
}

/// Role a membership change applies to.
struct Role<'r> {
    name: &'r str,
    rid: String,
    tenant: &'r str,
}

impl Gosec<'_> {
    pub async fn include_in_role(
        &mut self,
        identity: Identity,
        id: &str,
        role: &str,
        tenant: &str,
    ) -> Result<()> {
        self.role_membership(Op::Add, identity, id, role, tenant).await
    }

    pub async fn remove_from_role(
        &mut self,
        identity: Identity,
        id: &str,
        role: &str,
        tenant: &str,
    ) -> Result<()> {
        self.role_membership(Op::Delete, identity, id, role, tenant)
            .await
    }

    async fn role_membership(
        &mut self,
        op: Op,
        identity: Identity,
        id: &str,
        role: &str,
        tenant: &str,
    ) -> Result<()> {
        self.connect(None, None).await?;
        let keos = self.props.is_keos();
        let not_found = || RoleNotFoundSnafu { role, tenant };

        let search = if keos {
            format!("{KEOS_BAAS}/profiling/roles?count=1&name={role}&tid={tenant}")
        } else {
            format!("{DCOS_PROFILING}/role?count=1&name={role}&tid={tenant}")
        };
        let response = self.get(&search, None).await?;
        ensure!(response.is(200), not_found());
        let rid = rid_from_roles(&response_json(&response, &search)?, keos).context(not_found())?;
        debug!(message = "Role id obtained.", %role, %rid);

        let listing = if keos {
            format!("{KEOS_BAAS}/{}", identity.plural())
        } else {
            format!("{DCOS_IDENTITIES}/{}", identity.plural())
        };
        let id = self.registered_identity(identity, id, &listing).await?;

        let role_endpoint = if keos {
            format!("{KEOS_BAAS}/profiling/role?rid={rid}")
        } else {
            let select = identity.plural().to_uppercase();
            format!("{DCOS_PROFILING}/role/{rid}?select={select}")
        };
        let response = self.get(&role_endpoint, None).await?;
        ensure!(response.is(200), not_found());

        let role = Role {
            name: role,
            rid,
            tenant,
        };
        if keos {
            self.profiling_membership(op, identity, &id, &role).await
        } else {
            let members = response_json(&response, &role_endpoint)?;
            self.bulk_membership(op, identity, &id, &role, &members)
                .await
        }
    }

    /// Change role membership through the bulk identities API of the
    /// identities service.
    async fn bulk_membership(
        &mut self,
        op: Op,
        identity: Identity,
        id: &str,
        role: &Role<'_>,
        members: &Value,
    ) -> Result<()> {
        let mut ids: Vec<String> = members
            .get(identity.plural())
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|member| member.get(identity.id_key()).map(json::scalar_to_string))
            .collect();
        let present = ids.iter().any(|member| member == id);

        let (ids, action) = match op {
            Op::Add if present => {
                warn!(message = "Already included in the role.", %id, role = %role.name);
                return Ok(());
            }
            Op::Delete if !present => {
                warn!(message = "Not included in the role.", %id, role = %role.name, tenant = %role.tenant);
                return Ok(());
            }
            Op::Add => {
                ids.push(id.to_owned());
                (ids, "adding")
            }
            Op::Delete => (vec![id.to_owned()], "deleting"),
        };

        let patch = json!({
            identity.ids_key(): ids,
            "op": op.as_str(),
            "rids": [role.rid],
        });
        let endpoint = format!("{DCOS_PROFILING}/role/bulk/identities?tid={}", role.tenant);
        let cluster_owner =
            Modification::new("cluster-owner", Operation::Header, "true", ValueType::String);
        debug!(message = "Patching role members.", body = %patch);
        let response = self
            .rest
            .send_data(
                Method::PATCH,
                &endpoint,
                &patch.to_string(),
                DataType::Json,
                &[cluster_owner],
                None,
            )
            .await
            .context(super::RestSnafu)?;
        ensure!(
            response.is(200),
            RoleMembershipSnafu {
                action,
                id,
                role: role.name,
                status: response.status,
            }
        );
        info!(message = "Role membership updated.", %action, %id, role = %role.name);
        Ok(())
    }

    /// Change role membership through the profiling API of the management
    /// BaaS.
    async fn profiling_membership(
        &mut self,
        op: Op,
        identity: Identity,
        id: &str,
        role: &Role<'_>,
    ) -> Result<()> {
        let entity = identity.as_str();
        let key = identity.id_key();
        let listing = format!("{KEOS_BAAS}/profiling/{}?tid={}", identity.plural(), role.tenant);
        let response = self.get(&listing, None).await?;
        if !response.is(200) {
            error!(message = "Role members could not be listed.", endpoint = %listing, status = response.status);
            return Ok(());
        }
        let members = json::members_with_role(&response_json(&response, &listing)?, role.name, entity, key);
        let present = members.iter().any(|member| member == id);

        let action = match op {
            Op::Add if present => {
                warn!(message = "Already included in the role.", %id, role = %role.name);
                return Ok(());
            }
            Op::Delete if !present => {
                warn!(message = "Not included in the role.", %id, role = %role.name);
                return Ok(());
            }
            Op::Add => "adding",
            Op::Delete => "removing",
        };

        let details = format!("{KEOS_BAAS}/profiling/{entity}?{key}={id}&tid={}", role.tenant);
        let response = self.get(&details, None).await?;
        ensure!(response.is(200), ResourceNameSnafu { id });
        let name = response_json(&response, &details)?
            .get(entity)
            .and_then(|entry| entry.get("name"))
            .map(json::scalar_to_string)
            .context(ResourceNameSnafu { id })?;

        let patch = json!({
            "op": op.as_str(),
            identity.plural(): [{ key: id, "name": name }],
            "roles": [{ "rid": role.rid, "name": role.name }],
        });
        let endpoint = format!("{KEOS_BAAS}/profiling/{entity}");
        let response = self.send_json(Method::PATCH, &endpoint, &patch).await?;
        ensure!(
            response.is(204),
            RoleMembershipSnafu {
                action,
                id,
                role: role.name,
                status: response.status,
            }
        );
        info!(message = "Role membership updated.", %action, %id, role = %role.name);
        Ok(())
    }

    /// Id of the profiling structure called `name`, saved in `variable`.
    pub async fn profile_structure_id(&mut self, name: &str, variable: &str) -> Result<()> {
        let endpoint = format!("{KEOS_BAAS}/profiling/application");
        let response = self.get(&endpoint, None).await?;
        if !response.is(200) {
            error!(message = "Error getting profile structures.", status = response.status);
            return Ok(());
        }
        let structures = response_json(&response, &endpoint)?;
        match json::select_field(&structures, None, "name", name, "id") {
            Some(id) => {
                let id = json::scalar_to_string(id);
                info!(message = "Profile structure id obtained.", structure = %name, %id);
                self.props.set(variable, id);
            }
            None => warn!(message = "Profile structure does not exist.", structure = %name),
        }
        Ok(())
    }

    /// Rid of the role called `role`, saved in `variable`.
    pub async fn role_rid(&mut self, role: &str, variable: &str) -> Result<()> {
        let endpoint = format!("{KEOS_BAAS}/profiling/roles?name={role}");
        let response = self.get(&endpoint, None).await?;
        if !response.is(200) {
            warn!(message = "Role does not exist.", %role, status = response.status);
            return Ok(());
        }
        let roles = response_json(&response, &endpoint)?;
        let rid = json::select_field(&roles, Some("list"), "name", role, "rid")
            .map(json::scalar_to_string)
            .filter(|rid| !rid.trim().is_empty())
            .context(RidNotFoundSnafu { role })?;
        self.props.set(variable, rid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rids() {
        let identities = json!({"profiles": [{"rid": "r-1", "name": "admin"}]});
        assert_eq!(rid_from_roles(&identities, false).as_deref(), Some("r-1"));
        assert_eq!(rid_from_roles(&identities, true), None);

        let baas = json!({"list": [{"rid": 42}]});
        assert_eq!(rid_from_roles(&baas, true).as_deref(), Some("42"));
        assert_eq!(rid_from_roles(&json!({"list": []}), true), None);
    }
}
