use cucumber::{gherkin::Step, given, then, when};

use super::{BdtWorld, opt, parse};
use crate::{
    Result,
    gosec::{
        Algorithm, BodyTemplate, GroupOptions, Identity, Resource, SyncType, UserOptions,
    },
    modify::{DataType, Modification},
    rest::Login,
};

/// Comma separated names, blanks dropped.
fn names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Request body read from `file` in the resources directory and modified by
/// the step's data table, if it has one.
fn body_template(world: &BdtWorld, file: &str, data_type: &str, step: &Step) -> Result<BodyTemplate> {
    let data_type = match opt(data_type) {
        Some(data_type) => data_type.parse()?,
        None => DataType::default(),
    };
    let rows = match step.table {
        Some(_) => world.expanded_table(step)?,
        None => Vec::new(),
    };
    Ok(BodyTemplate {
        path: world.settings.resource_path(world.expand(file)),
        data_type,
        modifications: Modification::from_rows(&rows)?,
    })
}

fn login(world: &BdtWorld, value: &str) -> Result<Login> {
    Ok(world.expand(value).parse()?)
}

#[given(
    regex = r"^I create '(policy|user|group)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[when(
    regex = r"^I create '(policy|user|group)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[then(
    regex = r"^I create '(policy|user|group)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[allow(clippy::too_many_arguments)]
async fn create_resource(
    world: &mut BdtWorld,
    kind: String,
    id: String,
    tenant: String,
    tenant_login: String,
    endpoint: String,
    user_login: String,
    file: String,
    data_type: String,
    step: &Step,
) -> Result<()> {
    create(
        world, &kind, &id, &tenant, &tenant_login, &endpoint, &user_login, &file, &data_type, step,
        false,
    )
    .await
}

#[given(
    regex = r"^I create '(policy|user|group)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? if it does not exist based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[when(
    regex = r"^I create '(policy|user|group)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? if it does not exist based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[then(
    regex = r"^I create '(policy|user|group)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? if it does not exist based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[allow(clippy::too_many_arguments)]
async fn create_resource_if_missing(
    world: &mut BdtWorld,
    kind: String,
    id: String,
    tenant: String,
    tenant_login: String,
    endpoint: String,
    user_login: String,
    file: String,
    data_type: String,
    step: &Step,
) -> Result<()> {
    create(
        world, &kind, &id, &tenant, &tenant_login, &endpoint, &user_login, &file, &data_type, step,
        true,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn create(
    world: &mut BdtWorld,
    kind: &str,
    id: &str,
    tenant: &str,
    tenant_login: &str,
    endpoint: &str,
    user_login: &str,
    file: &str,
    data_type: &str,
    step: &Step,
    only_if_missing: bool,
) -> Result<()> {
    let kind: Resource = kind.parse()?;
    let id = world.expand(id);
    let scope = world.scope(tenant, tenant_login, user_login)?;
    let endpoint = opt(endpoint).map(|endpoint| world.expand(endpoint));
    let body = body_template(world, file, data_type, step)?;
    world
        .gosec()?
        .create_resource(kind, &id, &scope, endpoint.as_deref(), &body, only_if_missing)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I delete '(policy|user|group|collectionPolicy)' '(.+?)'(?: from tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? if it exists$"
)]
#[when(
    regex = r"^I delete '(policy|user|group|collectionPolicy)' '(.+?)'(?: from tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? if it exists$"
)]
#[then(
    regex = r"^I delete '(policy|user|group|collectionPolicy)' '(.+?)'(?: from tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: using API service path '(.+?)')?(?: with user and password '(.+:.+?)')? if it exists$"
)]
#[allow(clippy::too_many_arguments)]
async fn delete_resource(
    world: &mut BdtWorld,
    kind: String,
    id: String,
    tenant: String,
    tenant_login: String,
    endpoint: String,
    user_login: String,
) -> Result<()> {
    let kind: Resource = kind.parse()?;
    let id = world.expand(&id);
    let scope = world.scope(&tenant, &tenant_login, &user_login)?;
    let endpoint = opt(&endpoint).map(|endpoint| world.expand(endpoint));
    world
        .gosec()?
        .delete_resource(kind, &id, &scope, endpoint.as_deref())
        .await?;
    Ok(())
}

#[given(
    regex = r"^I update '(policy|user|group|tenant)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: with user and password '(.+:.+?)')? based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[when(
    regex = r"^I update '(policy|user|group|tenant)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: with user and password '(.+:.+?)')? based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[then(
    regex = r"^I update '(policy|user|group|tenant)' '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: with user and password '(.+:.+?)')? based on '([^:]+?)'(?: as '(json|string|gov)')? with:$"
)]
#[allow(clippy::too_many_arguments)]
async fn update_resource(
    world: &mut BdtWorld,
    kind: String,
    id: String,
    tenant: String,
    tenant_login: String,
    user_login: String,
    file: String,
    data_type: String,
    step: &Step,
) -> Result<()> {
    let kind: Resource = kind.parse()?;
    let id = world.expand(&id);
    let scope = world.scope(&tenant, &tenant_login, &user_login)?;
    let body = body_template(world, &file, &data_type, step)?;
    world
        .gosec()?
        .update_resource(kind, &id, &scope, &body)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I get id from( tag)? policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
#[when(
    regex = r"^I get id from( tag)? policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
#[then(
    regex = r"^I get id from( tag)? policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
async fn policy_id(
    world: &mut BdtWorld,
    tag: String,
    name: String,
    tenant: String,
    tenant_login: String,
    variable: String,
) -> Result<()> {
    let [name, variable] = world.expand_all([name, variable]);
    let scope = world.scope(&tenant, &tenant_login, "")?;
    world
        .gosec()?
        .policy_id(opt(&tag).is_some(), &name, &scope, &variable)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I get id from domain policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
#[when(
    regex = r"^I get id from domain policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
#[then(
    regex = r"^I get id from domain policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
async fn domain_policy_id(
    world: &mut BdtWorld,
    name: String,
    tenant: String,
    tenant_login: String,
    variable: String,
) -> Result<()> {
    let [name, variable] = world.expand_all([name, variable]);
    let scope = world.scope(&tenant, &tenant_login, "")?;
    world
        .gosec()?
        .domain_policy_id(&name, &scope, &variable)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I get json from( tag)? policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it(?: in environment variable '(.*?)')?(?: in file '(.*?)')?$"
)]
#[when(
    regex = r"^I get json from( tag)? policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it(?: in environment variable '(.*?)')?(?: in file '(.*?)')?$"
)]
#[then(
    regex = r"^I get json from( tag)? policy with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it(?: in environment variable '(.*?)')?(?: in file '(.*?)')?$"
)]
#[allow(clippy::too_many_arguments)]
async fn policy_json(
    world: &mut BdtWorld,
    tag: String,
    name: String,
    tenant: String,
    tenant_login: String,
    variable: String,
    file: String,
) -> Result<()> {
    let name = world.expand(&name);
    let scope = world.scope(&tenant, &tenant_login, "")?;
    let variable = opt(&variable).map(|variable| world.expand(variable));
    let file = opt(&file).map(|file| world.expand(file));
    world
        .gosec()?
        .policy_json(
            opt(&tag).is_some(),
            &name,
            &scope,
            variable.as_deref(),
            file.as_deref(),
        )
        .await?;
    Ok(())
}

#[given(regex = r"^I create tenant '(.+?)' if it does not exist based on '([^:]+?)'(?: as '(json|string|gov)')? with:$")]
#[when(regex = r"^I create tenant '(.+?)' if it does not exist based on '([^:]+?)'(?: as '(json|string|gov)')? with:$")]
#[then(regex = r"^I create tenant '(.+?)' if it does not exist based on '([^:]+?)'(?: as '(json|string|gov)')? with:$")]
async fn create_tenant(
    world: &mut BdtWorld,
    id: String,
    file: String,
    data_type: String,
    step: &Step,
) -> Result<()> {
    let id = world.expand(&id);
    let body = body_template(world, &file, &data_type, step)?;
    world.gosec()?.create_tenant(&id, &body).await?;
    Ok(())
}

#[given(regex = r"^I delete tenant '(.+?)' if it exists$")]
#[when(regex = r"^I delete tenant '(.+?)' if it exists$")]
#[then(regex = r"^I delete tenant '(.+?)' if it exists$")]
async fn delete_tenant(world: &mut BdtWorld, id: String) -> Result<()> {
    let id = world.expand(&id);
    world.gosec()?.delete_tenant(&id).await?;
    Ok(())
}

#[given(regex = r"^I include '(user|group)' '(.+?)' in tenant '(.+?)'$")]
#[when(regex = r"^I include '(user|group)' '(.+?)' in tenant '(.+?)'$")]
#[then(regex = r"^I include '(user|group)' '(.+?)' in tenant '(.+?)'$")]
async fn include_in_tenant(world: &mut BdtWorld, identity: String, id: String, tenant: String) -> Result<()> {
    let identity: Identity = identity.parse()?;
    let [id, tenant] = world.expand_all([id, tenant]);
    world
        .gosec()?
        .include_in_tenant(identity, &id, &tenant)
        .await?;
    Ok(())
}

#[given(regex = r"^I remove '(user|group)' '(.+?)' from tenant '(.+?)'$")]
#[when(regex = r"^I remove '(user|group)' '(.+?)' from tenant '(.+?)'$")]
#[then(regex = r"^I remove '(user|group)' '(.+?)' from tenant '(.+?)'$")]
async fn remove_from_tenant(world: &mut BdtWorld, identity: String, id: String, tenant: String) -> Result<()> {
    let identity: Identity = identity.parse()?;
    let [id, tenant] = world.expand_all([id, tenant]);
    world
        .gosec()?
        .remove_from_tenant(identity, &id, &tenant)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I get id from profile with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
#[when(
    regex = r"^I get id from profile with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
#[then(
    regex = r"^I get id from profile with name '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
async fn profile_id(
    world: &mut BdtWorld,
    name: String,
    tenant: String,
    tenant_login: String,
    variable: String,
) -> Result<()> {
    let [name, variable] = world.expand_all([name, variable]);
    let scope = world.scope(&tenant, &tenant_login, "")?;
    world.gosec()?.profile_id(&name, &scope, &variable).await?;
    Ok(())
}

#[given(
    regex = r"^I include group '(.+?)' in profile '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: with user and password '(.+:.+?)')?$"
)]
#[when(
    regex = r"^I include group '(.+?)' in profile '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: with user and password '(.+:.+?)')?$"
)]
#[then(
    regex = r"^I include group '(.+?)' in profile '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: with user and password '(.+:.+?)')?$"
)]
async fn include_group_in_profile(
    world: &mut BdtWorld,
    group: String,
    profile: String,
    tenant: String,
    tenant_login: String,
    user_login: String,
) -> Result<()> {
    let [group, profile] = world.expand_all([group, profile]);
    let scope = world.scope(&tenant, &tenant_login, &user_login)?;
    world
        .gosec()?
        .include_group_in_profile(&group, &profile, &scope)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I create (custom|system) user '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?( generating keytab)?( generating certificate)?(?: assigned to groups '(.+?)')?( if it does not exist)?$"
)]
#[when(
    regex = r"^I create (custom|system) user '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?( generating keytab)?( generating certificate)?(?: assigned to groups '(.+?)')?( if it does not exist)?$"
)]
#[then(
    regex = r"^I create (custom|system) user '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?( generating keytab)?( generating certificate)?(?: assigned to groups '(.+?)')?( if it does not exist)?$"
)]
#[allow(clippy::too_many_arguments)]
async fn create_user(
    world: &mut BdtWorld,
    source: String,
    name: String,
    tenant: String,
    tenant_login: String,
    keytab: String,
    certificate: String,
    groups: String,
    if_missing: String,
) -> Result<()> {
    let name = world.expand(&name);
    let scope = world.scope(&tenant, &tenant_login, "")?;
    let options = UserOptions {
        system: source == "system",
        keytab: opt(&keytab).is_some(),
        certificate: opt(&certificate).is_some(),
        groups: names(&world.expand(&groups)),
    };
    world
        .gosec()?
        .create_user(&name, &scope, &options, opt(&if_missing).is_some())
        .await?;
    Ok(())
}

#[given(
    regex = r"^I create (custom|system) group '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: assigned to users '(.+?)')?(?: assigned to groups '(.+?)')?( if it does not exist)?$"
)]
#[when(
    regex = r"^I create (custom|system) group '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: assigned to users '(.+?)')?(?: assigned to groups '(.+?)')?( if it does not exist)?$"
)]
#[then(
    regex = r"^I create (custom|system) group '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')?(?: assigned to users '(.+?)')?(?: assigned to groups '(.+?)')?( if it does not exist)?$"
)]
#[allow(clippy::too_many_arguments)]
async fn create_group(
    world: &mut BdtWorld,
    source: String,
    name: String,
    tenant: String,
    tenant_login: String,
    users: String,
    groups: String,
    if_missing: String,
) -> Result<()> {
    let name = world.expand(&name);
    let scope = world.scope(&tenant, &tenant_login, "")?;
    let options = GroupOptions {
        system: source == "system",
        users: names(&world.expand(&users)),
        groups: names(&world.expand(&groups)),
    };
    world
        .gosec()?
        .create_group(&name, &scope, &options, opt(&if_missing).is_some())
        .await?;
    Ok(())
}

#[given(
    regex = r"^I get version of service '(.+?)' with id '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
#[when(
    regex = r"^I get version of service '(.+?)' with id '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
#[then(
    regex = r"^I get version of service '(.+?)' with id '(.+?)'(?: in tenant '(.+?)')?(?: with tenant user and tenant password '(.+:.+?)')? and save it in environment variable '(.+?)'$"
)]
async fn service_version(
    world: &mut BdtWorld,
    service_type: String,
    id: String,
    tenant: String,
    tenant_login: String,
    variable: String,
) -> Result<()> {
    let [service_type, id, variable] = world.expand_all([service_type, id, variable]);
    let scope = world.scope(&tenant, &tenant_login, "")?;
    world
        .gosec()?
        .service_version(&service_type, &id, &scope, &variable)
        .await?;
    Ok(())
}

#[given(
    regex = r"^I create 'key' '(.+?)'(?: with own key '(.+?)')? in tenant '(.+?)' with tenant user and tenant password '(.+:.+?)'( if it does not exist)?$"
)]
#[when(
    regex = r"^I create 'key' '(.+?)'(?: with own key '(.+?)')? in tenant '(.+?)' with tenant user and tenant password '(.+:.+?)'( if it does not exist)?$"
)]
#[then(
    regex = r"^I create 'key' '(.+?)'(?: with own key '(.+?)')? in tenant '(.+?)' with tenant user and tenant password '(.+:.+?)'( if it does not exist)?$"
)]
async fn create_key(
    world: &mut BdtWorld,
    name: String,
    value: String,
    tenant: String,
    tenant_login: String,
    if_missing: String,
) -> Result<()> {
    let [name, tenant] = world.expand_all([name, tenant]);
    let value = opt(&value).map(|value| world.expand(value));
    let login = login(world, &tenant_login)?;
    world
        .gosec()?
        .create_key(
            &name,
            value.as_deref(),
            &tenant,
            &login,
            opt(&if_missing).is_some(),
        )
        .await?;
    Ok(())
}

#[given(
    regex = r"^I create 'asset' '(.+?)' using key '(.+?)' and algorithm '(aes256|chacha256)' in tenant '(.+?)' with tenant user and tenant password '(.+:.+?)'( if it does not exist)?$"
)]
#[when(
    regex = r"^I create 'asset' '(.+?)' using key '(.+?)' and algorithm '(aes256|chacha256)' in tenant '(.+?)' with tenant user and tenant password '(.+:.+?)'( if it does not exist)?$"
)]
#[then(
    regex = r"^I create 'asset' '(.+?)' using key '(.+?)' and algorithm '(aes256|chacha256)' in tenant '(.+?)' with tenant user and tenant password '(.+:.+?)'( if it does not exist)?$"
)]
#[allow(clippy::too_many_arguments)]
async fn create_asset(
    world: &mut BdtWorld,
    name: String,
    key: String,
    algorithm: String,
    tenant: String,
    tenant_login: String,
    if_missing: String,
) -> Result<()> {
    let algorithm: Algorithm = algorithm.parse()?;
    let [name, key, tenant] = world.expand_all([name, key, tenant]);
    let login = login(world, &tenant_login)?;
    world
        .gosec()?
        .create_asset(
            &name,
            &key,
            algorithm,
            &tenant,
            &login,
            opt(&if_missing).is_some(),
        )
        .await?;
    Ok(())
}

#[given(regex = r"^I include '(user|group)' '(.+?)' in role '(.+?)' for tenant '(.+?)'$")]
#[when(regex = r"^I include '(user|group)' '(.+?)' in role '(.+?)' for tenant '(.+?)'$")]
#[then(regex = r"^I include '(user|group)' '(.+?)' in role '(.+?)' for tenant '(.+?)'$")]
async fn include_in_role(
    world: &mut BdtWorld,
    identity: String,
    id: String,
    role: String,
    tenant: String,
) -> Result<()> {
    let identity: Identity = identity.parse()?;
    let [id, role, tenant] = world.expand_all([id, role, tenant]);
    world
        .gosec()?
        .include_in_role(identity, &id, &role, &tenant)
        .await?;
    Ok(())
}

#[given(regex = r"^I delete '(user|group)' '(.+?)' from role '(.+?)' in tenant '(.+?)'$")]
#[when(regex = r"^I delete '(user|group)' '(.+?)' from role '(.+?)' in tenant '(.+?)'$")]
#[then(regex = r"^I delete '(user|group)' '(.+?)' from role '(.+?)' in tenant '(.+?)'$")]
async fn remove_from_role(
    world: &mut BdtWorld,
    identity: String,
    id: String,
    role: String,
    tenant: String,
) -> Result<()> {
    let identity: Identity = identity.parse()?;
    let [id, role, tenant] = world.expand_all([id, role, tenant]);
    world
        .gosec()?
        .remove_from_role(identity, &id, &role, &tenant)
        .await?;
    Ok(())
}

#[given(regex = r"^I run '(partial|total)' ldap synchronizer$")]
#[when(regex = r"^I run '(partial|total)' ldap synchronizer$")]
#[then(regex = r"^I run '(partial|total)' ldap synchronizer$")]
async fn run_ldap_synchronizer(world: &mut BdtWorld, sync: String) -> Result<()> {
    let sync: SyncType = parse("synchronization type", &sync)?;
    world.gosec()?.run_ldap_synchronizer(sync).await?;
    Ok(())
}

#[given(regex = r"^I get id from profile structure with name '(.+?)' and save it in environment variable '(.+?)'$")]
#[when(regex = r"^I get id from profile structure with name '(.+?)' and save it in environment variable '(.+?)'$")]
#[then(regex = r"^I get id from profile structure with name '(.+?)' and save it in environment variable '(.+?)'$")]
async fn profile_structure_id(world: &mut BdtWorld, name: String, variable: String) -> Result<()> {
    let [name, variable] = world.expand_all([name, variable]);
    world
        .gosec()?
        .profile_structure_id(&name, &variable)
        .await?;
    Ok(())
}

#[given(regex = r"^I get rid from role with name '(.+?)' and save it in environment variable '(.+?)'$")]
#[when(regex = r"^I get rid from role with name '(.+?)' and save it in environment variable '(.+?)'$")]
#[then(regex = r"^I get rid from role with name '(.+?)' and save it in environment variable '(.+?)'$")]
async fn role_rid(world: &mut BdtWorld, role: String, variable: String) -> Result<()> {
    let [role, variable] = world.expand_all([role, variable]);
    world.gosec()?.role_rid(&role, &variable).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn comma_lists() {
        assert_eq!(names("qa, devs,,ops "), vec!["qa", "devs", "ops"]);
        assert!(names("").is_empty());
    }

    #[test]
    fn logins() {
        let world = BdtWorld::new();
        let login = login(&world, "admin:12:34").unwrap();
        assert_eq!(login.user, "admin");
        assert_eq!(login.password, "12:34");
        assert!(super::login(&world, "admin").is_err());
    }
}
