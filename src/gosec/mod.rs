//! Policy, identity and tenant management in Gosec.
//!
//! Every operation works against one of two topologies, chosen per call from
//! the `isKeosEnv` property: Keos clusters reach the management BaaS through
//! their ingress, DCOS clusters through the admin router, either on the
//! legacy `gosecmanagement` API or on the management BaaS when
//! `gosec-management-baas_version` is known.

mod endpoints;
mod identities;
mod resources;
mod roles;
mod services;

use std::{fmt, path::PathBuf, str::FromStr};

use reqwest::Method;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info, warn};

pub use endpoints::{
    DCOS_BAAS, DCOS_IDENTITIES, DCOS_MANAGEMENT, DCOS_PROFILING, Endpoints, KEOS_BAAS,
    KEOS_IDENTITIES, Location, post_endpoint,
};
pub use identities::{
    GroupOptions, UserOptions, baas_group_json, baas_user_json, management_group_json,
    management_user_json,
};
pub use roles::rid_from_roles;
pub use services::{Algorithm, SyncType, baas_service_version, management_service_version};

use crate::{
    config::Settings,
    k8s::{self, Framework},
    modify::{DataType, Modification, Operation, ValueType},
    properties::PropertyStore,
    rest::{Body, Login, RestClient, RestError, RestResponse},
    version,
};

const GOSEC_BAAS: &str = "gosec-management-baas";
const GOSEC_NAMESPACE: &str = "keos-core";
const BAAS_VERSION: &str = "gosec-management-baas_version";
const MANAGEMENT_VERSION: &str = "gosec-management_version";
const IDENTITY_REALM: &str = "internal";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GosecError {
    #[snafu(display("{}", source))]
    Rest { source: RestError },

    #[snafu(display("{}", source))]
    Cluster { source: k8s::Error },

    #[snafu(display("{} returned status {}, expected {}: {}", request, status, expected, body))]
    UnexpectedStatus {
        request: String,
        expected: String,
        status: u16,
        body: String,
    },

    #[snafu(display("Invalid JSON in response of {}: {}", request, source))]
    InvalidResponse {
        request: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to write {}: {}", path.display(), source))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unknown Gosec resource '{}'", resource))]
    UnknownResource { resource: String },

    #[snafu(display("Error obtaining ID from policy {}", name))]
    PolicyIdNotFound { name: String },

    #[snafu(display(
        "Error obtaining policies from gosecmanagement {} (Response code = {})",
        endpoint,
        status
    ))]
    PolicyList { endpoint: String, status: u16 },

    #[snafu(display("Policy does not exist -> {}", name))]
    PolicyNotFound { name: String },

    #[snafu(display(
        "Error obtaining policy with ID {} from gosecmanagement (Response code = {})",
        id,
        status
    ))]
    PolicyFetch { id: String, status: u16 },

    #[snafu(display("Error obtaining JSON from policy {}", name))]
    EmptyPolicy { name: String },

    #[snafu(display("Collections policies can only be used with gosec-management-baas"))]
    CollectionWithoutBaas,

    #[snafu(display("Tenant resource not supported yet in K8s spec"))]
    TenantUnsupported,

    #[snafu(display("Check gosec management or management-baas is available"))]
    ManagementUnavailable,

    #[snafu(display("Error obtaining ID from profile {}", name))]
    ProfileIdNotFound { name: String },

    #[snafu(display("Error obtaining {}s - Status code: {}", resource, status))]
    IdentityList { resource: Identity, status: u16 },

    #[snafu(display("{} {} doesn't exist in Gosec", resource, id))]
    UnknownIdentity { resource: Identity, id: String },

    #[snafu(display("Error obtaining info from tenant {} - Status code: {}", tenant, status))]
    TenantInfo { tenant: String, status: u16 },

    #[snafu(display(
        "Error {} {} {} in tenant {} - Status code: {}",
        action,
        resource,
        id,
        tenant,
        status
    ))]
    TenantMembership {
        action: &'static str,
        resource: Identity,
        id: String,
        tenant: String,
        status: u16,
    },

    #[snafu(display("Error obtaining Group: {}- Status code: {}", group, status))]
    GroupFetch { group: String, status: u16 },

    #[snafu(display("Error obtaining Profile: {}- Status code: {}", profile, status))]
    ProfileFetch { profile: String, status: u16 },

    #[snafu(display("Error adding Group: {} in Profile {} - Status code: {}", group, profile, status))]
    ProfileGroup {
        group: String,
        profile: String,
        status: u16,
    },

    #[snafu(display("GET request to endpoint {} returns {}", endpoint, status))]
    ServiceList { endpoint: String, status: u16 },

    #[snafu(display("Key {} not found", name))]
    KeyNotFound { name: String },

    #[snafu(display(
        "Asset exists but it has different algorithm. Expected: {}. Current: {}",
        expected,
        current
    ))]
    AssetAlgorithm { expected: String, current: String },

    #[snafu(display("Role {} doesn't exist in Gosec for tenant {}", role, tenant))]
    RoleNotFound { role: String, tenant: String },

    #[snafu(display(
        "Error {} User/Group: {} in Role {} - Status code: {}",
        action,
        id,
        role,
        status
    ))]
    RoleMembership {
        action: &'static str,
        id: String,
        role: String,
        status: u16,
    },

    #[snafu(display("Problem obtaining name of resource {}", id))]
    ResourceName { id: String },

    #[snafu(display("Error obtaining rid from role {}", role))]
    RidNotFound { role: String },
}

pub type Result<T, E = GosecError> = std::result::Result<T, E>;

/// Result of resolving a policy name through its listing.
#[derive(Debug, PartialEq, Eq)]
enum PolicyLookup {
    Found(String),
    /// The listing was read but holds no such policy.
    Missing,
    /// The listing could not be read.
    Unlisted,
}

/// Kinds of Gosec resource handled by the generic create, delete and update
/// operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Policy,
    /// Policy over a collection of domains.
    CollectionPolicy,
    User,
    Group,
    Tenant,
}

impl Resource {
    pub const fn is_policy(self) -> bool {
        matches!(self, Self::Policy | Self::CollectionPolicy)
    }

    /// Query string an id is appended to on the management BaaS.
    pub const fn id_query(self) -> &'static str {
        match self {
            Self::Policy | Self::CollectionPolicy => "?pid=",
            Self::User => "?uid=",
            Self::Group => "?gid=",
            Self::Tenant => "?tid=",
        }
    }
}

impl FromStr for Resource {
    type Err = GosecError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "policy" => Ok(Self::Policy),
            "collectionPolicy" => Ok(Self::CollectionPolicy),
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "tenant" => Ok(Self::Tenant),
            _ => UnknownResourceSnafu { resource: s }.fail(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Policy => "policy",
            Self::CollectionPolicy => "collectionPolicy",
            Self::User => "user",
            Self::Group => "group",
            Self::Tenant => "tenant",
        })
    }
}

/// A user or a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Identity {
    User,
    Group,
}

impl Identity {
    pub const fn id_key(self) -> &'static str {
        match self {
            Self::User => "uid",
            Self::Group => "gid",
        }
    }

    pub const fn ids_key(self) -> &'static str {
        match self {
            Self::User => "uids",
            Self::Group => "gids",
        }
    }

    pub const fn plural(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Group => "groups",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

impl FromStr for Identity {
    type Err = GosecError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            _ => UnknownResourceSnafu { resource: s }.fail(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity Gosec derives for a user or group synchronised from the internal
/// realm: `Alice` becomes `alice-internal`.
pub fn stratio_identity(id: &str) -> String {
    format!("{}-{}", id.to_lowercase(), IDENTITY_REALM)
}

/// Who a request is sent as: the tenant and credentials used for the SSO
/// session, and optional basic authentication credentials.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub tenant: Option<String>,
    pub tenant_login: Option<Login>,
    pub login: Option<Login>,
}

impl Scope {
    pub fn tenant(tenant: impl Into<String>, login: Option<Login>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            tenant_login: login,
            login: None,
        }
    }
}

/// Request body built from a base file and data-table modifications.
#[derive(Clone, Debug)]
pub struct BodyTemplate {
    pub path: PathBuf,
    pub data_type: DataType,
    pub modifications: Vec<Modification>,
}

impl BodyTemplate {
    /// Same template with `path` added with `value`.
    pub fn with_field(mut self, path: &str, value: &str) -> Self {
        self.modifications
            .push(Modification::new(path, Operation::Add, value, ValueType::String));
        self
    }
}

/// Gosec operations over the scenario's REST session.
#[derive(Debug)]
pub struct Gosec<'a> {
    pub rest: &'a mut RestClient,
    pub props: &'a mut PropertyStore,
    pub framework: Option<&'a Framework>,
    pub settings: &'a Settings,
}

impl<'a> Gosec<'a> {
    pub fn new(
        rest: &'a mut RestClient,
        props: &'a mut PropertyStore,
        framework: Option<&'a Framework>,
        settings: &'a Settings,
    ) -> Self {
        Self {
            rest,
            props,
            framework,
            settings,
        }
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints::from_props(self.props)
    }

    async fn connect(&mut self, tenant: Option<&str>, login: Option<&Login>) -> Result<()> {
        self.rest
            .set_cct_connection(self.props, tenant, login)
            .await
            .context(RestSnafu)
    }

    /// Log in as the scope's tenant, when it names one.
    async fn connect_scope(&mut self, scope: &Scope) -> Result<()> {
        match &scope.tenant {
            Some(tenant) => self.connect(Some(tenant), scope.tenant_login.as_ref()).await,
            None => Ok(()),
        }
    }

    /// Version of the management BaaS. On Keos it is read from the running
    /// deployment when a cluster is connected.
    async fn baas_version(&self) -> Result<Option<String>> {
        if self.props.is_keos()
            && let Some(framework) = self.framework
        {
            let version = framework
                .deployment_version(GOSEC_BAAS, GOSEC_NAMESPACE)
                .await
                .context(ClusterSnafu)?;
            return Ok(Some(version));
        }
        Ok(self.props.non_empty(BAAS_VERSION).map(str::to_owned))
    }

    /// Whether the management BaaS names identities after the realm they
    /// come from (2.0 onwards).
    async fn uses_stratio_identities(&self) -> Result<bool> {
        Ok(self
            .baas_version()
            .await?
            .is_some_and(|baas| version::at_least(&baas, "2.0")))
    }

    fn management_version(&self) -> Option<&str> {
        self.props.non_empty(MANAGEMENT_VERSION)
    }

    async fn request(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<Body>,
        login: Option<&Login>,
    ) -> Result<RestResponse> {
        self.rest
            .send(method, endpoint, body, login)
            .await
            .context(RestSnafu)
    }

    async fn get(&mut self, endpoint: &str, login: Option<&Login>) -> Result<RestResponse> {
        self.request(Method::GET, endpoint, None, login).await
    }

    async fn send_template(
        &mut self,
        method: Method,
        endpoint: &str,
        template: &BodyTemplate,
        login: Option<&Login>,
    ) -> Result<RestResponse> {
        self.rest
            .send_file(
                method,
                endpoint,
                &template.path,
                template.data_type,
                &template.modifications,
                login,
            )
            .await
            .context(RestSnafu)
    }

    async fn send_json(
        &mut self,
        method: Method,
        endpoint: &str,
        json: &serde_json::Value,
    ) -> Result<RestResponse> {
        debug!(message = "Sending Gosec request.", %method, %endpoint, body = %json);
        self.request(method, endpoint, Some(Body::json(json.to_string())), None)
            .await
    }

    /// Looks the policy called `name` up in the listing at `endpoint`.
    async fn find_policy(
        &mut self,
        endpoint: &str,
        name: &str,
        baas: bool,
        login: Option<&Login>,
    ) -> Result<PolicyLookup> {
        let response = self.get(endpoint, login).await?;
        if !response.is(200) {
            warn!(message = "Policy listing unavailable.", %endpoint, status = response.status);
            return Ok(PolicyLookup::Unlisted);
        }
        let id = crate::json::policy_id_in(&response.body, name, baas);
        if id.is_empty() {
            Ok(PolicyLookup::Missing)
        } else {
            debug!(message = "Policy id obtained.", policy = %name, %id);
            Ok(PolicyLookup::Found(id))
        }
    }

    /// Delete `item` if a GET on it succeeds. Returns whether it existed.
    async fn delete_if_present(&mut self, item: &str, login: Option<&Login>) -> Result<bool> {
        if !self.get(item, login).await?.is(200) {
            return Ok(false);
        }
        let response = self.request(Method::DELETE, item, None, login).await?;
        expect_status(&response, &[200, 204], &format!("DELETE {item}"))?;
        info!(message = "Resource deleted.", endpoint = %item);
        Ok(true)
    }
}

/// Fail unless `response` carries one of the `expected` statuses.
pub fn expect_status(response: &RestResponse, expected: &[u16], request: &str) -> Result<()> {
    ensure!(
        expected.contains(&response.status),
        UnexpectedStatusSnafu {
            request,
            expected: expected
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
            status: response.status,
            body: response.body.clone(),
        }
    );
    Ok(())
}

/// Parse the JSON body of `response`.
pub fn response_json(response: &RestResponse, request: &str) -> Result<serde_json::Value> {
    serde_json::from_str(&response.body).context(InvalidResponseSnafu { request })
}

/// `text` without whitespace, as Gosec ids are derived from names.
pub fn strip_whitespace(text: &str) -> String {
    text.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names() {
        assert_eq!("collectionPolicy".parse::<Resource>().unwrap(), Resource::CollectionPolicy);
        assert_eq!(Resource::Group.to_string(), "group");
        assert_eq!(Resource::CollectionPolicy.id_query(), "?pid=");
        assert!("role".parse::<Resource>().is_err());
        assert_eq!("group".parse::<Identity>().unwrap().ids_key(), "gids");
    }

    #[test]
    fn identities() {
        assert_eq!(stratio_identity("Alice"), "alice-internal");
        assert_eq!(strip_whitespace(" qa user 1 "), "qauser1");
    }

    #[test]
    fn status_expectations() {
        let response = RestResponse {
            status: 409,
            body: "conflict".to_owned(),
            headers: Vec::new(),
        };
        assert!(expect_status(&response, &[409], "POST /x").is_ok());
        assert_eq!(
            expect_status(&response, &[200, 204], "DELETE /x")
                .unwrap_err()
                .to_string(),
            "DELETE /x returned status 409, expected 200 or 204: conflict"
        );
    }

    #[test]
    fn messages() {
        assert_eq!(
            PolicyIdNotFoundSnafu { name: "p1" }.build().to_string(),
            "Error obtaining ID from policy p1"
        );
        assert_eq!(
            TenantMembershipSnafu {
                action: "adding",
                resource: Identity::Group,
                id: "g1",
                tenant: "t1",
                status: 500u16,
            }
            .build()
            .to_string(),
            "Error adding group g1 in tenant t1 - Status code: 500"
        );
    }
}
