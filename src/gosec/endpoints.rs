use crate::properties::PropertyStore;

use super::{CollectionWithoutBaasSnafu, Resource, Result, TenantUnsupportedSnafu};

pub const DCOS_MANAGEMENT: &str = "/service/gosecmanagement";
pub const DCOS_BAAS: &str = "/service/gosec-management-baas/management";
pub const DCOS_IDENTITIES: &str = "/service/gosec-identities-daas/identities";
pub const DCOS_PROFILING: &str = "/service/gosec-identities-daas/profiling";
pub const KEOS_BAAS: &str = "/gosec/baas/management";
pub const KEOS_IDENTITIES: &str = "/gosec/identities/identities";

const DEFAULT_KEOS_BAAS_PATH: &str = "/gosec/baas";

/// Legacy DCOS API paths, overridable through properties.
const DCOS_API: [(&str, &str); 5] = [
    ("API_POLICY", "/api/policy?id="),
    ("API_POLICIES", "/api/policies"),
    ("API_USER", "/api/user?id="),
    ("API_GROUP", "/api/group?id="),
    ("API_TAGS", "/api/policies/tags"),
];

/// Where Gosec lives in the active topology.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoints {
    /// Management BaaS behind the Keos ingress; `management` is
    /// `{KEOS_GOSEC_BAAS_INGRESS_PATH}/management`.
    Keos { management: String },
    /// Management BaaS behind the DCOS admin router.
    DcosBaas,
    /// Legacy `gosecmanagement` API.
    Dcos {
        policy: String,
        policies: String,
        user: String,
        group: String,
        tags: String,
    },
}

/// Endpoints of one resource: `item` takes the resource id appended,
/// `create` receives new resources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub item: String,
    pub create: String,
}

impl Location {
    pub fn of(&self, id: &str) -> String {
        format!("{}{}", self.item, id)
    }
}

/// Collection endpoint for an item endpoint: `/api/user?id=` posts to
/// `/api/user` and `/api/user/` to `/api/user`.
pub fn post_endpoint(item: &str) -> &str {
    match item.rsplit_once('?') {
        Some((path, query)) if query.ends_with('=') && !query.contains('&') => path,
        _ => item.strip_suffix('/').unwrap_or(item),
    }
}

impl Endpoints {
    pub fn from_props(props: &PropertyStore) -> Self {
        if props.is_keos() {
            let baas = props
                .non_empty("KEOS_GOSEC_BAAS_INGRESS_PATH")
                .unwrap_or(DEFAULT_KEOS_BAAS_PATH);
            return Self::Keos {
                management: format!("{}/management", baas.trim_end_matches('/')),
            };
        }
        if props.non_empty(super::BAAS_VERSION).is_some() {
            return Self::DcosBaas;
        }
        let [policy, policies, user, group, tags] = DCOS_API.map(|(key, default)| {
            format!("{DCOS_MANAGEMENT}{}", props.non_empty(key).unwrap_or(default))
        });
        Self::Dcos {
            policy,
            policies,
            user,
            group,
            tags,
        }
    }

    pub fn is_keos(&self) -> bool {
        matches!(self, Self::Keos { .. })
    }

    /// Whether requests go to the management BaaS, whose listings key
    /// policies by `pid`.
    pub fn is_baas(&self) -> bool {
        !matches!(self, Self::Dcos { .. })
    }

    /// Root of the management BaaS API.
    pub fn management(&self) -> &str {
        match self {
            Self::Keos { management } => management,
            Self::DcosBaas | Self::Dcos { .. } => DCOS_BAAS,
        }
    }

    pub fn policies(&self) -> String {
        match self {
            Self::Dcos { policies, .. } => policies.clone(),
            _ => format!("{}/policies", self.management()),
        }
    }

    pub fn policy_tags(&self) -> String {
        match self {
            Self::Dcos { tags, .. } => tags.clone(),
            _ => format!("{}/policies/tags", self.management()),
        }
    }

    pub fn domain_policies(&self) -> String {
        match self {
            Self::Dcos { policies, .. } => policies.clone(),
            _ => format!("{}/policies/domains", self.management()),
        }
    }

    /// Listing used to resolve policy names of `kind` to ids.
    pub fn policy_listing(&self, kind: Resource) -> String {
        match kind {
            Resource::CollectionPolicy => self.domain_policies(),
            _ => self.policies(),
        }
    }

    pub fn services(&self) -> String {
        match self {
            Self::Dcos { .. } => format!("{DCOS_MANAGEMENT}/api/service"),
            _ => format!("{}/services", self.management()),
        }
    }

    /// Item endpoint of `kind`, ready for an id to be appended.
    pub fn item(&self, kind: Resource) -> Result<String> {
        let path = match kind {
            Resource::Policy => "policy",
            Resource::CollectionPolicy => "policy/domain",
            Resource::User => "user",
            Resource::Group => "group",
            Resource::Tenant => {
                return match self {
                    Self::Keos { .. } => TenantUnsupportedSnafu.fail(),
                    _ => Ok(format!("{DCOS_IDENTITIES}/tenants/")),
                };
            }
        };
        match self {
            Self::Dcos {
                policy, user, group, ..
            } => match kind {
                Resource::Policy => Ok(policy.clone()),
                Resource::User => Ok(user.clone()),
                Resource::Group => Ok(group.clone()),
                _ => CollectionWithoutBaasSnafu.fail(),
            },
            _ => Ok(format!("{}/{path}{}", self.management(), kind.id_query())),
        }
    }

    /// Endpoints of `kind`. An `explicit` API service path replaces the
    /// default one; on Keos the id query is still appended to it.
    pub fn locate(&self, kind: Resource, explicit: Option<&str>) -> Result<Location> {
        let item = match explicit {
            Some(path) if self.is_keos() => format!("{path}{}", kind.id_query()),
            Some(path) => path.to_owned(),
            None => self.item(kind)?,
        };
        let create = match explicit {
            Some(path) if self.is_keos() => path.to_owned(),
            _ => post_endpoint(&item).to_owned(),
        };
        Ok(Location { item, create })
    }

    /// Tenant collection of the identities service.
    pub fn tenants(&self) -> String {
        match self {
            Self::Keos { .. } => format!("{KEOS_IDENTITIES}/tenants"),
            _ => format!("{DCOS_IDENTITIES}/tenants"),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::properties::KEOS_ENV;

    fn props(values: &[(&str, &str)]) -> PropertyStore {
        let mut props = PropertyStore::new();
        for (key, value) in values {
            props.set(*key, *value);
        }
        props
    }

    #[test]
    fn keos() {
        let endpoints = Endpoints::from_props(&props(&[
            (KEOS_ENV, "true"),
            ("KEOS_GOSEC_BAAS_INGRESS_PATH", "/gosec/baas"),
        ]));
        assert!(endpoints.is_baas());
        assert_eq!(endpoints.policies(), "/gosec/baas/management/policies");
        assert_eq!(endpoints.policy_tags(), "/gosec/baas/management/policies/tags");
        assert_eq!(
            endpoints.policy_listing(Resource::CollectionPolicy),
            "/gosec/baas/management/policies/domains"
        );
        assert_eq!(
            endpoints.locate(Resource::CollectionPolicy, None).unwrap(),
            Location {
                item: "/gosec/baas/management/policy/domain?pid=".to_owned(),
                create: "/gosec/baas/management/policy/domain".to_owned(),
            }
        );
        assert_eq!(
            endpoints.locate(Resource::User, Some("/custom/user")).unwrap(),
            Location {
                item: "/custom/user?uid=".to_owned(),
                create: "/custom/user".to_owned(),
            }
        );
        assert!(matches!(
            endpoints.item(Resource::Tenant),
            Err(super::super::GosecError::TenantUnsupported)
        ));
        assert_eq!(endpoints.tenants(), "/gosec/identities/identities/tenants");
    }

    #[test]
    fn dcos_baas() {
        let endpoints = Endpoints::from_props(&props(&[(super::super::BAAS_VERSION, "1.4.0")]));
        assert_eq!(endpoints, Endpoints::DcosBaas);
        assert_eq!(
            endpoints.locate(Resource::Policy, None).unwrap(),
            Location {
                item: "/service/gosec-management-baas/management/policy?pid=".to_owned(),
                create: "/service/gosec-management-baas/management/policy".to_owned(),
            }
        );
        assert_eq!(
            endpoints.item(Resource::Group).unwrap(),
            "/service/gosec-management-baas/management/group?gid="
        );
        assert_eq!(
            endpoints.services(),
            "/service/gosec-management-baas/management/services"
        );
        assert_eq!(
            endpoints.item(Resource::Tenant).unwrap(),
            "/service/gosec-identities-daas/identities/tenants/"
        );
    }

    #[test]
    fn dcos_legacy() {
        let endpoints = Endpoints::from_props(&props(&[("API_USER", "/api/users/")]));
        assert!(!endpoints.is_baas());
        assert_eq!(endpoints.policies(), "/service/gosecmanagement/api/policies");
        assert_eq!(endpoints.policy_tags(), "/service/gosecmanagement/api/policies/tags");
        assert_eq!(
            endpoints.locate(Resource::Policy, None).unwrap(),
            Location {
                item: "/service/gosecmanagement/api/policy?id=".to_owned(),
                create: "/service/gosecmanagement/api/policy".to_owned(),
            }
        );
        assert_eq!(
            endpoints.locate(Resource::User, None).unwrap().create,
            "/service/gosecmanagement/api/users"
        );
        assert!(matches!(
            endpoints.item(Resource::CollectionPolicy),
            Err(super::super::GosecError::CollectionWithoutBaas)
        ));
        assert_eq!(endpoints.services(), "/service/gosecmanagement/api/service");
    }

    #[test]
    fn post_endpoints() {
        assert_eq!(post_endpoint("/api/policy?id="), "/api/policy");
        assert_eq!(post_endpoint("/management/user?uid="), "/management/user");
        assert_eq!(post_endpoint("/api/group/"), "/api/group");
        assert_eq!(post_endpoint("/api/groups"), "/api/groups");
    }
}
