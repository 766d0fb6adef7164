//! User and group edits in the Keos LDAP directory.
//!
//! Entries are rendered to LDIF templates, copied into the `ldap-0` pod and
//! loaded with the OpenLDAP client tools, authenticated with the admin
//! credentials Vault injects into the pod.

use std::time::Duration;

use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, info};

use crate::{
    config::Settings,
    gosec::{self, Gosec, SyncType},
    k8s::{self, ExecOutput, Framework},
    properties::PropertyStore,
    version,
};

const POD: &str = "ldap-0";
const NAMESPACE: &str = "keos-idp";
const CONTAINER: &str = "ldap";
const OU_CONFIG_MAP: &str = "kerberos";
const PEOPLE_OU_KEY: &str = "ou_people";
const GROUPS_OU_KEY: &str = "ou_groups";
const MINIMUM_KEOS_VERSION: &str = "0.6.0";

const SECRETS: &str = "source /vault/secrets/idp-secrets";
const ADMIN_BIND: &str = "-H ldaps://ldap.keos-idp -D cn=ldap_admin,$ldap_base_dn -w $ldap_admin_pass";
const CLEANUP: &str = "rm -f /tmp/*.template /tmp/*.ldif";
const SEARCH_SUCCESS: &str = "result: 0 Success";

/// Wait before synchronising Gosec after a directory edit.
pub const SYNC_DELAY: Duration = Duration::from_secs(5);
pub const SYNC_RETRIES: usize = 5;
pub const SYNC_INTERVAL: Duration = Duration::from_secs(10);

const USER_TEMPLATE: &str = "###################
###    USERS    ###
###################
dn: uid=stratio,$ou_people
objectClass: top
objectClass: person
objectClass: organizationalPerson
objectClass: inetOrgPerson
objectClass: posixAccount
objectClass: shadowAccount
cn: stratio
sn: stratio
uid: stratio
uidNumber: 65003
gidNumber: 65001
givenName: stratio
homeDirectory: /home/stratio
loginShell: /bin/false
displayname: stratio
mail: stratio@$domain
userPassword: 1234";

const GROUP_TEMPLATE: &str = "###################
###    GROUPS    ###
###################
dn: cn=stratio,$ou_groups
objectClass: posixGroup
objectClass: groupOfnames
objectClass: top
cn: stratio
gidNumber: 65999
description: stratio group
member: uid=uid,$ou_people
memberUid: uid=uid,$ou_people
";

#[derive(Debug, Snafu)]
pub enum LdapError {
    #[snafu(display("Spec only supports keos version >= 0.6"))]
    UnsupportedKeos,

    #[snafu(display("No cluster connection; load the Keos workspace first"))]
    NoCluster,

    #[snafu(display("Key {} not found in configmap kerberos of namespace keos-idp", key))]
    MissingOu { key: &'static str },

    #[snafu(display("The user already exists and can't be created again."))]
    UserExists,

    #[snafu(display("LDAP output does not contain '{}': {}", expected, output))]
    MissingEntry { expected: String, output: String },

    #[snafu(display("Unable to write {}: {}", path, source))]
    WriteTemplate {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("{}", source))]
    Cluster { source: k8s::Error },

    #[snafu(display("{}", source))]
    Sync { source: gosec::GosecError },
}

pub type Result<T, E = LdapError> = std::result::Result<T, E>;

/// LDIF template of a user. `$domain` is left for `shtpl` to fill in the pod.
pub fn user_ldif(user: &str, password: &str, people_ou: &str) -> String {
    USER_TEMPLATE
        .replace("stratio", user)
        .replace("$ou_people", people_ou)
        .replace("userPassword: 1234", &format!("userPassword: {password}"))
}

/// LDIF template of a group with `member` as its only member.
pub fn group_ldif(group: &str, member: &str, groups_ou: &str, people_ou: &str) -> String {
    GROUP_TEMPLATE
        .replace("stratio", group)
        .replace("$ou_people", people_ou)
        .replace("uid=uid", &format!("uid={member}"))
        .replace("$ou_groups", groups_ou)
}

pub fn user_dn(user: &str, people_ou: &str) -> String {
    format!("uid={user},{people_ou}")
}

pub fn group_dn(group: &str, groups_ou: &str) -> String {
    format!("cn={group},{groups_ou}")
}

/// LDIF entry kinds, named after the files they are staged in.
#[derive(Clone, Copy, Debug)]
enum Entry {
    User,
    Group,
}

impl Entry {
    const fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

/// Directory operations against the `ldap-0` pod.
#[derive(Debug)]
pub struct Directory<'a> {
    framework: &'a Framework,
    settings: &'a Settings,
}

impl<'a> Directory<'a> {
    /// Check the cluster runs a Keos version with the managed directory.
    pub fn new(
        framework: Option<&'a Framework>,
        props: &PropertyStore,
        settings: &'a Settings,
    ) -> Result<Self> {
        let supported = props
            .non_empty("keosVersion")
            .is_some_and(|keos| version::at_least(keos, MINIMUM_KEOS_VERSION));
        ensure!(supported, UnsupportedKeosSnafu);
        Ok(Self {
            framework: framework.context(NoClusterSnafu)?,
            settings,
        })
    }

    async fn ou(&self, key: &'static str) -> Result<String> {
        self.framework
            .config_map_key(OU_CONFIG_MAP, NAMESPACE, key)
            .await
            .context(ClusterSnafu)?
            .context(MissingOuSnafu { key })
    }

    async fn shell(&self, script: &str) -> Result<ExecOutput> {
        self.framework
            .exec(
                POD,
                NAMESPACE,
                Some(CONTAINER),
                vec!["sh".into(), "-c".into(), script.into()],
                self.settings.exec_timeout,
            )
            .await
            .context(ClusterSnafu)
    }

    async fn checked_shell(&self, script: &str) -> Result<ExecOutput> {
        let output = self.shell(script).await?;
        output.check(None).context(ClusterSnafu)?;
        Ok(output)
    }

    /// Whether the entry `dn` is in the directory. A failing search counts as
    /// absent.
    async fn exists(&self, dn: &str) -> bool {
        let script = format!("{SECRETS} ; ldapsearch {ADMIN_BIND} -b \"{dn}\"");
        match self.shell(&script).await {
            Ok(output) => output.stdout.contains(SEARCH_SUCCESS),
            Err(error) => {
                debug!(message = "LDAP search failed.", %dn, %error);
                false
            }
        }
    }

    /// Stage `ldif` in the pod, load it with `ldapadd` and check `dn` was
    /// added.
    async fn add(&self, entry: Entry, ldif: &str, dn: &str) -> Result<()> {
        let template = format!("ldap{}.template", entry.name());
        let local = self.settings.output_path(&template);
        tokio::fs::write(&local, ldif)
            .await
            .context(WriteTemplateSnafu {
                path: local.display().to_string(),
            })?;
        let remote = format!("/tmp/{template}");
        self.framework
            .copy_to_pod(POD, NAMESPACE, Some(CONTAINER), &local, &remote)
            .await
            .context(ClusterSnafu)?;

        let ldif_path = format!("/tmp/{}.ldif", entry.name());
        self.checked_shell(&format!("shtpl < {remote} > {ldif_path}"))
            .await?;
        let output = self
            .checked_shell(&format!("{SECRETS} ; cat {ldif_path} | ldapadd {ADMIN_BIND}"))
            .await?;
        self.checked_shell(CLEANUP).await?;

        let expected = format!("adding new entry \"{dn}\"");
        ensure!(
            output.stdout.contains(&expected),
            MissingEntrySnafu {
                expected,
                output: output.stdout,
            }
        );
        info!(message = "LDAP entry added.", %dn);
        Ok(())
    }

    async fn delete(&self, dn: &str) -> Result<()> {
        self.checked_shell(&format!("{SECRETS} ; ldapdelete {ADMIN_BIND} \"{dn}\""))
            .await?;
        info!(message = "LDAP entry deleted.", %dn);
        Ok(())
    }

    /// Create `user` with `password`. With `skip_if_exists` an existing user
    /// is left untouched, otherwise it is an error.
    pub async fn create_user(&self, user: &str, password: &str, skip_if_exists: bool) -> Result<()> {
        let people_ou = self.ou(PEOPLE_OU_KEY).await?;
        let dn = user_dn(user, &people_ou);
        if self.exists(&dn).await {
            ensure!(skip_if_exists, UserExistsSnafu);
            info!(message = "The user already exists, skipping creation.", %user);
            return Ok(());
        }
        self.add(Entry::User, &user_ldif(user, password, &people_ou), &dn)
            .await
    }

    pub async fn delete_user(&self, user: &str) -> Result<()> {
        let people_ou = self.ou(PEOPLE_OU_KEY).await?;
        self.delete(&user_dn(user, &people_ou)).await
    }

    /// Create `group` with `member` in it.
    pub async fn create_group(&self, group: &str, member: &str) -> Result<()> {
        let people_ou = self.ou(PEOPLE_OU_KEY).await?;
        let groups_ou = self.ou(GROUPS_OU_KEY).await?;
        let ldif = group_ldif(group, member, &groups_ou, &people_ou);
        self.add(Entry::Group, &ldif, &group_dn(group, &groups_ou))
            .await
    }

    pub async fn delete_group(&self, group: &str) -> Result<()> {
        let groups_ou = self.ou(GROUPS_OU_KEY).await?;
        self.delete(&group_dn(group, &groups_ou)).await
    }
}

/// Let the directory settle, then run a total Gosec synchronisation.
pub async fn synchronize(gosec: &mut Gosec<'_>) -> Result<()> {
    tokio::time::sleep(SYNC_DELAY).await;
    gosec
        .run_ldap_synchronizer_with_retries(SyncType::Total, SYNC_RETRIES, SYNC_INTERVAL)
        .await
        .context(SyncSnafu)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    const PEOPLE: &str = "ou=People,dc=keos";
    const GROUPS: &str = "ou=Groups,dc=keos";

    #[test]
    fn user_entry() {
        let ldif = user_ldif("qa", "s3cret", PEOPLE);
        assert!(ldif.starts_with("###################\n###    USERS    ###\n"));
        assert!(ldif.contains("dn: uid=qa,ou=People,dc=keos\n"));
        assert!(ldif.contains("homeDirectory: /home/qa\n"));
        assert!(ldif.contains("mail: qa@$domain\n"));
        assert!(ldif.ends_with("userPassword: s3cret"));
        assert!(!ldif.contains("stratio"));
    }

    #[test]
    fn group_entry() {
        let ldif = group_ldif("devs", "qa", GROUPS, PEOPLE);
        assert!(ldif.contains("dn: cn=devs,ou=Groups,dc=keos\n"));
        assert!(ldif.contains("description: devs group\n"));
        assert!(ldif.contains("member: uid=qa,ou=People,dc=keos\n"));
        assert!(ldif.contains("memberUid: uid=qa,ou=People,dc=keos\n"));
    }

    #[test]
    fn names() {
        assert_eq!(user_dn("qa", PEOPLE), "uid=qa,ou=People,dc=keos");
        assert_eq!(group_dn("devs", GROUPS), "cn=devs,ou=Groups,dc=keos");
    }

    #[test]
    fn requires_recent_keos() {
        let settings = Settings::default();
        let mut props = PropertyStore::new();
        assert!(matches!(
            Directory::new(None, &props, &settings),
            Err(LdapError::UnsupportedKeos)
        ));
        props.set("keosVersion", "0.5.2");
        assert!(matches!(
            Directory::new(None, &props, &settings),
            Err(LdapError::UnsupportedKeos)
        ));
        props.set("keosVersion", "0.6.1");
        assert!(matches!(
            Directory::new(None, &props, &settings),
            Err(LdapError::NoCluster)
        ));
    }
}
