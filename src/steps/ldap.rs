use cucumber::{given, then, when};

use super::{BdtWorld, opt};
use crate::{Result, ldap};

/// Synchronise Gosec with the directory unless the step opted out.
async fn sync_unless(world: &mut BdtWorld, without_sync: &str) -> Result<()> {
    if opt(without_sync).is_none() {
        ldap::synchronize(&mut world.gosec()?).await?;
    }
    Ok(())
}

#[given(
    regex = r"^I create user '(.+?)' with password '(.+?)' in LDAP( without sync)?( if the user does not already exist)?$"
)]
#[when(
    regex = r"^I create user '(.+?)' with password '(.+?)' in LDAP( without sync)?( if the user does not already exist)?$"
)]
#[then(
    regex = r"^I create user '(.+?)' with password '(.+?)' in LDAP( without sync)?( if the user does not already exist)?$"
)]
async fn create_user(
    world: &mut BdtWorld,
    user: String,
    password: String,
    without_sync: String,
    if_missing: String,
) -> Result<()> {
    let [user, password] = world.expand_all([user, password]);
    ldap::Directory::new(world.framework().ok(), &world.props, &world.settings)?
        .create_user(&user, &password, opt(&if_missing).is_some())
        .await?;
    sync_unless(world, &without_sync).await
}

#[given(regex = r"^I delete user '(.+?)' in LDAP( without sync)?$")]
#[when(regex = r"^I delete user '(.+?)' in LDAP( without sync)?$")]
#[then(regex = r"^I delete user '(.+?)' in LDAP( without sync)?$")]
async fn delete_user(world: &mut BdtWorld, user: String, without_sync: String) -> Result<()> {
    let user = world.expand(&user);
    ldap::Directory::new(world.framework().ok(), &world.props, &world.settings)?
        .delete_user(&user)
        .await?;
    sync_unless(world, &without_sync).await
}

#[given(regex = r"^I create group '(.+?)' with user '(.+?)' in LDAP( without sync)?$")]
#[when(regex = r"^I create group '(.+?)' with user '(.+?)' in LDAP( without sync)?$")]
#[then(regex = r"^I create group '(.+?)' with user '(.+?)' in LDAP( without sync)?$")]
async fn create_group(
    world: &mut BdtWorld,
    group: String,
    user: String,
    without_sync: String,
) -> Result<()> {
    let [group, user] = world.expand_all([group, user]);
    ldap::Directory::new(world.framework().ok(), &world.props, &world.settings)?
        .create_group(&group, &user)
        .await?;
    sync_unless(world, &without_sync).await
}

#[given(regex = r"^I delete group '(.+?)' in LDAP( without sync)?$")]
#[when(regex = r"^I delete group '(.+?)' in LDAP( without sync)?$")]
#[then(regex = r"^I delete group '(.+?)' in LDAP( without sync)?$")]
async fn delete_group(world: &mut BdtWorld, group: String, without_sync: String) -> Result<()> {
    let group = world.expand(&group);
    ldap::Directory::new(world.framework().ok(), &world.props, &world.settings)?
        .delete_group(&group)
        .await?;
    sync_unless(world, &without_sync).await
}
