use cucumber::{given, then, when};

use super::{BdtWorld, opt};
use crate::{Result, aws::S3};

#[given(regex = r"^I list S3 buckets and save it in environment variable '(.+?)'$")]
#[when(regex = r"^I list S3 buckets and save it in environment variable '(.+?)'$")]
#[then(regex = r"^I list S3 buckets and save it in environment variable '(.+?)'$")]
async fn list_buckets(world: &mut BdtWorld, variable: String) -> Result<()> {
    let buckets = S3::from_settings(&world.settings).await.list_buckets().await?;
    world.save(&buckets.join("\n"), Some(&variable), None).await?;
    Ok(())
}

#[given(
    regex = r"^I list S3 objects of bucket with name '(.+?)'(?: in the path '(.+?)')? and save it in file '(.+?)'$"
)]
#[when(
    regex = r"^I list S3 objects of bucket with name '(.+?)'(?: in the path '(.+?)')? and save it in file '(.+?)'$"
)]
#[then(
    regex = r"^I list S3 objects of bucket with name '(.+?)'(?: in the path '(.+?)')? and save it in file '(.+?)'$"
)]
async fn list_objects(world: &mut BdtWorld, bucket: String, path: String, file: String) -> Result<()> {
    let bucket = world.expand(&bucket);
    let path = opt(&path).map(|path| world.expand(path));
    let objects = S3::from_settings(&world.settings)
        .await
        .list_objects(&bucket, path.as_deref())
        .await?;
    world.save(&objects.join("\n"), None, Some(&file)).await?;
    Ok(())
}

#[given(regex = r"^I clear S3 bucket with name '(.+?)'(?: in the path '(.+?)')?$")]
#[when(regex = r"^I clear S3 bucket with name '(.+?)'(?: in the path '(.+?)')?$")]
#[then(regex = r"^I clear S3 bucket with name '(.+?)'(?: in the path '(.+?)')?$")]
async fn clear_bucket(world: &mut BdtWorld, bucket: String, path: String) -> Result<()> {
    let bucket = world.expand(&bucket);
    let prefix = world.expand(&path);
    S3::from_settings(&world.settings)
        .await
        .clear_bucket(&bucket, &prefix)
        .await?;
    Ok(())
}

#[given(regex = r"^I delete S3 bucket with name '(.+?)'$")]
#[when(regex = r"^I delete S3 bucket with name '(.+?)'$")]
#[then(regex = r"^I delete S3 bucket with name '(.+?)'$")]
async fn delete_bucket(world: &mut BdtWorld, bucket: String) -> Result<()> {
    let bucket = world.expand(&bucket);
    S3::from_settings(&world.settings)
        .await
        .delete_bucket(&bucket)
        .await?;
    Ok(())
}
