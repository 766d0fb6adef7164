//! S3 bucket and object operations.

use aws_config::BehaviorVersion;
use aws_credential_types::{Credentials, provider::SharedCredentialsProvider};
use aws_sdk_s3::{Client, error::DisplayErrorContext};
use aws_types::region::Region;
use indexmap::IndexSet;
use snafu::Snafu;
use tracing::{debug, info};

use crate::config::Settings;

/// Page size used when listing objects.
pub const PAGE_SIZE: i32 = 200;

#[derive(Debug, Snafu)]
pub enum S3Error {
    #[snafu(display("S3 request to {} failed: {}", operation, message))]
    Request {
        operation: &'static str,
        message: String,
    },
}

fn request_error<E: std::error::Error>(operation: &'static str) -> impl FnOnce(E) -> S3Error {
    move |error| S3Error::Request {
        operation,
        message: DisplayErrorContext(error).to_string(),
    }
}

/// How the client authenticates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AwsAuthentication {
    /// A fixed access key and secret pair.
    AccessKey {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },

    /// The SDK's default chain: environment, profile files, IMDS.
    #[default]
    Default,
}

impl AwsAuthentication {
    /// Static keys when both `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`
    /// are set, the default chain otherwise.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        match (lookup("AWS_ACCESS_KEY_ID"), lookup("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => Self::AccessKey {
                access_key_id,
                secret_access_key,
                session_token: lookup("AWS_SESSION_TOKEN"),
            },
            _ => Self::Default,
        }
    }
}

#[derive(Clone, Debug)]
pub struct S3 {
    client: Client,
}

impl S3 {
    pub async fn connect(region: &str, endpoint: Option<&str>, auth: &AwsAuthentication) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_owned()));
        if let AwsAuthentication::AccessKey {
            access_key_id,
            secret_access_key,
            session_token,
        } = auth
        {
            debug!(message = "Using static AWS credentials.", %access_key_id);
            loader = loader.credentials_provider(SharedCredentialsProvider::new(
                Credentials::from_keys(access_key_id, secret_access_key, session_token.clone()),
            ));
        }
        let shared = loader.load().await;

        let mut config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            config = config.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: Client::from_conf(config.build()),
        }
    }

    pub async fn from_settings(settings: &Settings) -> Self {
        Self::connect(
            &settings.aws_region,
            settings.aws_endpoint.as_deref(),
            &settings.aws_auth,
        )
        .await
    }

    pub async fn list_buckets(&self) -> Result<Vec<String>, S3Error> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(request_error("list buckets"))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(str::to_owned))
            .collect())
    }

    /// Every key under `prefix`, following pagination.
    pub async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, S3Error> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(PAGE_SIZE)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(request_error("list objects"))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_owned)),
            );
        }
        Ok(keys)
    }

    /// Listing of `bucket` as written by the list objects step. Without a
    /// path every key is returned; with one, only the entries directly under
    /// it (`/` meaning the bucket root).
    pub async fn list_objects(&self, bucket: &str, path: Option<&str>) -> Result<Vec<String>, S3Error> {
        let prefix = match path {
            None | Some("/") => "",
            Some(path) => path,
        };
        let keys = self.list_keys(bucket, prefix).await?;
        debug!(message = "Objects listed.", %bucket, %prefix, count = keys.len());
        Ok(match path {
            None => distinct(keys),
            Some(_) => direct_children(&keys, prefix),
        })
    }

    /// Delete every object under `prefix`.
    pub async fn clear_bucket(&self, bucket: &str, prefix: &str) -> Result<usize, S3Error> {
        let mut deleted = 0;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .max_keys(PAGE_SIZE)
                .send()
                .await
                .map_err(request_error("list objects"))?;

            for key in page.contents().iter().filter_map(|object| object.key()) {
                self.client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(request_error("delete object"))?;
                deleted += 1;
            }

            if !page.is_truncated().unwrap_or(false) {
                break;
            }
        }
        info!(message = "Bucket cleared.", %bucket, %prefix, deleted);
        Ok(deleted)
    }

    pub async fn delete_bucket(&self, bucket: &str) -> Result<(), S3Error> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(request_error("delete bucket"))?;
        info!(message = "Bucket deleted.", %bucket);
        Ok(())
    }
}

fn distinct(keys: impl IntoIterator<Item = String>) -> Vec<String> {
    keys.into_iter().collect::<IndexSet<_>>().into_iter().collect()
}

/// Keys relative to `path`, cut after their first `/`, without repeats.
pub fn direct_children(keys: &[String], path: &str) -> Vec<String> {
    distinct(keys.iter().map(|key| {
        let start = key.find(path).map_or(0, |at| at + path.len());
        let rest = &key[start..];
        match rest.find('/') {
            Some(slash) => rest[..=slash].to_owned(),
            None => rest.to_owned(),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn children_of_a_folder() {
        let listed = keys(&[
            "data/",
            "data/a.csv",
            "data/2024/01.csv",
            "data/2024/02.csv",
            "data/2025/01.csv",
        ]);
        assert_eq!(direct_children(&listed, "data/"), keys(&["", "a.csv", "2024/", "2025/"]));
    }

    #[test]
    fn children_of_the_root() {
        let listed = keys(&["a.txt", "logs/x", "logs/y", "tmp/z"]);
        assert_eq!(direct_children(&listed, ""), keys(&["a.txt", "logs/", "tmp/"]));
    }

    #[test]
    fn distinct_keeps_order() {
        assert_eq!(distinct(keys(&["b", "a", "b"])), keys(&["b", "a"]));
    }
}
