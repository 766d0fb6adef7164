//! Vault secrets, written through the keos-operator CLI or the Vault HTTP API.

use reqwest::Method;
use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, info};
use url::Url;

use crate::{
    k8s::{self, Framework, ResourceKind, port_forward::Target, resource::ListFilter},
    keos::{OPERATOR_LABELS, OPERATOR_NAMESPACE},
};

const VAULT_SERVICE: &str = "vault";
const VAULT_NAMESPACE: &str = "keos-core";
const VAULT_PORT: u16 = 8200;
const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";
const OPERATOR_SUCCESS: &str = "Success!";

#[derive(Debug, Snafu)]
pub enum SecretsError {
    #[snafu(display("{}", source))]
    Cluster { source: k8s::Error },

    #[snafu(display("No keos-operator pod found in {}", OPERATOR_NAMESPACE))]
    OperatorNotFound,

    #[snafu(display("keos-operator output does not contain 'Success!': {}", output))]
    OperatorFailed { output: String },

    #[snafu(display("VAULT_TOKEN is not defined; load the Keos workspace first"))]
    MissingToken,

    #[snafu(display("Unable to build HTTP client: {}", source))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("Invalid Vault URL {}: {}", url, source))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[snafu(display("{} {} failed: {}", method, url, source))]
    Request {
        method: Method,
        url: String,
        source: reqwest::Error,
    },

    #[snafu(display("{} {} returned status {}: {}", method, url, status, body))]
    VaultStatus {
        method: Method,
        url: String,
        status: u16,
        body: String,
    },
}

pub type Result<T, E = SecretsError> = std::result::Result<T, E>;

/// `keos vault write` invocation storing `params` under `path`.
pub fn operator_write_command(path: &str, params: &[(String, String)]) -> String {
    params
        .iter()
        .fold(format!("keos vault write {path}"), |mut command, (key, value)| {
            command.push_str(&format!(" {key}='{value}'"));
            command
        })
}

pub fn operator_delete_command(path: &str) -> String {
    format!("keos vault delete {path}")
}

/// Run a `keos vault` command in the keos-operator pod.
async fn run_in_operator(framework: &Framework, command: &str) -> Result<()> {
    let pods = framework
        .list_names(
            ResourceKind::Pod,
            Some(OPERATOR_NAMESPACE),
            &ListFilter {
                labels: Some(OPERATOR_LABELS.to_owned()),
                fields: None,
            },
        )
        .await
        .context(ClusterSnafu)?;
    let pod = pods.lines().next().context(OperatorNotFoundSnafu)?;

    info!(message = "Running keos-operator command.", %pod, %command);
    let output = framework
        .exec_shell(pod, OPERATOR_NAMESPACE, None, command)
        .await
        .context(ClusterSnafu)?;
    debug!(message = "keos-operator output.", stdout = %output.stdout);
    ensure!(
        output.stdout.contains(OPERATOR_SUCCESS),
        OperatorFailedSnafu {
            output: output.stdout,
        }
    );
    Ok(())
}

pub async fn operator_write(
    framework: &Framework,
    path: &str,
    params: &[(String, String)],
) -> Result<()> {
    run_in_operator(framework, &operator_write_command(path, params)).await
}

pub async fn operator_delete(framework: &Framework, path: &str) -> Result<()> {
    run_in_operator(framework, &operator_delete_command(path)).await
}

/// Minimal Vault HTTP client.
#[derive(Debug)]
pub struct VaultClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl VaultClient {
    pub fn new(base: Url, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context(BuildClientSnafu)?;
        Ok(Self {
            http,
            base,
            token: token.into(),
        })
    }

    /// Client for the Vault listener forwarded to this machine.
    pub fn forwarded(token: impl Into<String>) -> Result<Self> {
        let url = format!("https://127.0.0.1:{VAULT_PORT}");
        let base = Url::parse(&url).context(InvalidUrlSnafu { url })?;
        Self::new(base, token)
    }

    fn url(&self, path: &str) -> Result<Url> {
        let url = format!(
            "{}/v1/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&url).context(InvalidUrlSnafu { url })
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<u16> {
        let url = self.url(path)?;
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(VAULT_TOKEN_HEADER, &self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.context(RequestSnafu {
            method: method.clone(),
            url: url.as_str(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return VaultStatusSnafu {
                method,
                url: url.as_str(),
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        info!(message = "Vault request done.", %method, %path, status = status.as_u16());
        Ok(status.as_u16())
    }

    /// Store `params` as string fields of the secret at `path`.
    pub async fn write(&self, path: &str, params: &[(String, String)]) -> Result<u16> {
        let data: Map<String, Value> = params
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
            .collect();
        self.send(Method::POST, path, Some(Value::Object(data)))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<u16> {
        self.send(Method::DELETE, path, None).await
    }
}

/// Run `request` against Vault through a port forward to the `vault` service.
/// The forward is closed whatever the outcome.
async fn through_forward<F, Fut>(framework: &mut Framework, token: &str, request: F) -> Result<u16>
where
    F: FnOnce(VaultClient) -> Fut,
    Fut: Future<Output = Result<u16>>,
{
    let id = framework
        .forward_port(
            Target::Service,
            VAULT_SERVICE,
            Some(VAULT_NAMESPACE),
            VAULT_PORT,
            VAULT_PORT,
            None,
        )
        .await
        .context(ClusterSnafu)?;
    let result = match VaultClient::forwarded(token) {
        Ok(client) => request(client).await,
        Err(error) => Err(error),
    };
    framework
        .close_port_forward(Some(&id))
        .context(ClusterSnafu)?;
    result
}

pub async fn vault_write(
    framework: &mut Framework,
    token: Option<&str>,
    path: &str,
    params: &[(String, String)],
) -> Result<()> {
    let token = token.context(MissingTokenSnafu)?;
    through_forward(framework, token, |client| async move {
        client.write(path, params).await
    })
    .await?;
    Ok(())
}

pub async fn vault_delete(framework: &mut Framework, token: Option<&str>, path: &str) -> Result<()> {
    let token = token.context(MissingTokenSnafu)?;
    through_forward(framework, token, |client| async move { client.delete(path).await }).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;

    fn params() -> Vec<(String, String)> {
        vec![
            ("user".to_owned(), "qa".to_owned()),
            ("pass".to_owned(), "s3cret".to_owned()),
        ]
    }

    #[test]
    fn operator_commands() {
        assert_eq!(
            operator_write_command("/userland/passwords/app/db", &params()),
            "keos vault write /userland/passwords/app/db user='qa' pass='s3cret'"
        );
        assert_eq!(
            operator_delete_command("/userland/passwords/app/db"),
            "keos vault delete /userland/passwords/app/db"
        );
    }

    #[tokio::test]
    async fn writes_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/userland/passwords/app"))
            .and(header(VAULT_TOKEN_HEADER, "root-token"))
            .and(body_json(serde_json::json!({"user": "qa", "pass": "s3cret"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let client = VaultClient::new(base, "root-token").unwrap();
        assert_eq!(client.write("/userland/passwords/app", &params()).await.unwrap(), 204);
    }

    #[tokio::test]
    async fn rejected_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/userland/passwords/app"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let client = VaultClient::new(base, "bad-token").unwrap();
        let error = client.delete("userland/passwords/app").await.unwrap_err();
        assert!(matches!(error, SecretsError::VaultStatus { status: 403, .. }));
        assert!(error.to_string().contains("permission denied"));
    }
}
