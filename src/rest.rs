//! HTTP client shared by the REST, Gosec and Vault steps.

use std::{fmt, path::Path, str::FromStr};

use reqwest::{
    Method,
    header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, LOCATION, SET_COOKIE},
    redirect,
};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    cookies::{Cookie, CookieCache, CookieJar, STRATIO_COOKIE},
    modify::{self, DataType, Modification, Operation},
    properties::PropertyStore,
};

#[derive(Debug, Snafu)]
pub enum RestError {
    #[snafu(display("Rest Host or Rest Port are not initialized"))]
    NotInitialized,

    #[snafu(display("Unable to build HTTP client: {}", source))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("Invalid URL {}: {}", url, source))]
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

    #[snafu(display("Unable to read {}: {}", path, source))]
    ReadBody {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("{}", source))]
    Modify { source: modify::ModifyError },

    #[snafu(display("Invalid header {}: {}", name, value))]
    InvalidHeader { name: String, value: String },

    #[snafu(display("Invalid HTTP method {}", method))]
    InvalidMethod { method: String },

    #[snafu(display("Invalid login '{}': expected user:password", value))]
    InvalidLogin { value: String },

    #[snafu(display("SSO login at {} failed with status {}", url, status))]
    Login { url: String, status: u16 },

    #[snafu(display("SSO login at {} returned no cookies", url))]
    MissingToken { url: String },
}

pub type Result<T, E = RestError> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentType {
    #[default]
    Json,
    Text,
}

impl ContentType {
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain",
        }
    }
}

impl From<DataType> for ContentType {
    fn from(data_type: DataType) -> Self {
        if data_type.is_json() {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Body {
    pub content: String,
    pub content_type: ContentType,
}

impl Body {
    pub fn json(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Json,
        }
    }
}

/// `user:password` credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Login {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("user", &self.user)
            .field("password", &"**REDACTED**")
            .finish()
    }
}

impl FromStr for Login {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self> {
        let (user, password) = s.split_once(':').context(InvalidLoginSnafu { value: s })?;
        Ok(Self {
            user: user.to_owned(),
            password: password.to_owned(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl RestResponse {
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn is(&self, status: u16) -> bool {
        self.status == status
    }
}

pub fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .ok()
        .context(InvalidMethodSnafu { method })
}

/// Base URL for `host`, which may carry a port or a full scheme.
pub fn base_url(host: &str, secure: bool) -> Result<Url> {
    let url = if host.contains("://") {
        host.to_owned()
    } else {
        let scheme = if secure { "https" } else { "http" };
        format!("{scheme}://{host}")
    };
    Url::parse(&url).context(InvalidUrlSnafu { url })
}

/// Redirects followed by an SSO login before giving up.
pub const MAX_LOGIN_REDIRECTS: usize = 10;

#[derive(Debug)]
pub struct RestClient {
    http: reqwest::Client,
    sso: reqwest::Client,
    base: Option<Url>,
    headers: HeaderMap,
    jar: CookieJar,
    cache: CookieCache,
    last: Option<RestResponse>,
}

impl RestClient {
    /// Certificates are not verified: test clusters use self-signed ones.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context(BuildClientSnafu)?;
        // Login redirects are followed by hand so that cookies set on every
        // hop are kept.
        let sso = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(redirect::Policy::none())
            .build()
            .context(BuildClientSnafu)?;
        Ok(Self {
            http,
            sso,
            base: None,
            headers: HeaderMap::new(),
            jar: CookieJar::default(),
            cache: CookieCache::default(),
            last: None,
        })
    }

    pub fn set_host(&mut self, host: &str, secure: bool) -> Result<()> {
        let base = base_url(host, secure)?;
        info!(message = "REST endpoint set.", base = %base);
        self.base = Some(base);
        Ok(())
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let invalid = || InvalidHeaderSnafu { name, value }.build();
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.insert(header, value);
        Ok(())
    }

    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    pub fn jar(&mut self) -> &mut CookieJar {
        &mut self.jar
    }

    /// Response of the last request sent.
    pub fn last(&self) -> Option<&RestResponse> {
        self.last.as_ref()
    }

    fn url(&self, endpoint: &str) -> Result<Url> {
        let base = self.base.as_ref().context(NotInitializedSnafu)?;
        let url = format!("{}{}", base.as_str().trim_end_matches('/'), endpoint);
        Url::parse(&url).context(InvalidUrlSnafu { url })
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Body>,
        login: Option<&Login>,
        extra: &HeaderMap,
    ) -> Result<RestResponse> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .headers(self.headers.clone())
            .headers(extra.clone());
        if let Some(cookies) = self.jar.header() {
            request = request.header(COOKIE, cookies);
        }
        if let Some(login) = login {
            request = request.basic_auth(&login.user, Some(&login.password));
        }
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, body.content_type.mime())
                .body(body.content);
        }

        let context = || RequestSnafu {
            method: method.clone(),
            url: url.to_string(),
        };
        let response = request.send().await.with_context(|_| context())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await.with_context(|_| context())?;
        debug!(message = "Response received.", %method, %url, status);
        Ok(RestResponse {
            status,
            body,
            headers,
        })
    }

    /// Send a request to `endpoint`, relative to the configured host.
    pub async fn send(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<Body>,
        login: Option<&Login>,
    ) -> Result<RestResponse> {
        self.send_with_headers(method, endpoint, body, login, &HeaderMap::new())
            .await
    }

    async fn send_with_headers(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<Body>,
        login: Option<&Login>,
        headers: &HeaderMap,
    ) -> Result<RestResponse> {
        let url = self.url(endpoint)?;
        let response = self.execute(method, url, body, login, headers).await?;
        self.last = Some(response.clone());
        Ok(response)
    }

    pub async fn get(&mut self, endpoint: &str) -> Result<RestResponse> {
        self.send(Method::GET, endpoint, None, None).await
    }

    /// Send `base_file` (read from `resources`) after applying
    /// `modifications`. `HEADER` rows become request headers.
    pub async fn send_file(
        &mut self,
        method: Method,
        endpoint: &str,
        base_file: &Path,
        data_type: DataType,
        modifications: &[Modification],
        login: Option<&Login>,
    ) -> Result<RestResponse> {
        let data = tokio::fs::read_to_string(base_file)
            .await
            .context(ReadBodySnafu {
                path: base_file.display().to_string(),
            })?;
        self.send_data(method, endpoint, &data, data_type, modifications, login)
            .await
    }

    pub async fn send_data(
        &mut self,
        method: Method,
        endpoint: &str,
        data: &str,
        data_type: DataType,
        modifications: &[Modification],
        login: Option<&Login>,
    ) -> Result<RestResponse> {
        let (header_rows, edits): (Vec<_>, Vec<_>) = modifications
            .iter()
            .cloned()
            .partition(|m| m.operation == Operation::Header);

        let mut headers = HeaderMap::new();
        for row in header_rows {
            let invalid = || InvalidHeaderSnafu {
                name: &row.path,
                value: &row.value,
            };
            let name = HeaderName::from_bytes(row.path.as_bytes()).map_err(|_| invalid().build())?;
            let value = HeaderValue::from_str(&row.value).map_err(|_| invalid().build())?;
            headers.insert(name, value);
        }

        let content = modify::modify(data, data_type, &edits).context(ModifySnafu)?;
        let body = Body {
            content,
            content_type: data_type.into(),
        };
        self.send_with_headers(method, endpoint, Some(body), login, &headers)
            .await
    }

    /// Log in against the SSO at `sis_url` and keep the session cookies for
    /// the following requests. Sessions are cached per `tenant:user` until
    /// their token expires.
    pub async fn sso_login(
        &mut self,
        sis_url: &str,
        login: &Login,
        tenant: Option<&str>,
    ) -> Result<()> {
        let key = format!("{}:{}", tenant.unwrap_or("NONE"), login.user);
        let now = chrono::Utc::now().timestamp();
        if let Some(cookies) = self.cache.get_valid(&key, now) {
            debug!(message = "Reusing cached SSO session.", %key);
            let cookies = cookies.to_vec();
            self.jar.set(cookies);
            return Ok(());
        }

        let base = base_url(sis_url, true)?;
        let url = format!("{}/login", base.as_str().trim_end_matches('/'));
        let url = Url::parse(&url).context(InvalidUrlSnafu { url })?;

        let mut form = vec![
            ("username", login.user.as_str()),
            ("password", login.password.as_str()),
        ];
        if let Some(tenant) = tenant {
            form.push(("tenant", tenant));
        }

        let mut jar = CookieJar::default();
        let mut current = url.clone();
        let mut response = self
            .sso
            .post(url.clone())
            .form(&form)
            .send()
            .await
            .context(RequestSnafu {
                method: Method::POST,
                url: url.to_string(),
            })?;
        let mut hops = 0;
        loop {
            let status = response.status();
            ensure!(
                status.is_success() || status.is_redirection(),
                LoginSnafu {
                    url: current.to_string(),
                    status: status.as_u16(),
                }
            );
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .filter_map(Cookie::parse_set_cookie)
                .for_each(|cookie| jar.store(cookie));

            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|location| location.to_str().ok())
                .and_then(|location| current.join(location).ok());
            let Some(next) = next.filter(|_| status.is_redirection()) else {
                break;
            };
            if hops == MAX_LOGIN_REDIRECTS {
                warn!(message = "Too many SSO redirects; keeping the cookies collected so far.", url = %next);
                break;
            }
            hops += 1;
            debug!(message = "Following SSO redirect.", url = %next);

            let mut request = self.sso.get(next.clone());
            if let Some(cookies) = jar.header() {
                request = request.header(COOKIE, cookies);
            }
            response = request.send().await.context(RequestSnafu {
                method: Method::GET,
                url: next.to_string(),
            })?;
            current = next;
        }

        let cookies = jar.cookies().to_vec();
        ensure!(!cookies.is_empty(), MissingTokenSnafu { url: url.to_string() });

        let token = cookies
            .iter()
            .find(|cookie| cookie.name == STRATIO_COOKIE)
            .or_else(|| cookies.iter().find(|cookie| cookie.value.split('.').count() == 3))
            .map(|cookie| cookie.value.clone());
        match token {
            Some(token) => self.cache.insert(key, cookies.clone(), &token),
            None => warn!(message = "SSO login returned no token cookie; session not cached."),
        }
        info!(message = "SSO login done.", user = %login.user, tenant = tenant.unwrap_or("NONE"));
        self.jar.set(cookies);
        Ok(())
    }

    /// Prepare the connection to the cluster's central services for `tenant`.
    ///
    /// The REST host defaults to `ADMIN_URL`. When the SSO address (`SIS_URL`
    /// or `KEOS_SIS_HOST`) is known, logs in with `login` or with
    /// `KEOS_USER:KEOS_PASSWORD`.
    pub async fn set_cct_connection(
        &mut self,
        props: &PropertyStore,
        tenant: Option<&str>,
        login: Option<&Login>,
    ) -> Result<()> {
        if self.base.is_none()
            && let Some(admin) = props.non_empty("ADMIN_URL")
        {
            self.set_host(admin, true)?;
        }

        let Some(sis) = props
            .non_empty("SIS_URL")
            .or_else(|| props.non_empty("KEOS_SIS_HOST"))
        else {
            debug!(message = "No SSO address known; keeping current session.");
            return Ok(());
        };

        let default_login;
        let login = match login {
            Some(login) => login,
            None => {
                default_login = Login {
                    user: props.get("KEOS_USER").unwrap_or("admin").to_owned(),
                    password: props.get("KEOS_PASSWORD").unwrap_or("1234").to_owned(),
                };
                &default_login
            }
        };
        let tenant = tenant.or_else(|| props.non_empty("KEOS_TENANT"));
        self.sso_login(sis, login, tenant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls() {
        assert_eq!(base_url("admin.keos:443", true).unwrap().as_str(), "https://admin.keos/");
        assert_eq!(base_url("10.0.0.1:8080", false).unwrap().as_str(), "http://10.0.0.1:8080/");
        assert_eq!(
            base_url("http://localhost:9000", true).unwrap().as_str(),
            "http://localhost:9000/"
        );
    }

    #[test]
    fn endpoints_keep_queries() {
        let mut client = RestClient::new().unwrap();
        assert!(matches!(client.url("/x"), Err(RestError::NotInitialized)));

        client.set_host("gosec.keos", true).unwrap();
        assert_eq!(
            client.url("/gosec/baas/management/policy?pid=abc").unwrap().as_str(),
            "https://gosec.keos/gosec/baas/management/policy?pid=abc"
        );
    }

    #[test]
    fn logins() {
        let login: Login = "admin:s3cr:et".parse().unwrap();
        assert_eq!(login.user, "admin");
        assert_eq!(login.password, "s3cr:et");
        assert!("nopassword".parse::<Login>().is_err());
        assert!(!format!("{login:?}").contains("s3cr"));
    }

    #[test]
    fn methods() {
        assert_eq!(parse_method("patch").unwrap(), Method::PATCH);
        assert_eq!(
            RestError::NotInitialized.to_string(),
            "Rest Host or Rest Port are not initialized"
        );
    }
}
