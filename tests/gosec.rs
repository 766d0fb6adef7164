use std::io::Write;

use bdt::{
    config::Settings,
    gosec::{BodyTemplate, Gosec, GosecError, Identity, Resource, Scope},
    modify::{DataType, Modification},
    properties::{KEOS_ENV, PropertyStore},
    rest::RestClient,
};
use serde_json::json;
use tempfile::NamedTempFile;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_partial_json, method, path, query_param},
};

const KEOS_POLICIES: &str = "/gosec/baas/management/policies";
const KEOS_POLICY: &str = "/gosec/baas/management/policy";

struct Session {
    rest: RestClient,
    props: PropertyStore,
    settings: Settings,
}

impl Session {
    fn new(server: &MockServer, keos: bool) -> Self {
        let mut rest = RestClient::new().unwrap();
        rest.set_host(&server.uri(), false).unwrap();
        let mut props = PropertyStore::new();
        props.set(KEOS_ENV, keos.to_string());
        Self {
            rest,
            props,
            settings: Settings::default(),
        }
    }

    fn gosec(&mut self) -> Gosec<'_> {
        Gosec::new(&mut self.rest, &mut self.props, None, &self.settings)
    }
}

fn policy_body(name: &str) -> (NamedTempFile, BodyTemplate) {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"name":"template","services":[]}}"#).unwrap();
    let modifications = Modification::from_rows(&[vec![
        "$.name".to_owned(),
        "UPDATE".to_owned(),
        name.to_owned(),
    ]])
    .unwrap();
    let body = BodyTemplate {
        path: file.path().to_path_buf(),
        data_type: DataType::Json,
        modifications,
    };
    (file, body)
}

#[tokio::test]
async fn creates_missing_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICIES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICY))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(KEOS_POLICY))
        .and(body_partial_json(json!({ "name": "p1" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (_file, body) = policy_body("p1");
    let mut session = Session::new(&server, true);
    session
        .gosec()
        .create_resource(Resource::Policy, "p1", &Scope::default(), None, &body, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn replaces_existing_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICIES))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "list": [{ "name": "p1", "pid": "42" }] })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICIES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICY))
        .and(query_param("pid", "42"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICY))
        .and(query_param("pid", "thisPolicyDoesNotExistId"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(KEOS_POLICY))
        .and(query_param("pid", "42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(KEOS_POLICY))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (_file, body) = policy_body("p1");
    let mut session = Session::new(&server, true);
    session
        .gosec()
        .create_resource(Resource::Policy, "p1", &Scope::default(), None, &body, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn addresses_policy_by_name_when_listing_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICIES))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICY))
        .and(query_param("pid", "p1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(KEOS_POLICY))
        .and(query_param("pid", "p1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Session::new(&server, true);
    session
        .gosec()
        .delete_resource(Resource::Policy, "p1", &Scope::default(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn strips_whitespace_from_dcos_collection_policies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/gosec-management-baas/management/policies/domains"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "list": [{ "name": "mycollection", "pid": "9" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/service/gosec-management-baas/management/policy/domain"))
        .and(query_param("pid", "9"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/service/gosec-management-baas/management/policy/domain"))
        .and(query_param("pid", "9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Session::new(&server, false);
    session.props.set("gosec-management-baas_version", "1.2.0");
    session
        .gosec()
        .delete_resource(Resource::CollectionPolicy, "my collection", &Scope::default(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn saves_policy_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICIES))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "list": [{ "name": "p1", "pid": "7f3a" }] })),
        )
        .mount(&server)
        .await;

    let mut session = Session::new(&server, true);
    session
        .gosec()
        .policy_id(false, "p1", &Scope::default(), "POLICY_ID")
        .await
        .unwrap();
    assert_eq!(session.props.get("POLICY_ID"), Some("7f3a"));

    let error = session
        .gosec()
        .policy_id(false, "p2", &Scope::default(), "POLICY_ID")
        .await
        .unwrap_err();
    assert!(matches!(error, GosecError::PolicyIdNotFound { .. }));
    assert_eq!(error.to_string(), "Error obtaining ID from policy p2");
}

#[tokio::test]
async fn includes_user_in_tenant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/gosec-identities-daas/identities/users"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "list": [{ "uid": "qa" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/service/gosec-identities-daas/identities/tenants/t1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": "t1", "uids": ["ops"] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/service/gosec-identities-daas/identities/tenants/t1"))
        .and(body_json(json!({ "name": "t1", "uids": ["ops", "qa"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Session::new(&server, false);
    session
        .gosec()
        .include_in_tenant(Identity::User, "qa", "t1")
        .await
        .unwrap();
}

#[tokio::test]
async fn leaves_tenant_untouched_when_already_member() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/gosec-identities-daas/identities/users"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "list": [{ "uid": "qa" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/service/gosec-identities-daas/identities/tenants/t1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": "t1", "uids": ["qa"] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = Session::new(&server, false);
    session
        .gosec()
        .include_in_tenant(Identity::User, "qa", "t1")
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_identity_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/gosec-identities-daas/identities/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": [] })))
        .mount(&server)
        .await;

    let mut session = Session::new(&server, false);
    let result = session
        .gosec()
        .remove_from_tenant(Identity::Group, "devs", "t1")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn deletes_legacy_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/gosecmanagement/api/user"))
        .and(query_param("id", "qauser"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/service/gosecmanagement/api/user"))
        .and(query_param("id", "qauser"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Session::new(&server, false);
    session
        .gosec()
        .delete_resource(Resource::User, "qa user", &Scope::default(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn creates_encryption_key_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/service/gosec-management-baas/management/encryption/key"))
        .and(body_json(json!({ "name": "k1", "assets": [] })))
        .respond_with(ResponseTemplate::new(409))
        .expect(2)
        .mount(&server)
        .await;

    let mut session = Session::new(&server, false);
    let login = "admin:1234".parse().unwrap();
    session
        .gosec()
        .create_key("k1", None, "NONE", &login, true)
        .await
        .unwrap();
    assert!(
        session
            .gosec()
            .create_key("k1", None, "NONE", &login, false)
            .await
            .is_err()
    );
}
