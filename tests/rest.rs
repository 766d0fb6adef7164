use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use bdt::{
    modify::{DataType, Modification},
    rest::{Login, RestClient, RestError},
};
use reqwest::Method;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|cell| (*cell).to_owned()).collect()
}

fn token(exp: i64) -> String {
    format!(
        "eyJhbGciOiJIUzI1NiJ9.{}.signature",
        URL_SAFE_NO_PAD.encode(json!({ "exp": exp, "sub": "admin" }).to_string())
    )
}

async fn client(server: &MockServer) -> RestClient {
    let mut rest = RestClient::new().unwrap();
    rest.set_host(&server.uri(), false).unwrap();
    rest
}

#[tokio::test]
async fn sends_headers_and_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/status"))
        .and(header("x-tenant", "NONE"))
        .and(header("authorization", "Basic YWRtaW46MTIzNA=="))
        .respond_with(ResponseTemplate::new(200).set_body_string("up"))
        .expect(1)
        .mount(&server)
        .await;

    let mut rest = client(&server).await;
    rest.set_header("x-tenant", "NONE").unwrap();
    let login: Login = "admin:1234".parse().unwrap();
    let response = rest
        .send(Method::GET, "/service/status", None, Some(&login))
        .await
        .unwrap();

    assert!(response.is(200));
    assert_eq!(response.body, "up");
    assert_eq!(rest.last().map(|last| last.status), Some(200));
}

#[tokio::test]
async fn header_rows_become_request_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user"))
        .and(header("cluster-owner", "true"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "id": "user1", "name": "qa" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let modifications = Modification::from_rows(&[
        row(&["$.id", "UPDATE", "user1"]),
        row(&["cluster-owner", "HEADER", "true"]),
    ])
    .unwrap();
    let mut rest = client(&server).await;
    let response = rest
        .send_data(
            Method::POST,
            "/api/user",
            r#"{"id":"x","name":"qa"}"#,
            DataType::Json,
            &modifications,
            None,
        )
        .await
        .unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn requires_a_host() {
    let mut rest = RestClient::new().unwrap();
    let error = rest.send(Method::GET, "/", None, None).await.unwrap_err();
    assert!(matches!(error, RestError::NotInitialized));
    assert_eq!(error.to_string(), "Rest Host or Rest Port are not initialized");
}

#[tokio::test]
async fn sso_sessions_are_cached() {
    let server = MockServer::start().await;
    let jwt = token(4_102_444_800);
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("stratio-cookie={jwt}; Path=/").as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gosec/baas/management/policies"))
        .and(header("cookie", format!("stratio-cookie={jwt}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut rest = client(&server).await;
    let login: Login = "admin:1234".parse().unwrap();
    rest.sso_login(&server.uri(), &login, Some("NONE"))
        .await
        .unwrap();
    rest.sso_login(&server.uri(), &login, Some("NONE"))
        .await
        .unwrap();

    let response = rest
        .send(Method::GET, "/gosec/baas/management/policies", None, None)
        .await
        .unwrap();
    assert!(response.is(200));
}

#[tokio::test]
async fn sso_cookies_survive_redirects() {
    let server = MockServer::start().await;
    let jwt = token(4_102_444_800);
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("set-cookie", format!("stratio-cookie={jwt}; Path=/").as_str())
                .insert_header("location", "/home"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/home"))
        .and(header("cookie", format!("stratio-cookie={jwt}").as_str()))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "JSESSIONID=s1; HttpOnly"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/service/status"))
        .and(header("cookie", format!("stratio-cookie={jwt}; JSESSIONID=s1").as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut rest = client(&server).await;
    let login: Login = "admin:1234".parse().unwrap();
    rest.sso_login(&server.uri(), &login, None).await.unwrap();
    assert_eq!(rest.jar().cookies().len(), 2);

    let response = rest.get("/service/status").await.unwrap();
    assert!(response.is(200));
}

#[tokio::test]
async fn rejected_sso_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut rest = client(&server).await;
    let login: Login = "admin:wrong".parse().unwrap();
    let error = rest
        .sso_login(&server.uri(), &login, None)
        .await
        .unwrap_err();
    assert!(matches!(error, RestError::Login { status: 401, .. }));
}
