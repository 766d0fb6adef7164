use bdt::{config::Settings, steps::BdtWorld};
use cucumber::{StatsWriter as _, World as _};
use serde_json::json;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path, query_param},
};

const FEATURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/features");
const RESOURCES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/resources");

const KEOS_POLICIES: &str = "/gosec/baas/management/policies";
const KEOS_POLICY: &str = "/gosec/baas/management/policy";

const BUCKETS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Owner><ID>qa</ID><DisplayName>qa</DisplayName></Owner>
  <Buckets>
    <Bucket><Name>bucket-a</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>
    <Bucket><Name>bucket-b</Name><CreationDate>2024-01-02T00:00:00.000Z</CreationDate></Bucket>
  </Buckets>
</ListAllMyBucketsResult>"#;

async fn service() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "up" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_partial_json(json!({ "name": "widget", "size": 1 })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(KEOS_POLICIES))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "list": [{ "name": "p1", "pid": "42" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEOS_POLICY))
        .and(query_param("pid", "42"))
        .respond_with(ResponseTemplate::new(200))
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
        .and(body_partial_json(json!({ "name": "p2" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    server
}

async fn object_store() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(BUCKETS),
        )
        .mount(&server)
        .await;
    server
}

// Both features share the process-wide session, so they run in this order
// from a single test.
#[tokio::test]
async fn features() {
    let service = service().await;
    let s3 = object_store().await;
    let output = TempDir::new().unwrap();
    let s3_endpoint = s3.uri();
    let output_dir = output.path().display().to_string();
    Settings::from_lookup(|name| match name {
        "BDT_RESOURCES_DIR" => Some(RESOURCES.to_owned()),
        "BDT_OUTPUT_DIR" => Some(output_dir.clone()),
        "AWS_ENDPOINT_URL" => Some(s3_endpoint.clone()),
        "AWS_ACCESS_KEY_ID" => Some("AKIAQA".to_owned()),
        "AWS_SECRET_ACCESS_KEY" => Some("secret".to_owned()),
        _ => None,
    })
    .unwrap()
    .install();

    let mut world = BdtWorld::resume().await;
    world.props.set("MOCK_HOST", service.uri());
    drop(world);

    let session = BdtWorld::cucumber()
        .max_concurrent_scenarios(1)
        .with_default_cli()
        .run(format!("{FEATURES}/session.feature"))
        .await;
    assert_eq!(session.parsing_errors(), 0);
    assert_eq!(session.skipped_steps(), 0);
    assert_eq!(session.failed_steps(), 0);
    assert_eq!(session.passed_steps(), 17);

    let world = BdtWorld::resume().await;
    assert_eq!(world.props.get("POLICY_ID"), Some("42"));
    assert_eq!(world.props.get("BUCKETS"), Some("bucket-a\nbucket-b"));
    drop(world);

    let catalogue = BdtWorld::cucumber()
        .max_concurrent_scenarios(1)
        .with_default_cli()
        .run(format!("{FEATURES}/catalogue.feature"))
        .await;
    assert_eq!(catalogue.parsing_errors(), 0);
    assert_eq!(catalogue.skipped_steps(), 0);
    assert_eq!(
        catalogue.passed_steps() + catalogue.failed_steps(),
        53,
        "every step should have run"
    );
}
