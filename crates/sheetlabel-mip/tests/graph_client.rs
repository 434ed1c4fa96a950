//! GraphClient against a local mock of the token and label endpoints.
//!
//! The blocking HTTP client must not run on the async runtime, so each
//! scenario builds, uses and drops its client inside `spawn_blocking`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use sheetlabel_mip::metadata;
use sheetlabel_mip::profile::CacheLock;
use sheetlabel_mip::{
    CacheStorageType, ClassificationClient, ClientSecret, ComponentScope, Consent, ConsentDelegate,
    Credential, Engine, EngineSettings, GraphClient, GraphEndpoints, Identity, Label,
    LabelingOptions, MipError, ProfileSettings, ProtectionSettings,
};
use sheetlabel_table::{Column, Schema, SpreadsheetBuilder, Table, Value, XlsxTableWriter};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "user@contoso.com";
const LABELS_PATH: &str = "/users/user@contoso.com/security/informationProtection/sensitivityLabels";

fn endpoints(server: &MockServer) -> GraphEndpoints {
    GraphEndpoints {
        authority: server.uri(),
        label_service: server.uri(),
        resource_scope: "api://labels/.default".to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn catalog() -> serde_json::Value {
    json!({
        "value": [
            { "id": "L1", "name": "Internal", "sensitivity": 1 },
            { "id": "L2", "name": "Confidential", "sensitivity": 2, "tooltip": "Business data" },
            { "id": "L3", "name": "Highly Confidential", "sensitivity": 3, "hasProtection": true }
        ]
    })
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=app-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "token-abc"
        })))
        .mount(server)
        .await;
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(LABELS_PATH))
        .and(header("authorization", "Bearer token-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog()))
        .mount(server)
        .await;
}

fn write_sheet(path: &Path) {
    let schema = Schema::new(vec![Column::integer("ID"), Column::text("Name")]).unwrap();
    let mut table = Table::new("Employees", schema);
    table.push_row([Value::from(1), Value::from("A")]).unwrap();
    XlsxTableWriter::default()
        .write_table(&table, "Employees", path)
        .unwrap();
}

fn credential() -> Credential {
    Credential::valid_for("token-abc", "tenant-1", chrono::Duration::hours(1))
}

#[tokio::test]
async fn test_authenticate_returns_token() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    let endpoints = endpoints(&server);

    let credential = tokio::task::spawn_blocking(move || {
        let mut client = GraphClient::new(endpoints).unwrap();
        let context = client.initialize(ComponentScope::File).unwrap();
        let app = client.application_info("app-id", "sheetlabel", "1.0.0");
        let credential = client.authenticate(&app, "tenant-1", &ClientSecret::new("s3cret"));
        client.shutdown(context).unwrap();
        credential
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(credential.access_token(), "token-abc");
    assert_eq!(credential.tenant_id(), "tenant-1");
    assert!(!credential.is_expired_at(chrono::Utc::now()));
}

#[tokio::test]
async fn test_rejected_secret_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .expect(1)
        .mount(&server)
        .await;
    let endpoints = endpoints(&server);

    let result = tokio::task::spawn_blocking(move || {
        let mut client = GraphClient::new(endpoints).unwrap();
        let context = client.initialize(ComponentScope::File).unwrap();
        let app = client.application_info("app-id", "sheetlabel", "1.0.0");
        let result = client.authenticate(&app, "tenant-1", &ClientSecret::new("wrong"));
        client.shutdown(context).unwrap();
        result
    })
    .await
    .unwrap();

    match result {
        Err(MipError::Auth(reason)) => assert!(reason.starts_with("invalid_client: AADSTS7000215")),
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_add_engine_follows_next_link_and_caches_catalog() {
    let server = MockServer::start().await;
    let next = format!("{}/catalog/page-2", server.uri());
    Mock::given(method("GET"))
        .and(path(LABELS_PATH))
        .and(header("accept-language", "es-ES"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "L1", "name": "Interno", "sensitivity": 1 }],
            "@odata.nextLink": next
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/catalog/page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "L2", "name": "Confidencial", "sensitivity": 2 }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let endpoints = endpoints(&server);
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("mip_data");
    let settings = ProfileSettings::new(&data_dir, CacheStorageType::OnDisk);

    let names = tokio::task::spawn_blocking(move || {
        let mut client = GraphClient::new(endpoints).unwrap();
        let context = client.initialize(ComponentScope::File).unwrap();
        let profile = client.load_profile(&context, &settings).unwrap();
        let engine = client
            .add_engine(
                &profile,
                &EngineSettings::new(Identity::new(USER)).with_locale("es-ES"),
                &credential(),
            )
            .unwrap();
        client.shutdown(context).unwrap();
        engine
            .labels()
            .iter()
            .map(|l| l.name.clone())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap();

    assert_eq!(names, vec!["Interno", "Confidencial"]);
    let cached = std::fs::read_to_string(data_dir.join(USER).join("labels.json")).unwrap();
    assert!(cached.contains("Confidencial"));
}

#[tokio::test]
async fn test_forbidden_catalog_is_engine_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LABELS_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let endpoints = endpoints(&server);

    let result = tokio::task::spawn_blocking(move || {
        let mut client = GraphClient::new(endpoints).unwrap();
        let context = client.initialize(ComponentScope::File).unwrap();
        let profile = client
            .load_profile(&context, &ProfileSettings::new("unused", CacheStorageType::InMemory))
            .unwrap();
        let result = client.add_engine(
            &profile,
            &EngineSettings::new(Identity::new(USER)),
            &credential(),
        );
        client.shutdown(context).unwrap();
        result
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(MipError::Engine(msg)) if msg.contains("403")));
}

struct RejectAll;

impl ConsentDelegate for RejectAll {
    fn get_user_consent(&self, _url: &str) -> Consent {
        Consent::Reject
    }
}

#[tokio::test]
async fn test_rejected_consent_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog()))
        .expect(0)
        .mount(&server)
        .await;
    let endpoints = endpoints(&server);

    let result = tokio::task::spawn_blocking(move || {
        let mut client = GraphClient::new(endpoints).unwrap();
        let context = client.initialize(ComponentScope::File).unwrap();
        let settings = ProfileSettings::new("unused", CacheStorageType::InMemory)
            .with_consent(Arc::new(RejectAll));
        let profile = client.load_profile(&context, &settings).unwrap();
        let result = client.add_engine(
            &profile,
            &EngineSettings::new(Identity::new(USER)),
            &credential(),
        );
        client.shutdown(context).unwrap();
        result
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(MipError::Engine(msg)) if msg.contains("consent denied")));
}

#[tokio::test]
async fn test_label_committed_to_spreadsheet() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_catalog(&server).await;
    let endpoints = endpoints(&server);
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("mip_data");
    let sheet = dir.path().join("Employees.xlsx");
    write_sheet(&sheet);

    let (lock_held, outcome, reapplied) = {
        let data_dir = data_dir.clone();
        let sheet = sheet.clone();
        tokio::task::spawn_blocking(move || {
            let mut client = GraphClient::new(endpoints).unwrap();
            let context = client.initialize(ComponentScope::File).unwrap();
            let app = client.application_info("app-id", "sheetlabel", "1.0.0");
            let credential = client
                .authenticate(&app, "tenant-1", &ClientSecret::new("s3cret"))
                .unwrap();
            let profile = client
                .load_profile(&context, &ProfileSettings::new(&data_dir, CacheStorageType::OnDisk))
                .unwrap();
            let lock_held = data_dir.join(CacheLock::FILE_NAME).exists();
            let engine = client
                .add_engine(&profile, &EngineSettings::new(Identity::new(USER)), &credential)
                .unwrap();

            let mut handler = client.open_file_handler(&engine, &sheet, true).unwrap();
            let label = client.resolve_label(&engine, "l2").unwrap();
            let options = LabelingOptions::default();
            let protection = ProtectionSettings::default();
            client.set_label(&mut handler, &label, &options, &protection).unwrap();
            let outcome = client.commit(&engine, &mut handler, &sheet).unwrap();

            // Same label again on the same file is a no-op
            let mut again = client.open_file_handler(&engine, &sheet, true).unwrap();
            client.set_label(&mut again, &label, &options, &protection).unwrap();
            let reapplied = client.commit(&engine, &mut again, &sheet).unwrap();

            client.shutdown(context).unwrap();
            (lock_held, outcome, reapplied)
        })
        .await
        .unwrap()
    };

    assert!(lock_held);
    assert!(!data_dir.join(CacheLock::FILE_NAME).exists());
    assert!(outcome.changed);
    assert!(!reapplied.changed);

    let stamped = metadata::read_label(&sheet).unwrap().unwrap();
    assert_eq!(stamped.label_id, "L2");
    assert_eq!(stamped.name, "Confidential");
    assert_eq!(stamped.method.as_deref(), Some("Standard"));
    assert_eq!(stamped.site_id.as_deref(), Some("tenant-1"));
    assert_eq!(stamped.action_id, Some(outcome.action_id.to_string()));
}

#[tokio::test]
async fn test_protected_label_leaves_file_untouched() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let endpoints = endpoints(&server);
    let dir = tempfile::tempdir().unwrap();
    let sheet = dir.path().join("Employees.xlsx");
    write_sheet(&sheet);
    let before = std::fs::read(&sheet).unwrap();

    let result = {
        let sheet = sheet.clone();
        tokio::task::spawn_blocking(move || {
            let mut client = GraphClient::new(endpoints).unwrap();
            let context = client.initialize(ComponentScope::File).unwrap();
            let profile = client
                .load_profile(&context, &ProfileSettings::new("unused", CacheStorageType::InMemory))
                .unwrap();
            let engine = client
                .add_engine(&profile, &EngineSettings::new(Identity::new(USER)), &credential())
                .unwrap();
            let mut handler = client.open_file_handler(&engine, &sheet, true).unwrap();
            let label = client.resolve_label(&engine, "L3").unwrap();
            client
                .set_label(
                    &mut handler,
                    &label,
                    &LabelingOptions::default(),
                    &ProtectionSettings::default(),
                )
                .unwrap();
            let result = client.commit(&engine, &mut handler, &sheet);
            client.shutdown(context).unwrap();
            result
        })
        .await
        .unwrap()
    };

    assert!(matches!(result, Err(MipError::Commit(_))));
    assert_eq!(std::fs::read(&sheet).unwrap(), before);
}

#[test]
fn test_missing_file_is_file_access_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = GraphClient::new(GraphEndpoints::default()).unwrap();
    let context = client.initialize(ComponentScope::File).unwrap();
    let engine = Engine::new(
        uuid::Uuid::new_v4(),
        EngineSettings::new(Identity::new(USER)),
        "tenant-1",
        vec![],
    );

    let missing = dir.path().join("missing.xlsx");
    let err = client.open_file_handler(&engine, &missing, true).unwrap_err();
    assert!(matches!(err, MipError::FileAccess { path, .. } if path == missing));
    client.shutdown(context).unwrap();
}

#[test]
fn test_double_initialize_rejected() {
    let mut client = GraphClient::new(GraphEndpoints::default()).unwrap();
    let context = client.initialize(ComponentScope::File).unwrap();
    assert!(matches!(
        client.initialize(ComponentScope::File),
        Err(MipError::AlreadyInitialized)
    ));
    client.shutdown(context).unwrap();
}

/// Endpoints on a local port with nothing listening
fn unreachable_endpoints() -> GraphEndpoints {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    GraphEndpoints {
        authority: uri.clone(),
        label_service: uri,
        resource_scope: "api://labels/.default".to_string(),
        timeout: Duration::from_secs(5),
    }
}

#[test]
fn test_unreachable_service_falls_back_to_cached_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("mip_data");
    let cache = data_dir.join(USER).join("labels.json");
    std::fs::create_dir_all(cache.parent().unwrap()).unwrap();
    let cached = vec![
        Label::new("L1", "Internal").with_sensitivity(1),
        Label::new("L2", "Confidential").with_sensitivity(2),
    ];
    std::fs::write(&cache, serde_json::to_vec(&cached).unwrap()).unwrap();

    let mut client = GraphClient::new(unreachable_endpoints()).unwrap();
    let context = client.initialize(ComponentScope::File).unwrap();
    let profile = client
        .load_profile(&context, &ProfileSettings::new(&data_dir, CacheStorageType::OnDisk))
        .unwrap();
    let engine = client
        .add_engine(&profile, &EngineSettings::new(Identity::new(USER)), &credential())
        .unwrap();
    client.shutdown(context).unwrap();

    assert_eq!(engine.labels(), cached.as_slice());
    assert_eq!(engine.label_by_id("l2").unwrap().name, "Confidential");
}

#[test]
fn test_unreachable_service_without_cache_is_engine_error() {
    let mut client = GraphClient::new(unreachable_endpoints()).unwrap();
    let context = client.initialize(ComponentScope::File).unwrap();
    let profile = client
        .load_profile(&context, &ProfileSettings::new("unused", CacheStorageType::InMemory))
        .unwrap();
    let result = client.add_engine(
        &profile,
        &EngineSettings::new(Identity::new(USER)),
        &credential(),
    );
    client.shutdown(context).unwrap();

    assert!(matches!(result, Err(MipError::Engine(msg)) if msg.contains("unreachable")));
}

#[test]
fn test_identity_cannot_escape_cache_directory() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("mip_data");

    let mut client = GraphClient::new(unreachable_endpoints()).unwrap();
    let context = client.initialize(ComponentScope::File).unwrap();
    let profile = client
        .load_profile(&context, &ProfileSettings::new(&data_dir, CacheStorageType::OnDisk))
        .unwrap();
    for identity in ["../escaped", "a/b", "..", "a\\b"] {
        let result = client.add_engine(
            &profile,
            &EngineSettings::new(Identity::new(identity)),
            &credential(),
        );
        assert!(matches!(result, Err(MipError::Engine(_))), "{}", identity);
    }
    client.shutdown(context).unwrap();

    assert!(!dir.path().join("escaped").exists());
}

#[test]
fn test_policy_scope_cannot_label_files() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = dir.path().join("Employees.xlsx");
    write_sheet(&sheet);
    let before = std::fs::read(&sheet).unwrap();
    let engine = Engine::new(
        uuid::Uuid::new_v4(),
        EngineSettings::new(Identity::new(USER)),
        "tenant-1",
        vec![Label::new("L1", "Internal")],
    );

    let mut client = GraphClient::new(GraphEndpoints::default()).unwrap();
    let context = client.initialize(ComponentScope::Policy).unwrap();

    let err = client.open_file_handler(&engine, &sheet, true).unwrap_err();
    assert!(matches!(
        err,
        MipError::WrongScope {
            required: ComponentScope::File,
            found: ComponentScope::Policy
        }
    ));

    let mut handler = sheetlabel_mip::FileHandler::open(&engine, &sheet, true, None);
    let label = Label::new("L1", "Internal");
    let staged = client.set_label(
        &mut handler,
        &label,
        &LabelingOptions::default(),
        &ProtectionSettings::default(),
    );
    assert!(matches!(staged, Err(MipError::WrongScope { .. })));
    handler
        .stage(&label, &LabelingOptions::default(), &ProtectionSettings::default())
        .unwrap();
    assert!(matches!(
        client.commit(&engine, &mut handler, &sheet),
        Err(MipError::WrongScope { .. })
    ));
    client.shutdown(context).unwrap();

    assert_eq!(std::fs::read(&sheet).unwrap(), before);
}
