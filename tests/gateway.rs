//! End-to-end tests through the HTTP listener.

use reqwest::StatusCode;
use serde_json::{json, Value};

use query_gateway::backend::BackendRegistry;

mod common;

use common::{start_gateway, Recorder};

fn sqlite_document(db: &std::path::Path) -> String {
    json!({
        "debug": true,
        "DB": {
            "default": {"type": "sqlite", "filename": db.to_string_lossy(), "create": true}
        },
        "REST": {
            "POST/setup": {"query": "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)"},
            "POST/users": {
                "query": "INSERT INTO users (id, name) VALUES (:id, :name)",
                "params": [
                    {"path": "request.id", "name": "id", "type": "int"},
                    {"path": "request.name", "name": "name", "type": "string"}
                ]
            },
            "GET/users": {"query": "SELECT id, name FROM users ORDER BY id"},
            "GET/users/:id": {"query": "SELECT id, name FROM users WHERE id = ?", "params": ["path.id"]},
            "GET/search": {
                "query": "SELECT id, name FROM users WHERE name LIKE ?",
                "params": ["query.q"]
            },
            "GET/api": {"special": "api"}
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_sqlite_end_to_end() {
    let data = tempfile::tempdir().unwrap();
    let gateway = start_gateway(
        &sqlite_document(&data.path().join("app.db")),
        BackendRegistry::with_defaults(),
    )
    .await;
    let client = reqwest::Client::new();

    let res = client.post(gateway.url("/setup")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!([]));

    for (id, name) in [(1, "ada"), (2, "grace")] {
        let res = client
            .post(gateway.url("/users"))
            .json(&json!({"id": id, "name": name}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let rows: Value = client.get(gateway.url("/users")).send().await.unwrap().json().await.unwrap();
    assert_eq!(rows, json!([{"id": 1, "name": "ada"}, {"id": 2, "name": "grace"}]));

    let rows: Value = client.get(gateway.url("/users/2")).send().await.unwrap().json().await.unwrap();
    assert_eq!(rows, json!([{"id": 2, "name": "grace"}]));

    let rows: Value = client
        .get(gateway.url("/search?q=gr%25"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rows, json!([{"id": 2, "name": "grace"}]));

    // NOT NULL violation surfaces as a backend error
    let res = client
        .post(gateway.url("/users"))
        .json(&json!({"id": 3, "name": null}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "backend");
}

#[tokio::test]
async fn test_capture_binds_literal_string() {
    let recorder = Recorder::default();
    let mut registry = BackendRegistry::new();
    recorder.install(&mut registry);

    let document = json!({
        "DB": {"default": {"type": "recording"}},
        "REST": {"GET/users/:id": {"query": "select", "params": ["path.id"]}}
    });
    let gateway = start_gateway(&document.to_string(), registry).await;

    let rows: Value = reqwest::get(gateway.url("/users/42")).await.unwrap().json().await.unwrap();
    assert_eq!(rows, json!([{"binds": 1}]));
    assert_eq!(*recorder.binds.lock(), vec![(None, json!("42"))]);
    assert_eq!(*recorder.queries.lock(), vec!["select".to_string()]);
}

#[tokio::test]
async fn test_request_errors() {
    let recorder = Recorder::default();
    let mut registry = BackendRegistry::new();
    recorder.install(&mut registry);

    let document = json!({
        "DB": {"default": {"type": "recording"}},
        "REST": {
            "POST/items": {"query": "insert", "params": ["request.name"]},
            "GET/reboot": {"special": "reboot"}
        }
    });
    let gateway = start_gateway(&document.to_string(), registry).await;
    let client = reqwest::Client::new();

    let res = client.get(gateway.url("/nothing/here")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-request-id"));

    let res = client.post(gateway.url("/items")).body("{not json").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "body");

    // empty body becomes [], which has no `name`
    let res = client.post(gateway.url("/items")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "resolve");

    let res = client.get(gateway.url("/reboot")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "unknown_action");

    assert!(recorder.binds.lock().is_empty());
}

#[tokio::test]
async fn test_api_dump_round_trip() {
    let data = tempfile::tempdir().unwrap();
    let document = sqlite_document(&data.path().join("app.db"));
    let gateway = start_gateway(&document, BackendRegistry::with_defaults()).await;

    let dump: Value = reqwest::get(gateway.url("/api")).await.unwrap().json().await.unwrap();
    let original: Value = serde_json::from_str(&document).unwrap();

    let keys = |v: &Value| v.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
    assert_eq!(keys(&dump["DB"]), keys(&original["DB"]));
    assert_eq!(keys(&dump["REST"]), keys(&original["REST"]));
    assert_eq!(dump["debug"], json!(true));
    assert!(!dump.to_string().contains("app.db"));
}

#[tokio::test]
async fn test_htpasswd_verbs() {
    let data = tempfile::tempdir().unwrap();
    let passwd = data.path().join("passwd");
    let document = json!({
        "DB": {"users": {"type": "htpasswd", "filename": passwd.to_string_lossy(), "algorithm": "plain"}},
        "REST": {
            "PUT/users/:name": {
                "database": "users",
                "query": "insert",
                "params": [
                    {"path": "path.name", "name": "username"},
                    {"path": "request.password", "name": "password"}
                ]
            },
            "DELETE/users/:name": {"database": "users", "query": "delete", "params": ["path.name"]}
        }
    });
    let gateway = start_gateway(&document.to_string(), BackendRegistry::with_defaults()).await;
    let client = reqwest::Client::new();

    let res = client
        .put(gateway.url("/users/alice"))
        .json(&json!({"password": "secret"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(std::fs::read_to_string(&passwd).unwrap(), "alice:secret\n");

    let res = client
        .put(gateway.url("/users/alice"))
        .json(&json!({"password": "again"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let res = client.delete(gateway.url("/users/alice")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(std::fs::read_to_string(&passwd).unwrap(), "");
}

#[tokio::test]
async fn test_configuration_error_is_per_request() {
    let gateway = start_gateway(r#"{"DB": {}, "REST": {"GET/x": {"query": "q"}}}"#, BackendRegistry::new()).await;

    let res = reqwest::get(gateway.url("/x")).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json::<Value>().await.unwrap()["error"], "configuration");

    // the server keeps serving
    let res = reqwest::get(gateway.url("/x")).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
