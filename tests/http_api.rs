//! HTTP-level tests for the generated record API, driven through the router with `oneshot`
//! against the in-memory store.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use record_service::{app, parse_catalog, AppState, MemoryStore, Subscriber};
use serde_json::{json, Value};
use tower::ServiceExt;

const CATALOG: &str = r#"{
    "entities": [
        {
            "name": "User",
            "route": "users",
            "fields": [
                { "name": "id", "type": "integer", "primary_key": true },
                { "name": "username", "type": "string" }
            ],
            "relationships": [
                { "name": "items", "target": "Item", "kind": "one_to_many", "foreign_key": "owner_id" }
            ]
        },
        {
            "name": "Item",
            "route": "items",
            "fields": [
                { "name": "id", "type": "integer", "primary_key": true },
                { "name": "name", "type": "string" },
                { "name": "price", "type": "float" },
                { "name": "owner_id", "type": "integer", "nullable": true }
            ],
            "relationships": [
                { "name": "tags", "target": "Tag", "kind": "many_to_many",
                  "association": "item_tags", "owner_key": "item_id", "target_key": "tag_id" }
            ]
        },
        {
            "name": "Tag",
            "route": "tags",
            "fields": [
                { "name": "id", "type": "integer", "primary_key": true },
                { "name": "name", "type": "string" }
            ]
        }
    ]
}"#;

fn test_state() -> AppState {
    let registry = parse_catalog(CATALOG).expect("catalog parses");
    AppState::new(registry, MemoryStore::new())
}

async fn send(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app(state.clone(), 1 << 20).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_item(state: &AppState, name: &str, price: f64) -> Value {
    let (status, body) = send(
        state,
        Method::POST,
        "/items",
        Some(json!({ "name": name, "price": price, "owner_id": null })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].clone()
}

#[tokio::test]
async fn create_then_read_item() {
    let state = test_state();
    let (status, body) = send(
        &state,
        Method::POST,
        "/items",
        Some(json!({ "name": "pen", "price": 1.5, "owner_id": null })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "message": "Item created", "id": 1 }));

    let (status, body) = send(&state, Method::GET, "/items/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": 1, "name": "pen", "price": 1.5, "owner_id": null }));
}

#[tokio::test]
async fn list_supports_sort_filter_search_and_window() {
    let state = test_state();
    create_item(&state, "pen", 1.5).await;
    create_item(&state, "book", 12.0).await;
    create_item(&state, "Notebook", 4.0).await;

    let (status, body) = send(&state, Method::GET, "/items?sort_by=price&sort_dir=desc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(3));
    let names: Vec<_> = body["data"].as_array().unwrap().iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("book"), json!("Notebook"), json!("pen")]);

    let (_, body) = send(&state, Method::GET, "/items?filter=name%3Dpen", None).await;
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["data"][0]["name"], json!("pen"));

    let (_, body) = send(&state, Method::GET, "/items?search=BOOK", None).await;
    assert_eq!(body["total"], json!(2));

    let (_, body) = send(&state, Method::GET, "/items?skip=1&limit=1", None).await;
    assert_eq!(body["total"], json!(3));
    assert_eq!(body["skip"], json!(1));
    assert_eq!(body["limit"], json!(1));
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["name"], json!("book"));
}

#[tokio::test]
async fn invalid_filter_and_sort_columns_are_rejected() {
    let state = test_state();
    let (status, body) = send(&state, Method::GET, "/items?filter=colour%3Dred", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("invalid_filter_column"));

    let (status, body) = send(&state, Method::GET, "/items?sort_by=colour", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("invalid_sort_column"));
}

#[tokio::test]
async fn partial_update_keeps_other_fields() {
    let state = test_state();
    let id = create_item(&state, "pen", 1.5).await;

    let (status, body) = send(&state, Method::PUT, "/items/1", Some(json!({ "price": 2.0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Item updated", "id": id }));

    let (_, row) = send(&state, Method::GET, "/items/1", None).await;
    assert_eq!(row["name"], json!("pen"));
    assert_eq!(row["price"], json!(2.0));
}

#[tokio::test]
async fn missing_row_names_entity_and_key() {
    let state = test_state();
    let (status, body) = send(&state, Method::GET, "/items/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));
    assert_eq!(body["error"]["message"], json!("Item with id 999 not found"));

    let (status, _) = send(&state, Method::PUT, "/items/999", Some(json!({ "price": 1 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_payload_lists_every_violation() {
    let state = test_state();
    let (status, body) = send(&state, Method::POST, "/items", Some(json!({ "price": "cheap", "colour": "red" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], json!("validation_error"));
    let fields: Vec<_> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap().to_string())
        .collect();
    for f in ["name", "price", "owner_id", "colour"] {
        assert!(fields.iter().any(|x| x == f), "missing violation for {}: {:?}", f, fields);
    }

    let (_, body) = send(&state, Method::GET, "/items", None).await;
    assert_eq!(body["total"], json!(0));
}

#[tokio::test]
async fn malformed_json_body_is_bad_request() {
    let state = test_state();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/items")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let resp = app(state, 1 << 20).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_twice_is_not_found() {
    let state = test_state();
    create_item(&state, "pen", 1.5).await;
    let (status, body) = send(&state, Method::DELETE, "/items/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Item deleted", "id": 1 }));
    let (status, _) = send(&state, Method::DELETE, "/items/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_route_and_bad_key() {
    let state = test_state();
    let (status, body) = send(&state, Method::GET, "/widgets", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("unknown_entity"));

    let (status, body) = send(&state, Method::GET, "/items/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("bad_request"));
}

#[tokio::test]
async fn one_to_many_relationship_round() {
    let state = test_state();
    let (status, _) = send(&state, Method::POST, "/users", Some(json!({ "username": "ann" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&state, Method::GET, "/users/1/items", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = send(&state, Method::POST, "/users/1/items", Some(json!({ "name": "pen", "price": 1.5 }))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body, json!({ "message": "Item created", "id": 1 }));

    let (_, body) = send(&state, Method::GET, "/users/1/items", None).await;
    assert_eq!(body, json!([{ "id": 1, "name": "pen", "price": 1.5, "owner_id": 1 }]));

    let (status, body) = send(&state, Method::GET, "/users/7/items", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], json!("User with id 7 not found"));

    let (status, body) = send(&state, Method::GET, "/users/1/friends", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("unknown_relationship"));
}

#[tokio::test]
async fn many_to_many_relationship_round() {
    let state = test_state();
    create_item(&state, "pen", 1.5).await;
    create_item(&state, "cup", 3.0).await;

    let (status, body) = send(&state, Method::POST, "/items/1/tags", Some(json!({ "name": "office" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "message": "Tag created", "id": 1 }));

    let (_, body) = send(&state, Method::GET, "/items/1/tags", None).await;
    assert_eq!(body, json!([{ "id": 1, "name": "office" }]));
    let (_, body) = send(&state, Method::GET, "/items/2/tags", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn writes_are_announced_on_the_route_topic() {
    let state = test_state();
    let (sub, mut rx) = Subscriber::channel();
    state.broker.connect("items", sub);

    let id = create_item(&state, "pen", 1.5).await;
    send(&state, Method::DELETE, "/items/1", None).await;

    let created: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(created, json!({ "event": "created", "entity": "Item", "id": id }));
    let deleted: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(deleted["event"], json!("deleted"));
}

#[tokio::test]
async fn health_and_version() {
    let state = test_state();
    let (status, body) = send(&state, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
    let (_, body) = send(&state, Method::GET, "/version", None).await;
    assert_eq!(body["name"], json!("record-service"));
}
