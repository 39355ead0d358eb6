use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;

use snapgram::config::CollectionsConfig;
use snapgram::local_store::{LocalStore, MemoryLocalStore, COOKIE_FALLBACK_KEY};
use snapgram::models::UploadFile;
use snapgram::remote::{
    AccountService, AppwriteClient, DatabaseService, Query, Remote, RemoteError, StorageService,
};
use snapgram::{Api, ErrorKind};

const PROJECT: &str = "snapgram-test";
const SESSION_COOKIES: &str = r#"{"a_session_snapgram-test":"token-1"}"#;

#[derive(Clone, Default)]
struct Recorded {
    projects: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn saw(&self, headers: &HeaderMap) {
        let project = headers
            .get("x-appwrite-project")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.projects.lock().unwrap().push(project);
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "message": "User (role: guests) missing scope (account)",
            "code": 401,
            "type": "general_unauthorized_scope",
        })),
    )
        .into_response()
}

async fn get_account(State(recorded): State<Recorded>, headers: HeaderMap) -> Response {
    recorded.saw(&headers);
    let cookies = headers
        .get("x-fallback-cookies")
        .and_then(|v| v.to_str().ok());
    if cookies != Some(SESSION_COOKIES) {
        return unauthorized();
    }
    Json(json!({ "$id": "acc1", "name": "Alice", "email": "alice@example.com" })).into_response()
}

async fn create_session(State(recorded): State<Recorded>, headers: HeaderMap) -> Response {
    recorded.saw(&headers);
    (
        StatusCode::CREATED,
        [("x-fallback-cookies", SESSION_COOKIES)],
        Json(json!({ "$id": "s1", "userId": "acc1" })),
    )
        .into_response()
}

async fn delete_session(State(recorded): State<Recorded>, headers: HeaderMap) -> StatusCode {
    recorded.saw(&headers);
    StatusCode::NO_CONTENT
}

async fn list_documents(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    recorded.saw(&headers);
    let raw = raw.unwrap_or_default();
    let queries: Vec<String> = url::form_urlencoded::parse(raw.as_bytes())
        .filter(|(key, _)| key == "queries[]")
        .map(|(_, value)| value.into_owned())
        .collect();
    *recorded.queries.lock().unwrap() = queries;

    Json(json!({
        "total": 1,
        "documents": [{
            "$id": "p1",
            "$createdAt": "2024-05-01T10:00:00.000+00:00",
            "$updatedAt": "2024-05-01T10:00:00.000+00:00",
            "$collectionId": "posts",
            "caption": "Hello",
            "imageUrl": "http://files/p1",
            "imageId": "f1",
            "location": null,
            "tags": ["x"],
            "creator": { "$id": "u1", "name": "Alice" },
            "likes": [{ "$id": "u2" }, { "$id": "u3" }],
        }],
    }))
    .into_response()
}

async fn get_document(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Path((_db, _collection, id)): Path<(String, String, String)>,
) -> Response {
    recorded.saw(&headers);
    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "message": "Document with the requested ID could not be found.",
                "code": 404,
                "type": "document_not_found",
            })),
        )
            .into_response();
    }
    Json(json!({ "$id": id, "caption": "Found" })).into_response()
}

async fn upload_file(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Path(bucket): Path<String>,
    mut multipart: Multipart,
) -> Response {
    recorded.saw(&headers);
    let mut file_id = String::new();
    let mut name = String::new();
    let mut mime_type = String::new();
    let mut size = 0;

    while let Some(field) = multipart.next_field().await.unwrap() {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "fileId" => file_id = field.text().await.unwrap(),
            "file" => {
                name = field.file_name().unwrap_or_default().to_string();
                mime_type = field.content_type().unwrap_or_default().to_string();
                size = field.bytes().await.unwrap().len();
            }
            _ => {}
        }
    }

    // This bucket acknowledges uploads without naming the stored file
    if bucket == "broken" {
        file_id.clear();
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "$id": file_id,
            "bucketId": bucket,
            "name": name,
            "mimeType": mime_type,
            "sizeOriginal": size,
        })),
    )
        .into_response()
}

fn mock_router(recorded: Recorded) -> Router {
    Router::new()
        .route("/v1/account", get(get_account))
        .route("/v1/account/sessions/email", post(create_session))
        .route("/v1/account/sessions/{id}", delete(delete_session))
        .route(
            "/v1/databases/{db}/collections/{collection}/documents",
            get(list_documents),
        )
        .route(
            "/v1/databases/{db}/collections/{collection}/documents/{id}",
            get(get_document),
        )
        .route("/v1/storage/buckets/{bucket}/files", post(upload_file))
        .with_state(recorded)
}

/// Serve the mock on an ephemeral port and return its API root.
async fn spawn_server(recorded: Recorded) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, mock_router(recorded)).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

async fn client_with_store() -> (AppwriteClient, Arc<MemoryLocalStore>, Recorded) {
    let recorded = Recorded::default();
    let endpoint = spawn_server(recorded.clone()).await;
    let local = Arc::new(MemoryLocalStore::new());
    let client = AppwriteClient::new(&endpoint, PROJECT, None)
        .unwrap()
        .with_local_store(local.clone());
    (client, local, recorded)
}

#[tokio::test]
async fn test_project_header_sent_on_every_request() {
    let (client, _local, recorded) = client_with_store().await;

    let _ = client.get().await;
    let _ = client.create_email_password_session("a@x.io", "pw").await;
    let _ = client.list_documents("db", "posts", &[]).await;

    let projects = recorded.projects.lock().unwrap().clone();
    assert_eq!(projects, vec![PROJECT.to_string(); 3]);
}

#[tokio::test]
async fn test_fallback_cookies_are_stored_and_replayed() {
    let (client, local, _recorded) = client_with_store().await;

    // No session yet
    let err = client.get().await.unwrap_err();
    assert_eq!(err.code(), Some(401));

    let session = client
        .create_email_password_session("alice@example.com", "pw")
        .await
        .unwrap();
    assert_eq!(session.user_id, "acc1");
    assert_eq!(
        local.get(COOKIE_FALLBACK_KEY).unwrap().as_deref(),
        Some(SESSION_COOKIES)
    );

    let account = client.get().await.unwrap();
    assert_eq!(account.id, "acc1");
    assert_eq!(account.email, "alice@example.com");
}

#[tokio::test]
async fn test_service_error_body_is_mapped() {
    let (client, _local, _recorded) = client_with_store().await;

    let err = client
        .get_document("db", "posts", "missing")
        .await
        .unwrap_err();

    match err {
        RemoteError::Service {
            code,
            kind,
            message,
        } => {
            assert_eq!(code, 404);
            assert_eq!(kind, "document_not_found");
            assert!(message.contains("could not be found"));
        }
        other => panic!("Expected a service error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_list_documents_sends_queries_in_order() {
    let (client, _local, recorded) = client_with_store().await;
    let queries = [
        Query::equal("creator", "u1"),
        Query::order_desc("$createdAt"),
        Query::limit(9),
        Query::cursor_after("p0"),
    ];

    let list = client.list_documents("db", "posts", &queries).await.unwrap();

    assert_eq!(list.total, 1);
    let sent = recorded.queries.lock().unwrap().clone();
    let expected: Vec<String> = queries.iter().map(ToString::to_string).collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn test_feed_over_http_normalizes_relations() {
    let (client, _local, _recorded) = client_with_store().await;
    let api = Api::new(
        Remote::from_backend(Arc::new(client)),
        CollectionsConfig::default(),
    );

    let recent = api.get_recent_posts().await.unwrap();

    let post = &recent.documents[0];
    assert_eq!(post.id, "p1");
    assert_eq!(post.creator, "u1");
    assert_eq!(post.likes, vec!["u2".to_string(), "u3".to_string()]);
    assert_eq!(post.location, None);
    assert!(post.created_at.is_some());
}

#[tokio::test]
async fn test_upload_sends_multipart_file() {
    let (client, _local, _recorded) = client_with_store().await;
    let file = UploadFile::new("sunset.png", vec![1u8, 2, 3, 4, 5]);

    let handle = client.create_file("media", "f42", &file).await.unwrap();

    assert_eq!(handle.id, "f42");
    assert_eq!(handle.bucket_id, "media");
    assert_eq!(handle.name, "sunset.png");
    assert_eq!(handle.mime_type, "image/png");
    assert_eq!(handle.size_original, 5);
}

#[tokio::test]
async fn test_delete_session_accepts_empty_response() {
    let (client, _local, _recorded) = client_with_store().await;

    client.delete_session("current").await.unwrap();
}

#[tokio::test]
async fn test_upload_without_file_id_is_an_invariant_error() {
    let (client, _local, _recorded) = client_with_store().await;
    let api = Api::new(
        Remote::from_backend(Arc::new(client)),
        CollectionsConfig {
            storage_id: "broken".to_string(),
            ..CollectionsConfig::default()
        },
    );

    let err = api
        .upload_file(&UploadFile::new("sunset.png", vec![1u8, 2, 3]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Invariant);
}
