// REST client for the hosted backend
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::{
    AccountService, AvatarService, DatabaseService, Query, RemoteError, StorageService,
};
use crate::local_store::{LocalStore, COOKIE_FALLBACK_KEY};
use crate::models::{Account, AccountSession, Document, DocumentList, FileHandle, UploadFile};

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const FALLBACK_COOKIES_HEADER: &str = "X-Fallback-Cookies";

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: u16,
    #[serde(rename = "type", default)]
    kind: String,
}

pub struct AppwriteClient {
    http: Client,
    endpoint: String,
    base: Url,
    project_id: String,
    local: Option<Arc<dyn LocalStore>>,
}

impl AppwriteClient {
    /// `endpoint` is the API root, e.g. `https://cloud.appwrite.io/v1`.
    pub fn new(
        endpoint: &str,
        project_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, RemoteError> {
        let endpoint = endpoint.trim_end_matches('/');
        let base = Url::parse(endpoint)?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            endpoint: endpoint.to_string(),
            base,
            project_id: project_id.to_string(),
            local: None,
        })
    }

    /// Persist and replay the fallback session cookies through `store`.
    pub fn with_local_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.local = Some(store);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Append `segments` to the API root. Each segment is percent-encoded,
    /// so an id can never leave its place in the path.
    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(RemoteError::service(
                400,
                "general_argument_invalid",
                format!("Invalid path segment {:?}", bad),
            ));
        }

        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn documents_url(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: Option<&str>,
    ) -> Result<Url, RemoteError> {
        let mut segments = vec![
            "databases",
            database_id,
            "collections",
            collection_id,
            "documents",
        ];
        segments.extend(document_id);
        self.url(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut request = self
            .http
            .request(method, url)
            .header(PROJECT_HEADER, &self.project_id);
        if let Some(cookies) = self.fallback_cookies() {
            request = request.header(FALLBACK_COOKIES_HEADER, cookies);
        }
        request
    }

    fn fallback_cookies(&self) -> Option<String> {
        let store = self.local.as_ref()?;
        match store.get(COOKIE_FALLBACK_KEY) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!("Could not read fallback cookies: {}", e);
                None
            }
        }
    }

    fn remember_fallback_cookies(&self, response: &Response) {
        let (Some(store), Some(value)) = (
            self.local.as_ref(),
            response.headers().get(FALLBACK_COOKIES_HEADER),
        ) else {
            return;
        };

        if let Ok(value) = value.to_str() {
            if let Err(e) = store.set(COOKIE_FALLBACK_KEY, value) {
                tracing::warn!("Could not store fallback cookies: {}", e);
            }
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await?;
        self.remember_fallback_cookies(&response);

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        tracing::debug!("Remote returned {}: {}", status, text);
        Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => RemoteError::Service {
                code: if body.code == 0 {
                    status.as_u16()
                } else {
                    body.code
                },
                kind: body.kind,
                message: body.message,
            },
            Err(_) => RemoteError::service(status.as_u16(), "general_unknown", text),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = self.execute(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), RemoteError> {
        self.execute(request).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountService for AppwriteClient {
    async fn create(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Account, RemoteError> {
        let request = self.request(Method::POST, self.url(&["account"])?).json(&json!({
            "userId": account_id,
            "email": email,
            "password": password,
            "name": name,
        }));
        self.send_json(request).await
    }

    async fn get(&self) -> Result<Account, RemoteError> {
        let request = self.request(Method::GET, self.url(&["account"])?);
        self.send_json(request).await
    }

    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccountSession, RemoteError> {
        let request = self
            .request(Method::POST, self.url(&["account", "sessions", "email"])?)
            .json(&json!({ "email": email, "password": password }));
        self.send_json(request).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&["account", "sessions", session_id])?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }
}

#[async_trait]
impl DatabaseService for AppwriteClient {
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, RemoteError> {
        let url = self.documents_url(database_id, collection_id, None)?;
        let request = self
            .request(Method::POST, url)
            .json(&json!({ "documentId": document_id, "data": data }));
        self.send_json(request).await
    }

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Document, RemoteError> {
        let url = self.documents_url(database_id, collection_id, Some(document_id))?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, RemoteError> {
        let url = self.documents_url(database_id, collection_id, Some(document_id))?;
        let request = self
            .request(Method::PATCH, url)
            .json(&json!({ "data": data }));
        self.send_json(request).await
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), RemoteError> {
        let url = self.documents_url(database_id, collection_id, Some(document_id))?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }

    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[Query],
    ) -> Result<DocumentList, RemoteError> {
        let url = self.documents_url(database_id, collection_id, None)?;
        let params: Vec<(&str, String)> = queries
            .iter()
            .map(|query| ("queries[]", query.to_string()))
            .collect();
        let request = self.request(Method::GET, url).query(&params);
        self.send_json(request).await
    }
}

#[async_trait]
impl StorageService for AppwriteClient {
    async fn create_file(
        &self,
        bucket_id: &str,
        file_id: &str,
        file: &UploadFile,
    ) -> Result<FileHandle, RemoteError> {
        let url = self.url(&["storage", "buckets", bucket_id, "files"])?;
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new()
            .text("fileId", file_id.to_string())
            .part("file", part);
        self.send_json(self.request(Method::POST, url).multipart(form))
            .await
    }

    fn get_file_download(&self, bucket_id: &str, file_id: &str) -> Result<Url, RemoteError> {
        let mut url = self.url(&["storage", "buckets", bucket_id, "files", file_id, "download"])?;
        url.query_pairs_mut().append_pair("project", &self.project_id);
        Ok(url)
    }

    async fn delete_file(&self, bucket_id: &str, file_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&["storage", "buckets", bucket_id, "files", file_id])?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }
}

impl AvatarService for AppwriteClient {
    fn get_initials(&self, name: &str) -> Result<Url, RemoteError> {
        let mut url = self.url(&["avatars", "initials"])?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("project", &self.project_id);
        Ok(url)
    }
}
