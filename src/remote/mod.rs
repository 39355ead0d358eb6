// Remote service seam - the hosted backend's account, database and storage APIs
pub mod http;
pub mod memory;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::models::{Account, AccountSession, Document, DocumentList, FileHandle, UploadFile};

pub use self::http::AppwriteClient;
pub use self::memory::{MemoryBackend, Op};
pub use self::query::Query;

/// Session id understood by the remote as "the session making this request".
pub const CURRENT_SESSION: &str = "current";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{message} ({code} {kind})")]
    Service {
        code: u16,
        kind: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteError {
    pub fn service(code: u16, kind: &str, message: impl Into<String>) -> Self {
        RemoteError::Service {
            code,
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            RemoteError::Service { code, .. } => Some(*code),
            RemoteError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Generate a fresh document or file id.
pub fn unique_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn create(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Account, RemoteError>;

    /// The account owning the active session.
    async fn get(&self) -> Result<Account, RemoteError>;

    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccountSession, RemoteError>;

    /// Accepts a session id or [`CURRENT_SESSION`].
    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait DatabaseService: Send + Sync {
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, RemoteError>;

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Document, RemoteError>;

    /// Partial update: only the given fields are replaced.
    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, RemoteError>;

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), RemoteError>;

    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[Query],
    ) -> Result<DocumentList, RemoteError>;
}

#[async_trait]
pub trait StorageService: Send + Sync {
    async fn create_file(
        &self,
        bucket_id: &str,
        file_id: &str,
        file: &UploadFile,
    ) -> Result<FileHandle, RemoteError>;

    fn get_file_download(&self, bucket_id: &str, file_id: &str) -> Result<Url, RemoteError>;

    async fn delete_file(&self, bucket_id: &str, file_id: &str) -> Result<(), RemoteError>;
}

pub trait AvatarService: Send + Sync {
    /// URL of a generated avatar showing the initials of `name`.
    fn get_initials(&self, name: &str) -> Result<Url, RemoteError>;
}

/// Handles to every remote service the application talks to.
#[derive(Clone)]
pub struct Remote {
    pub account: Arc<dyn AccountService>,
    pub database: Arc<dyn DatabaseService>,
    pub storage: Arc<dyn StorageService>,
    pub avatars: Arc<dyn AvatarService>,
}

impl Remote {
    /// Use one backend for all services.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AccountService + DatabaseService + StorageService + AvatarService + 'static,
    {
        Self {
            account: backend.clone(),
            database: backend.clone(),
            storage: backend.clone(),
            avatars: backend,
        }
    }
}
