// In-process backend - mirrors the remote service's observable behavior for tests and offline runs
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex as SyncMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

use super::{
    unique_id, AccountService, AvatarService, DatabaseService, Query, RemoteError,
    StorageService, CURRENT_SESSION,
};
use crate::models::{Account, AccountSession, Document, DocumentList, FileHandle, UploadFile};

const MEMORY_ENDPOINT: &str = "http://memory.local/v1";

/// Remote operations, used to inject failures and inspect recorded calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateAccount,
    GetAccount,
    CreateSession,
    DeleteSession,
    CreateDocument,
    GetDocument,
    UpdateDocument,
    DeleteDocument,
    ListDocuments,
    CreateFile,
    GetFileDownload,
    DeleteFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub target: String,
}

struct StoredAccount {
    account: Account,
    password: String,
}

#[derive(Default)]
struct MemoryState {
    accounts: Vec<StoredAccount>,
    session: Option<AccountSession>,
    documents: HashMap<String, Vec<Document>>,
    files: HashMap<String, FileHandle>,
    clock: Option<DateTime<Utc>>,
}

/// Call log and injected failures. Kept outside the async state lock so the
/// synchronous operations are recorded too.
#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
    failures: HashSet<Op>,
}

impl MemoryState {
    /// Strictly increasing timestamps so ordering by time is deterministic.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn active_account(&self) -> Option<&Account> {
        let session = self.session.as_ref()?;
        self.accounts
            .iter()
            .map(|stored| &stored.account)
            .find(|account| account.id == session.user_id)
    }
}

pub struct MemoryBackend {
    project_id: String,
    state: Mutex<MemoryState>,
    recorder: SyncMutex<Recorder>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            project_id: "memory".to_string(),
            state: Mutex::new(MemoryState::default()),
            recorder: SyncMutex::new(Recorder::default()),
        }
    }

    fn recorder(&self) -> std::sync::MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: Op, target: String) -> Result<(), RemoteError> {
        let mut recorder = self.recorder();
        recorder.calls.push(Call { op, target });
        if recorder.failures.contains(&op) {
            return Err(RemoteError::service(
                500,
                "general_unknown",
                format!("Injected failure for {:?}", op),
            ));
        }
        Ok(())
    }

    /// Make every subsequent call of `op` fail with a 500.
    pub async fn fail(&self, op: Op) {
        self.recorder().failures.insert(op);
    }

    pub async fn recover(&self, op: Op) {
        self.recorder().failures.remove(&op);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.recorder().calls.clone()
    }

    pub async fn count(&self, op: Op) -> usize {
        self.recorder()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    pub async fn clear_calls(&self) {
        self.recorder().calls.clear();
    }

    pub async fn documents(&self, database_id: &str, collection_id: &str) -> Vec<Document> {
        self.state
            .lock()
            .await
            .documents
            .get(&collection_key(database_id, collection_id))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_file(&self, bucket_id: &str, file_id: &str) -> bool {
        self.state
            .lock()
            .await
            .files
            .contains_key(&file_key(bucket_id, file_id))
    }

    pub async fn file_count(&self) -> usize {
        self.state.lock().await.files.len()
    }

    pub async fn has_session(&self) -> bool {
        self.state.lock().await.session.is_some()
    }
}

fn collection_key(database_id: &str, collection_id: &str) -> String {
    format!("{}/{}", database_id, collection_id)
}

fn file_key(bucket_id: &str, file_id: &str) -> String {
    format!("{}/{}", bucket_id, file_id)
}

fn unauthorized() -> RemoteError {
    RemoteError::service(
        401,
        "general_unauthorized_scope",
        "User (role: guests) missing scope (account)",
    )
}

fn document_not_found() -> RemoteError {
    RemoteError::service(
        404,
        "document_not_found",
        "Document with the requested ID could not be found.",
    )
}

#[async_trait]
impl AccountService for MemoryBackend {
    async fn create(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Account, RemoteError> {
        let mut state = self.state.lock().await;
        self.record(Op::CreateAccount, email.to_string())?;

        if state
            .accounts
            .iter()
            .any(|stored| stored.account.email == email || stored.account.id == account_id)
        {
            return Err(RemoteError::service(
                409,
                "user_already_exists",
                "A user with the same id, email, or phone already exists in this project.",
            ));
        }

        let account = Account {
            id: account_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        };
        state.accounts.push(StoredAccount {
            account: account.clone(),
            password: password.to_string(),
        });
        Ok(account)
    }

    async fn get(&self) -> Result<Account, RemoteError> {
        let state = self.state.lock().await;
        self.record(Op::GetAccount, "account".to_string())?;
        state.active_account().cloned().ok_or_else(unauthorized)
    }

    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccountSession, RemoteError> {
        let mut state = self.state.lock().await;
        self.record(Op::CreateSession, email.to_string())?;

        if state.session.is_some() {
            return Err(RemoteError::service(
                401,
                "user_session_already_exists",
                "Creation of a session is prohibited when a session is active.",
            ));
        }

        let user_id = state
            .accounts
            .iter()
            .find(|stored| stored.account.email == email && stored.password == password)
            .map(|stored| stored.account.id.clone())
            .ok_or_else(|| {
                RemoteError::service(
                    401,
                    "user_invalid_credentials",
                    "Invalid credentials. Please check the email and password.",
                )
            })?;

        let session = AccountSession {
            id: unique_id(),
            user_id,
            expire: None,
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        self.record(Op::DeleteSession, session_id.to_string())?;

        let matches = match &state.session {
            None => return Err(unauthorized()),
            Some(session) => session_id == CURRENT_SESSION || session_id == session.id,
        };
        if !matches {
            return Err(RemoteError::service(
                404,
                "user_session_not_found",
                "The current user session could not be found.",
            ));
        }

        state.session = None;
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for MemoryBackend {
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, RemoteError> {
        let key = collection_key(database_id, collection_id);
        let mut state = self.state.lock().await;
        self.record(Op::CreateDocument, format!("{}/{}", key, document_id))?;

        let Value::Object(data) = data else {
            return Err(RemoteError::service(
                400,
                "document_invalid_structure",
                "Invalid document structure: expected an object",
            ));
        };

        let now = state.tick();
        let collection = state.documents.entry(key).or_default();
        if collection.iter().any(|doc| doc.id == document_id) {
            return Err(RemoteError::service(
                409,
                "document_already_exists",
                "Document with the requested ID already exists.",
            ));
        }

        let document = Document {
            id: document_id.to_string(),
            created_at: Some(now),
            updated_at: Some(now),
            data,
        };
        collection.push(document.clone());
        Ok(document)
    }

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Document, RemoteError> {
        let key = collection_key(database_id, collection_id);
        let state = self.state.lock().await;
        self.record(Op::GetDocument, format!("{}/{}", key, document_id))?;

        state
            .documents
            .get(&key)
            .and_then(|docs| docs.iter().find(|doc| doc.id == document_id))
            .cloned()
            .ok_or_else(document_not_found)
    }

    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Value,
    ) -> Result<Document, RemoteError> {
        let key = collection_key(database_id, collection_id);
        let mut state = self.state.lock().await;
        self.record(Op::UpdateDocument, format!("{}/{}", key, document_id))?;

        let now = state.tick();
        let document = state
            .documents
            .get_mut(&key)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == document_id))
            .ok_or_else(document_not_found)?;

        if let Value::Object(fields) = data {
            document.data.extend(fields);
        }
        document.updated_at = Some(now);
        Ok(document.clone())
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), RemoteError> {
        let key = collection_key(database_id, collection_id);
        let mut state = self.state.lock().await;
        self.record(Op::DeleteDocument, format!("{}/{}", key, document_id))?;

        let docs = state.documents.get_mut(&key).ok_or_else(document_not_found)?;
        let position = docs
            .iter()
            .position(|doc| doc.id == document_id)
            .ok_or_else(document_not_found)?;
        docs.remove(position);
        Ok(())
    }

    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[Query],
    ) -> Result<DocumentList, RemoteError> {
        let key = collection_key(database_id, collection_id);
        let state = self.state.lock().await;
        self.record(Op::ListDocuments, key.clone())?;

        let docs = state.documents.get(&key).cloned().unwrap_or_default();
        apply_queries(docs, queries)
    }
}

/// Filters first, then ordering, then cursor and limit, whatever order the
/// queries were given in. `total` counts matches before pagination.
fn apply_queries(
    mut docs: Vec<Document>,
    queries: &[Query],
) -> Result<DocumentList, RemoteError> {
    for query in queries {
        match query {
            Query::Equal { attribute, value } => {
                docs.retain(|doc| field_matches(doc, attribute, value))
            }
            Query::Search { attribute, term } => {
                let words: Vec<String> = term.split_whitespace().map(str::to_lowercase).collect();
                docs.retain(|doc| {
                    doc.data
                        .get(attribute)
                        .and_then(Value::as_str)
                        .map(|text| {
                            let text = text.to_lowercase();
                            words.iter().all(|word| text.contains(word.as_str()))
                        })
                        .unwrap_or(false)
                });
            }
            _ => {}
        }
    }

    for query in queries {
        if let Query::OrderDesc(attribute) = query {
            docs.sort_by(|a, b| sort_key(b, attribute).cmp(&sort_key(a, attribute)));
        }
    }

    let total = docs.len() as u64;

    let cursor = queries.iter().find_map(|query| match query {
        Query::CursorAfter(id) => Some(id),
        _ => None,
    });
    if let Some(cursor) = cursor {
        let position = docs
            .iter()
            .position(|doc| &doc.id == cursor)
            .ok_or_else(|| {
                RemoteError::service(
                    400,
                    "general_cursor_not_found",
                    format!("Document with id \"{}\" not found", cursor),
                )
            })?;
        docs.drain(..=position);
    }

    let limit = queries.iter().find_map(|query| match query {
        Query::Limit(limit) => Some(*limit as usize),
        _ => None,
    });
    if let Some(limit) = limit {
        docs.truncate(limit);
    }

    Ok(DocumentList {
        total,
        documents: docs,
    })
}

fn field_matches(doc: &Document, attribute: &str, expected: &Value) -> bool {
    let actual = if attribute == "$id" {
        Some(Value::String(doc.id.clone()))
    } else {
        doc.data.get(attribute).cloned()
    };

    match actual {
        Some(Value::Array(items)) => items.iter().any(|item| value_matches(item, expected)),
        Some(value) => value_matches(&value, expected),
        None => false,
    }
}

// Relationship fields may hold the related document; compare on its id.
fn value_matches(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Object(fields) => fields.get("$id") == Some(expected),
        other => other == expected,
    }
}

fn sort_key(doc: &Document, attribute: &str) -> String {
    let timestamp = match attribute {
        "$createdAt" => doc.created_at,
        "$updatedAt" => doc.updated_at,
        _ => {
            return doc
                .data
                .get(attribute)
                .map(|value| value.to_string())
                .unwrap_or_default()
        }
    };
    timestamp
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
        .unwrap_or_default()
}

#[async_trait]
impl StorageService for MemoryBackend {
    async fn create_file(
        &self,
        bucket_id: &str,
        file_id: &str,
        file: &UploadFile,
    ) -> Result<FileHandle, RemoteError> {
        let key = file_key(bucket_id, file_id);
        let mut state = self.state.lock().await;
        self.record(Op::CreateFile, key.clone())?;

        if state.files.contains_key(&key) {
            return Err(RemoteError::service(
                409,
                "storage_file_already_exists",
                "A storage file with the requested ID already exists.",
            ));
        }

        let handle = FileHandle {
            id: file_id.to_string(),
            bucket_id: bucket_id.to_string(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size_original: file.size() as u64,
        };
        state.files.insert(key, handle.clone());
        Ok(handle)
    }

    fn get_file_download(&self, bucket_id: &str, file_id: &str) -> Result<Url, RemoteError> {
        self.record(Op::GetFileDownload, file_key(bucket_id, file_id))?;
        let mut url = Url::parse(&format!(
            "{}/storage/buckets/{}/files/{}/download",
            MEMORY_ENDPOINT, bucket_id, file_id
        ))?;
        url.query_pairs_mut().append_pair("project", &self.project_id);
        Ok(url)
    }

    async fn delete_file(&self, bucket_id: &str, file_id: &str) -> Result<(), RemoteError> {
        let key = file_key(bucket_id, file_id);
        let mut state = self.state.lock().await;
        self.record(Op::DeleteFile, key.clone())?;

        state.files.remove(&key).map(|_| ()).ok_or_else(|| {
            RemoteError::service(
                404,
                "storage_file_not_found",
                "The requested file could not be found.",
            )
        })
    }
}

impl AvatarService for MemoryBackend {
    fn get_initials(&self, name: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&format!("{}/avatars/initials", MEMORY_ENDPOINT))?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("project", &self.project_id);
        Ok(url)
    }
}
