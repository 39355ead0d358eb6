// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use snapgram::config::CollectionsConfig;
use snapgram::models::{NewPost, NewUser, Post, UploadFile, User};
use snapgram::remote::{MemoryBackend, Remote};
use snapgram::Api;

pub fn setup() -> (Arc<MemoryBackend>, Api) {
    let backend = Arc::new(MemoryBackend::new());
    let api = Api::new(
        Remote::from_backend(backend.clone()),
        CollectionsConfig::default(),
    );
    (backend, api)
}

pub fn ids() -> CollectionsConfig {
    CollectionsConfig::default()
}

pub fn image(name: &str) -> UploadFile {
    UploadFile::new(name, vec![0x89u8, b'P', b'N', b'G'])
}

pub fn new_user(name: &str, email: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        username: name.to_lowercase().replace(' ', "_"),
        email: email.to_string(),
        password: "correct horse battery".to_string(),
    }
}

pub async fn sign_up(api: &Api, name: &str, email: &str) -> User {
    api.create_user_account(new_user(name, email))
        .await
        .expect("sign up")
}

pub async fn create_post(api: &Api, user_id: &str, caption: &str, tags: Option<&str>) -> Post {
    api.create_post(NewPost {
        user_id: user_id.to_string(),
        caption: caption.to_string(),
        file: vec![image("photo.png")],
        location: Some("Lisbon".to_string()),
        tags: tags.map(str::to_string),
    })
    .await
    .expect("create post")
}
