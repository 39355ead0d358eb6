mod common;

use common::{ids, image, new_user, setup, sign_up};
use snapgram::models::UpdateUser;
use snapgram::remote::Op;
use snapgram::ErrorKind;

#[tokio::test]
async fn test_create_user_account_writes_profile_with_initials_avatar() {
    let (backend, api) = setup();

    let user = sign_up(&api, "Alice Liddell", "alice@example.com").await;

    assert!(!user.id.is_empty());
    assert!(!user.account_id.is_empty());
    assert_ne!(user.id, user.account_id);
    assert_eq!(user.name, "Alice Liddell");
    assert_eq!(user.username, "alice_liddell");
    assert_eq!(user.email, "alice@example.com");
    assert!(user.image_url.contains("/avatars/initials"));
    assert!(user.image_url.contains("name=Alice+Liddell"));
    assert_eq!(user.image_id, None);

    let docs = backend
        .documents(&ids().database_id, &ids().user_collection_id)
        .await;
    assert_eq!(docs.len(), 1);
}

#[tokio::test]
async fn test_create_user_account_failure_writes_no_document() {
    let (backend, api) = setup();
    sign_up(&api, "Alice", "alice@example.com").await;
    backend.clear_calls().await;

    // Same email again: the account service refuses it
    let err = api
        .create_user_account(new_user("Alice Again", "alice@example.com"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(backend.count(Op::CreateDocument).await, 0);
    assert_eq!(
        backend
            .documents(&ids().database_id, &ids().user_collection_id)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_sign_in_replaces_active_session() {
    let (backend, api) = setup();
    sign_up(&api, "Alice", "alice@example.com").await;

    api.sign_in_account("alice@example.com", "correct horse battery")
        .await
        .unwrap();
    assert_eq!(backend.count(Op::DeleteSession).await, 0);

    // A second sign-in must clear the first session before creating one
    api.sign_in_account("alice@example.com", "correct horse battery")
        .await
        .expect("second sign-in should replace the session");

    assert_eq!(backend.count(Op::DeleteSession).await, 1);
    assert!(backend.has_session().await);
}

#[tokio::test]
async fn test_sign_in_with_wrong_password_fails() {
    let (backend, api) = setup();
    sign_up(&api, "Alice", "alice@example.com").await;

    let err = api
        .sign_in_account("alice@example.com", "wrong")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Remote);
    assert!(!backend.has_session().await);
}

#[tokio::test]
async fn test_get_current_user_follows_session() {
    let (_, api) = setup();
    let user = sign_up(&api, "Alice", "alice@example.com").await;

    assert!(api.get_current_user().await.is_err());

    api.sign_in_account("alice@example.com", "correct horse battery")
        .await
        .unwrap();
    let current = api.get_current_user().await.unwrap();
    assert_eq!(current, user);

    api.sign_out_account().await.unwrap();
    assert!(api.get_current_user().await.is_err());
}

#[tokio::test]
async fn test_sign_out_without_session_fails() {
    let (_, api) = setup();

    let err = api.sign_out_account().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
}

#[tokio::test]
async fn test_get_users_newest_first_with_limit() {
    let (_, api) = setup();
    for name in ["Alice", "Bob", "Carol"] {
        sign_up(&api, name, &format!("{}@example.com", name.to_lowercase())).await;
    }

    let all = api.get_users(None).await.unwrap();
    assert_eq!(all.total, 3);
    let names: Vec<_> = all.documents.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Carol", "Bob", "Alice"]);

    let limited = api.get_users(Some(2)).await.unwrap();
    assert_eq!(limited.documents.len(), 2);
    assert_eq!(limited.total, 3);

    // Zero means no limit
    let unlimited = api.get_users(Some(0)).await.unwrap();
    assert_eq!(unlimited.documents.len(), 3);
}

#[tokio::test]
async fn test_get_user_by_id() {
    let (backend, api) = setup();
    let user = sign_up(&api, "Alice", "alice@example.com").await;

    assert_eq!(api.get_user_by_id(&user.id).await.unwrap(), user);

    let err = api.get_user_by_id("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    backend.clear_calls().await;
    let err = api.get_user_by_id("").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(backend.calls().await.is_empty());
}

#[tokio::test]
async fn test_update_user_without_file_keeps_avatar() {
    let (backend, api) = setup();
    let user = sign_up(&api, "Alice", "alice@example.com").await;
    backend.clear_calls().await;

    let updated = api
        .update_user(UpdateUser {
            user_id: user.id.clone(),
            name: "Alice L.".to_string(),
            bio: "Down the rabbit hole".to_string(),
            image_id: user.image_id.clone(),
            image_url: user.image_url.clone(),
            file: vec![],
        })
        .await
        .unwrap();

    assert_eq!(updated.name, "Alice L.");
    assert_eq!(updated.bio, "Down the rabbit hole");
    assert_eq!(updated.image_url, user.image_url);
    assert_eq!(backend.count(Op::UpdateDocument).await, 1);
    assert_eq!(backend.count(Op::CreateFile).await, 0);
    assert_eq!(backend.count(Op::DeleteFile).await, 0);
}

#[tokio::test]
async fn test_update_user_with_file_replaces_previous_avatar() {
    let (backend, api) = setup();
    let user = sign_up(&api, "Alice", "alice@example.com").await;

    let first = api
        .update_user(UpdateUser {
            user_id: user.id.clone(),
            name: user.name.clone(),
            image_id: user.image_id.clone(),
            image_url: user.image_url.clone(),
            file: vec![image("me.png")],
            ..UpdateUser::default()
        })
        .await
        .unwrap();
    let first_id = first.image_id.clone().expect("avatar uploaded");
    assert!(first.image_url.contains(&first_id));
    // The initials avatar has no blob to delete
    assert_eq!(backend.count(Op::DeleteFile).await, 0);

    let second = api
        .update_user(UpdateUser {
            user_id: user.id.clone(),
            name: user.name.clone(),
            image_id: first.image_id.clone(),
            image_url: first.image_url.clone(),
            file: vec![image("me-again.png")],
            ..UpdateUser::default()
        })
        .await
        .unwrap();
    let second_id = second.image_id.clone().expect("avatar uploaded");

    assert!(!backend.has_file(&ids().storage_id, &first_id).await);
    assert!(backend.has_file(&ids().storage_id, &second_id).await);
    assert_eq!(backend.file_count().await, 1);
}

#[tokio::test]
async fn test_update_user_failure_deletes_new_avatar() {
    let (backend, api) = setup();
    let user = sign_up(&api, "Alice", "alice@example.com").await;
    backend.fail(Op::UpdateDocument).await;

    let result = api
        .update_user(UpdateUser {
            user_id: user.id.clone(),
            name: "Nope".to_string(),
            image_id: user.image_id.clone(),
            image_url: user.image_url.clone(),
            file: vec![image("me.png")],
            ..UpdateUser::default()
        })
        .await;

    assert!(result.is_err());
    assert_eq!(backend.file_count().await, 0);
    assert_eq!(backend.count(Op::DeleteFile).await, 1);
}

#[tokio::test]
async fn test_update_user_failed_preview_deletes_new_avatar() {
    let (backend, api) = setup();
    let user = sign_up(&api, "Alice", "alice@example.com").await;
    backend.clear_calls().await;
    backend.fail(Op::GetFileDownload).await;

    let result = api
        .update_user(UpdateUser {
            user_id: user.id.clone(),
            name: "Alice".to_string(),
            image_id: user.image_id.clone(),
            image_url: user.image_url.clone(),
            file: vec![image("me.png")],
            ..UpdateUser::default()
        })
        .await;

    assert!(result.is_err());
    assert_eq!(backend.count(Op::UpdateDocument).await, 0);
    assert_eq!(backend.count(Op::DeleteFile).await, 1);
    assert_eq!(backend.file_count().await, 0);
}

#[tokio::test]
async fn test_get_user_by_id_rejects_malformed_id() {
    let (backend, api) = setup();

    let err = api.get_user_by_id("../account").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(backend.calls().await.is_empty());
}
