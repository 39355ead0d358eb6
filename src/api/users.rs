use serde_json::json;
use url::Url;

use super::{require_id, Api};
use crate::error::{AppError, AppResult};
use crate::models::{Account, AccountSession, DocumentList, NewUser, UpdateUser, User};
use crate::remote::{unique_id, Query, CURRENT_SESSION};

impl Api {
    /// Create the remote account, then the user document that the rest of
    /// the app reads. Nothing is written if the account cannot be created.
    pub async fn create_user_account(&self, user: NewUser) -> AppResult<User> {
        let account = self
            .remote
            .account
            .create(&unique_id(), &user.email, &user.password, &user.name)
            .await
            .inspect_err(|e| tracing::error!("Error creating account for {}: {}", user.email, e))?;

        let avatar_url = self.remote.avatars.get_initials(&user.name)?;

        self.save_user_to_db(&account, &user.username, &avatar_url)
            .await
    }

    pub async fn save_user_to_db(
        &self,
        account: &Account,
        username: &str,
        image_url: &Url,
    ) -> AppResult<User> {
        let document = self
            .remote
            .database
            .create_document(
                &self.ids.database_id,
                &self.ids.user_collection_id,
                &unique_id(),
                json!({
                    "accountId": account.id,
                    "name": account.name,
                    "email": account.email,
                    "username": username,
                    "imageUrl": image_url.as_str(),
                }),
            )
            .await
            .inspect_err(|e| tracing::error!("Error saving user {}: {}", account.id, e))?;

        let user: User = document.into_model()?;
        tracing::info!("Created user {} ({})", user.id, user.username);
        Ok(user)
    }

    /// Start an email/password session, replacing any session that is
    /// still active (the remote refuses a second one).
    pub async fn sign_in_account(&self, email: &str, password: &str) -> AppResult<AccountSession> {
        if self.remote.account.get().await.is_ok() {
            match self.remote.account.delete_session(CURRENT_SESSION).await {
                Ok(()) => tracing::debug!("Deleted previous session"),
                Err(e) => tracing::debug!("Could not delete previous session: {}", e),
            }
        }

        let session = self
            .remote
            .account
            .create_email_password_session(email, password)
            .await
            .inspect_err(|e| tracing::error!("Error signing in {}: {}", email, e))?;

        tracing::info!("Signed in {}", email);
        Ok(session)
    }

    pub async fn sign_out_account(&self) -> AppResult<()> {
        self.remote
            .account
            .delete_session(CURRENT_SESSION)
            .await
            .inspect_err(|e| tracing::error!("Error signing out: {}", e))?;
        Ok(())
    }

    /// The user document belonging to the active account.
    pub async fn get_current_user(&self) -> AppResult<User> {
        let account = self.remote.account.get().await?;

        let list = self
            .remote
            .database
            .list_documents(
                &self.ids.database_id,
                &self.ids.user_collection_id,
                &[Query::equal("accountId", account.id.as_str())],
            )
            .await?;

        let document = list.documents.into_iter().next().ok_or_else(|| {
            AppError::NotFound(format!("No user document for account {}", account.id))
        })?;

        Ok(document.into_model()?)
    }

    pub async fn get_users(&self, limit: Option<u32>) -> AppResult<DocumentList<User>> {
        let mut queries = vec![Query::order_desc("$createdAt")];
        if let Some(limit) = limit.filter(|l| *l > 0) {
            queries.push(Query::limit(limit));
        }

        let list = self
            .remote
            .database
            .list_documents(
                &self.ids.database_id,
                &self.ids.user_collection_id,
                &queries,
            )
            .await
            .inspect_err(|e| tracing::error!("Error fetching users: {}", e))?;

        Ok(list.into_models()?)
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> AppResult<User> {
        let user_id = require_id(Some(user_id), "User ID")?;

        let document = self
            .remote
            .database
            .get_document(&self.ids.database_id, &self.ids.user_collection_id, user_id)
            .await
            .inspect_err(|e| tracing::error!("Error fetching user {}: {}", user_id, e))?;

        Ok(document.into_model()?)
    }

    /// Update the profile, uploading a new avatar only when a file is given.
    /// Same order as post updates: the old avatar goes only after the
    /// document update succeeds.
    pub async fn update_user(&self, user: UpdateUser) -> AppResult<User> {
        let user_id = require_id(Some(user.user_id.as_str()), "User ID")?;

        let replacement = match user.file.first() {
            Some(file) => {
                let uploaded = self.upload_file(file).await?;
                match self.get_file_preview(&uploaded.id) {
                    Ok(url) => Some((uploaded.id, url.to_string())),
                    Err(e) => {
                        self.discard_file(&uploaded.id).await;
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let (image_id, image_url) = match &replacement {
            Some((id, url)) => (Some(id.as_str()), url.as_str()),
            None => (user.image_id.as_deref(), user.image_url.as_str()),
        };

        let updated = self
            .remote
            .database
            .update_document(
                &self.ids.database_id,
                &self.ids.user_collection_id,
                user_id,
                json!({
                    "name": user.name,
                    "bio": user.bio,
                    "imageUrl": image_url,
                    "imageId": image_id,
                }),
            )
            .await;

        let document = match updated {
            Ok(document) => document,
            Err(e) => {
                tracing::error!("Error updating user {}: {}", user_id, e);
                if let Some((new_id, _)) = &replacement {
                    self.discard_file(new_id).await;
                }
                return Err(e.into());
            }
        };

        let old_id = user.image_id.as_deref().filter(|id| !id.is_empty());
        if let (Some(_), Some(old_id)) = (&replacement, old_id) {
            self.discard_file(old_id).await;
        }

        Ok(document.into_model()?)
    }
}
