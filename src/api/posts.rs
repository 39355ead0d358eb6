use serde_json::json;

use super::{parse_tags, require, require_id, Api};
use crate::error::{AppError, AppResult};
use crate::models::{
    DocumentList, FileHandle, NewPost, Post, SavedPost, Status, UpdatePost,
};
use crate::remote::{unique_id, Query};

/// Page size of the infinite feed.
pub const POSTS_PER_PAGE: u32 = 9;
pub const RECENT_POSTS_LIMIT: u32 = 20;

impl Api {
    /// Upload the image, then write the post document. The uploaded blob is
    /// deleted again if anything after the upload fails.
    pub async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let user_id = require_id(Some(post.user_id.as_str()), "User ID")?;
        require(Some(post.caption.as_str()), "Caption")?;
        let file = post
            .file
            .first()
            .ok_or_else(|| AppError::validation("An image file is required"))?;

        let uploaded = self.upload_file(file).await?;

        match self.write_new_post(user_id, &post, &uploaded).await {
            Ok(created) => {
                tracing::info!("Created post {} for {}", created.id, user_id);
                Ok(created)
            }
            Err(e) => {
                tracing::error!("Error creating post: {}", e);
                self.discard_file(&uploaded.id).await;
                Err(e)
            }
        }
    }

    async fn write_new_post(
        &self,
        user_id: &str,
        post: &NewPost,
        uploaded: &FileHandle,
    ) -> AppResult<Post> {
        let file_url = self.get_file_preview(&uploaded.id)?;

        let document = self
            .remote
            .database
            .create_document(
                &self.ids.database_id,
                &self.ids.post_collection_id,
                &unique_id(),
                json!({
                    "creator": user_id,
                    "caption": post.caption,
                    "imageUrl": file_url.as_str(),
                    "imageId": uploaded.id,
                    "location": post.location,
                    "tags": parse_tags(post.tags.as_deref()),
                }),
            )
            .await?;

        Ok(document.into_model()?)
    }

    /// Update caption, location and tags, swapping the image when a new file
    /// is given. The old blob is only deleted after the document update
    /// succeeds; a failed update deletes the new blob instead.
    pub async fn update_post(&self, post: UpdatePost) -> AppResult<Post> {
        let post_id = require_id(Some(post.post_id.as_str()), "Post ID")?;
        require(Some(post.caption.as_str()), "Caption")?;

        let replacement = match post.file.first() {
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
            Some((id, url)) => (id.as_str(), url.as_str()),
            None => (post.image_id.as_str(), post.image_url.as_str()),
        };

        let updated = self
            .remote
            .database
            .update_document(
                &self.ids.database_id,
                &self.ids.post_collection_id,
                post_id,
                json!({
                    "caption": post.caption,
                    "imageUrl": image_url,
                    "imageId": image_id,
                    "location": post.location,
                    "tags": parse_tags(post.tags.as_deref()),
                }),
            )
            .await;

        let document = match updated {
            Ok(document) => document,
            Err(e) => {
                tracing::error!("Error updating post {}: {}", post_id, e);
                if let Some((new_id, _)) = &replacement {
                    self.discard_file(new_id).await;
                }
                return Err(e.into());
            }
        };

        if replacement.is_some() && !post.image_id.is_empty() {
            self.discard_file(&post.image_id).await;
        }

        Ok(document.into_model()?)
    }

    /// Delete a post and its image. Returns `Ok(None)` without touching the
    /// remote when either id is missing; a malformed id is a validation error.
    pub async fn delete_post(
        &self,
        post_id: Option<&str>,
        image_id: Option<&str>,
    ) -> AppResult<Option<Status>> {
        let (Some(post_id), Some(image_id)) = (
            post_id.filter(|id| !id.is_empty()),
            image_id.filter(|id| !id.is_empty()),
        ) else {
            return Ok(None);
        };
        let post_id = require_id(Some(post_id), "Post ID")?;
        let image_id = require_id(Some(image_id), "Image ID")?;

        self.remote
            .database
            .delete_document(&self.ids.database_id, &self.ids.post_collection_id, post_id)
            .await
            .inspect_err(|e| tracing::error!("Error deleting post {}: {}", post_id, e))?;

        self.discard_file(image_id).await;

        Ok(Some(Status::ok()))
    }

    pub async fn get_post_by_id(&self, post_id: Option<&str>) -> AppResult<Post> {
        let post_id = require_id(post_id, "Post ID")?;

        let document = self
            .remote
            .database
            .get_document(&self.ids.database_id, &self.ids.post_collection_id, post_id)
            .await
            .inspect_err(|e| tracing::error!("Error fetching post {}: {}", post_id, e))?;

        Ok(document.into_model()?)
    }

    pub async fn get_recent_posts(&self) -> AppResult<DocumentList<Post>> {
        self.list_posts(
            &[
                Query::order_desc("$createdAt"),
                Query::limit(RECENT_POSTS_LIMIT),
            ],
            "recent posts",
        )
        .await
    }

    /// Posts by one creator, newest first. A missing id yields an empty list.
    pub async fn get_user_posts(&self, user_id: Option<&str>) -> AppResult<DocumentList<Post>> {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            return Ok(DocumentList::empty());
        };

        self.list_posts(
            &[
                Query::equal("creator", user_id),
                Query::order_desc("$createdAt"),
            ],
            "user posts",
        )
        .await
    }

    /// One page of the feed, most recently updated first. `cursor` is the id
    /// of the last post of the previous page.
    pub async fn get_infinite_posts(&self, cursor: Option<&str>) -> AppResult<DocumentList<Post>> {
        let mut queries = vec![
            Query::order_desc("$updatedAt"),
            Query::limit(POSTS_PER_PAGE),
        ];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            queries.push(Query::cursor_after(cursor));
        }

        self.list_posts(&queries, "infinite posts").await
    }

    pub async fn search_posts(&self, search_term: &str) -> AppResult<DocumentList<Post>> {
        self.list_posts(&[Query::search("caption", search_term)], "search results")
            .await
    }

    async fn list_posts(&self, queries: &[Query], what: &str) -> AppResult<DocumentList<Post>> {
        let list = self
            .remote
            .database
            .list_documents(
                &self.ids.database_id,
                &self.ids.post_collection_id,
                queries,
            )
            .await
            .inspect_err(|e| tracing::error!("Error fetching {}: {}", what, e))?;

        Ok(list.into_models()?)
    }

    /// Replace the post's likes with `likes`. The caller sends the whole
    /// array, so concurrent likes from other sessions can be overwritten.
    pub async fn like_post(&self, post_id: &str, likes: &[String]) -> AppResult<Post> {
        let post_id = require_id(Some(post_id), "Post ID")?;

        let document = self
            .remote
            .database
            .update_document(
                &self.ids.database_id,
                &self.ids.post_collection_id,
                post_id,
                json!({ "likes": likes }),
            )
            .await
            .inspect_err(|e| tracing::error!("Error liking post {}: {}", post_id, e))?;

        Ok(document.into_model()?)
    }

    pub async fn save_post(&self, user_id: &str, post_id: &str) -> AppResult<SavedPost> {
        let user_id = require_id(Some(user_id), "User ID")?;
        let post_id = require_id(Some(post_id), "Post ID")?;

        let document = self
            .remote
            .database
            .create_document(
                &self.ids.database_id,
                &self.ids.saves_collection_id,
                &unique_id(),
                json!({ "user": user_id, "post": post_id }),
            )
            .await
            .inspect_err(|e| tracing::error!("Error saving post {}: {}", post_id, e))?;

        Ok(document.into_model()?)
    }

    pub async fn delete_saved_post(&self, saved_record_id: &str) -> AppResult<Status> {
        let saved_record_id = require_id(Some(saved_record_id), "Saved record ID")?;

        self.remote
            .database
            .delete_document(
                &self.ids.database_id,
                &self.ids.saves_collection_id,
                saved_record_id,
            )
            .await
            .inspect_err(|e| {
                tracing::error!("Error deleting saved post {}: {}", saved_record_id, e)
            })?;

        Ok(Status::ok())
    }
}
