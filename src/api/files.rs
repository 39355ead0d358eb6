use url::Url;

use super::{require_id, Api};
use crate::error::{AppError, AppResult};
use crate::models::{FileHandle, Status, UploadFile};
use crate::remote::unique_id;

impl Api {
    pub async fn upload_file(&self, file: &UploadFile) -> AppResult<FileHandle> {
        let file_id = unique_id();
        tracing::debug!("Uploading {} ({} bytes) as {}", file.name, file.size(), file_id);

        let handle = self
            .remote
            .storage
            .create_file(&self.ids.storage_id, &file_id, file)
            .await
            .inspect_err(|e| tracing::error!("Error uploading file: {}", e))?;

        if handle.id.is_empty() {
            return Err(AppError::Invariant(format!(
                "Upload of {} returned no file id",
                file.name
            )));
        }
        Ok(handle)
    }

    pub fn get_file_preview(&self, file_id: &str) -> AppResult<Url> {
        let file_id = require_id(Some(file_id), "File ID")?;
        let url = self
            .remote
            .storage
            .get_file_download(&self.ids.storage_id, file_id)
            .inspect_err(|e| tracing::error!("Error fetching file preview: {}", e))?;
        Ok(url)
    }

    pub async fn delete_file(&self, file_id: &str) -> AppResult<Status> {
        let file_id = require_id(Some(file_id), "File ID")?;
        self.remote
            .storage
            .delete_file(&self.ids.storage_id, file_id)
            .await
            .inspect_err(|e| tracing::error!("Error deleting file {}: {}", file_id, e))?;
        Ok(Status::ok())
    }

    /// Best-effort cleanup of a blob that is no longer referenced.
    pub(crate) async fn discard_file(&self, file_id: &str) {
        if let Err(e) = self.delete_file(file_id).await {
            tracing::warn!("Leaving orphaned file {}: {}", file_id, e);
        }
    }
}
