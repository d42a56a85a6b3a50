//! Knowledge index lifecycle and the document-name → remote-file mapping.
//!
//! [`KnowledgeIndexManager`] is the only owner of the set of documents in
//! the knowledge base. It keeps at most one remote search index per
//! session: the first upload creates it, later uploads extend it. The
//! `dirty` flag records that the index's file set changed since the
//! assistant was last built; [`crate::agent::AgentManager`] consults it
//! before every analysis.
//!
//! Remote deletions during removal and clearing are best effort: failures
//! are logged and the local bookkeeping is updated regardless.
//!
//! Mutating methods take `&mut self`; callers serialise access.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::chunk::document_name;
use crate::config::KnowledgeConfig;
use crate::diagnostics::remediation_hint;
use crate::extract::DocumentFormat;
use crate::models::{FileId, IndexId, OperationId, OperationState};
use crate::poll::{await_completion, JobStatus};
use crate::remote::{labels, KnowledgeService, RemoteError};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The file never reached the remote store.
    #[error("Ошибка загрузки файла '{name}':\n{hint}")]
    Upload {
        name: String,
        message: String,
        hint: String,
    },
    /// The file was uploaded (and is tracked) but is not searchable yet.
    #[error("Файл '{name}' загружен, но ошибка индексации:\n{hint}")]
    Indexing {
        name: String,
        message: String,
        hint: String,
    },
}

impl IndexError {
    fn upload(name: &str, message: String) -> Self {
        IndexError::Upload {
            name: name.to_string(),
            hint: remediation_hint(&message),
            message,
        }
    }

    fn indexing(name: &str, message: String) -> Self {
        IndexError::Indexing {
            name: name.to_string(),
            hint: remediation_hint(&message),
            message,
        }
    }
}

/// Naming, labelling, and polling of the remote index.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub index_name: String,
    pub label_key: String,
    pub label_value: String,
    pub poll_interval: Duration,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self::from(&KnowledgeConfig::default())
    }
}

impl From<&KnowledgeConfig> for IndexSettings {
    fn from(config: &KnowledgeConfig) -> Self {
        Self {
            index_name: config.index_name.clone(),
            label_key: config.label_key.clone(),
            label_value: config.label_value.clone(),
            poll_interval: config.index_poll_interval(),
        }
    }
}

pub struct KnowledgeIndexManager {
    service: Arc<dyn KnowledgeService>,
    settings: IndexSettings,
    index: Option<IndexId>,
    files: BTreeMap<String, FileId>,
    dirty: bool,
}

impl KnowledgeIndexManager {
    pub fn new(service: Arc<dyn KnowledgeService>, settings: IndexSettings) -> Self {
        Self {
            service,
            settings,
            index: None,
            files: BTreeMap::new(),
            dirty: true,
        }
    }

    pub fn service(&self) -> &Arc<dyn KnowledgeService> {
        &self.service
    }

    pub fn index(&self) -> Option<&IndexId> {
        self.index.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Called by the agent manager once an assistant matches the current index.
    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// Document names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn file_id(&self, name: &str) -> Option<&FileId> {
        self.files.get(name)
    }

    /// Adopt the application's index left by a previous session, if any.
    ///
    /// Remote failures are logged and leave the manager empty.
    pub async fn restore_from_remote(&mut self) {
        self.dirty = true;
        if let Err(e) = self.try_restore().await {
            tracing::warn!(error = %e, "could not restore knowledge index");
        }
    }

    async fn try_restore(&mut self) -> Result<(), RemoteError> {
        let indexes = self.service.list_indexes().await?;
        let Some(found) = indexes
            .into_iter()
            .find(|i| i.has_label(&self.settings.label_key, &self.settings.label_value))
        else {
            tracing::debug!("no labelled knowledge index found");
            return Ok(());
        };

        let file_ids = self.service.list_index_files(&found.id).await?;
        self.index = Some(found.id.clone());
        for id in file_ids {
            let name = match self.service.get_file(&id).await {
                Ok(file) => file.name.unwrap_or_else(|| id.to_string()),
                Err(e) => {
                    tracing::debug!(file_id = %id, error = %e, "file name lookup failed");
                    id.to_string()
                }
            };
            self.files.insert(name, id);
        }
        tracing::info!(
            index_id = %found.id,
            documents = self.files.len(),
            "restored knowledge index"
        );
        Ok(())
    }

    /// Upload a document and make it searchable. Returns the document name.
    ///
    /// Blocks until the index creation or extension job finishes. On
    /// [`IndexError::Indexing`] the file stays uploaded and tracked, so it
    /// can be removed (or re-added) by name.
    pub async fn add_file(&mut self, path: &Path) -> Result<String, IndexError> {
        let name = document_name(path);
        let mime_type = DocumentFormat::from_path(path)
            .map(DocumentFormat::mime_type)
            .unwrap_or("application/octet-stream");
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| IndexError::upload(&name, e.to_string()))?;

        let file = self
            .service
            .upload_file(&name, mime_type, content)
            .await
            .map_err(|e| IndexError::upload(&name, e.to_string()))?;
        tracing::info!(document = %name, file_id = %file.id, "uploaded document");

        if let Some(previous) = self.files.insert(name.clone(), file.id.clone()) {
            self.delete_remote_file(&previous).await;
            // The old file may already be gone from the index.
            self.dirty = true;
        }

        self.index_file(&file.id)
            .await
            .map_err(|e| IndexError::indexing(&name, e.to_string()))?;

        self.dirty = true;
        Ok(name)
    }

    async fn index_file(&mut self, file: &FileId) -> Result<(), RemoteError> {
        match self.index.clone() {
            None => {
                let op = self
                    .service
                    .create_index(
                        std::slice::from_ref(file),
                        &self.settings.index_name,
                        &self.labels(),
                    )
                    .await?;
                let index_id = self.await_operation("create_index", &op).await?.ok_or_else(
                    || RemoteError::InvalidResponse("index operation returned no id".to_string()),
                )?;
                tracing::info!(index_id = %index_id, "created knowledge index");
                self.index = Some(IndexId(index_id));
            }
            Some(index) => {
                let op = self
                    .service
                    .add_index_files(&index, std::slice::from_ref(file))
                    .await?;
                self.await_operation("add_index_files", &op).await?;
                tracing::info!(index_id = %index, file_id = %file, "extended knowledge index");
            }
        }
        Ok(())
    }

    async fn await_operation(
        &self,
        job: &str,
        op: &OperationId,
    ) -> Result<Option<String>, RemoteError> {
        let service = &self.service;
        await_completion(
            job,
            self.settings.poll_interval,
            || async move {
                service.get_operation(op).await.map(|state| match state {
                    OperationState::Pending => JobStatus::Pending,
                    OperationState::Done(resource) => JobStatus::Done(resource),
                    OperationState::Failed(reason) => JobStatus::Failed(reason),
                })
            },
            RemoteError::JobFailed,
        )
        .await
    }

    fn labels(&self) -> HashMap<String, String> {
        labels(&self.settings.label_key, &self.settings.label_value)
    }

    /// Forget a document and delete its remote file (best effort).
    pub async fn remove_file(&mut self, name: &str) {
        if let Some(id) = self.files.remove(name) {
            tracing::info!(document = name, file_id = %id, "removing document");
            self.delete_remote_file(&id).await;
        }
        self.dirty = true;
    }

    /// Delete the index and every tracked file (best effort), then forget them.
    pub async fn clear(&mut self) {
        if let Some(index) = self.index.take() {
            if let Err(e) = self.service.delete_index(&index).await {
                tracing::warn!(index_id = %index, error = %e, "index deletion failed, continuing");
            }
        }
        let files = std::mem::take(&mut self.files);
        for id in files.values() {
            self.delete_remote_file(id).await;
        }
        self.dirty = true;
        tracing::info!(documents = files.len(), "cleared knowledge base");
    }

    async fn delete_remote_file(&self, id: &FileId) {
        if let Err(e) = self.service.delete_file(id).await {
            tracing::warn!(file_id = %id, error = %e, "file deletion failed, continuing");
        }
    }
}
