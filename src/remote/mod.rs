//! Ports to the remote services the RAG layer depends on.
//!
//! - [`KnowledgeService`] — file store, search indexes, long-running
//!   operations, assistants, threads, and runs.
//! - [`VisionModel`] — multimodal model that describes an image.
//!
//! Implementations:
//! - **[`cloud::CloudKnowledgeService`]** — REST client for the assistant API.
//! - **[`gemini::GeminiVision`]** — REST client for `generateContent`.
//! - **[`memory`]** — in-memory fakes with call counters, for tests and
//!   offline runs.
//!
//! All failures are reported as [`RemoteError`]. Its `Display` output starts
//! with a gRPC-style status code name (`PERMISSION_DENIED`,
//! `RESOURCE_EXHAUSTED`, …) so that retry detection and remediation hints can
//! work from the description alone.

pub mod cloud;
pub mod gemini;
pub mod memory;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{
    AssistantId, FileId, IndexId, OperationId, OperationState, RemoteFile, RemoteIndex, RunId,
    RunState, ThreadId,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("{code} (HTTP {status}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("remote job failed: {0}")]
    JobFailed(String),
}

impl RemoteError {
    /// Build a status error from an HTTP status, naming it like a gRPC code.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Status {
            status,
            code: status_code_name(status).to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Status { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RemoteError::status(status.as_u16(), e.to_string()),
            None => RemoteError::Transport(e.to_string()),
        }
    }
}

/// gRPC status name for an HTTP status code.
pub fn status_code_name(status: u16) -> &'static str {
    match status {
        400 => "INVALID_ARGUMENT",
        401 => "UNAUTHENTICATED",
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        409 => "ALREADY_EXISTS",
        429 => "RESOURCE_EXHAUSTED",
        501 => "UNIMPLEMENTED",
        503 => "UNAVAILABLE",
        504 => "DEADLINE_EXCEEDED",
        500..=599 => "INTERNAL",
        _ => "UNKNOWN",
    }
}

/// gRPC status name for a numeric gRPC code, as reported by failed
/// long-running operations.
pub fn rpc_code_name(code: i64) -> &'static str {
    match code {
        1 => "CANCELLED",
        3 => "INVALID_ARGUMENT",
        4 => "DEADLINE_EXCEEDED",
        5 => "NOT_FOUND",
        6 => "ALREADY_EXISTS",
        7 => "PERMISSION_DENIED",
        8 => "RESOURCE_EXHAUSTED",
        9 => "FAILED_PRECONDITION",
        12 => "UNIMPLEMENTED",
        13 => "INTERNAL",
        14 => "UNAVAILABLE",
        16 => "UNAUTHENTICATED",
        _ => "UNKNOWN",
    }
}

/// What an assistant is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantSpec {
    pub model: String,
    pub instruction: String,
    /// Index exposed to the assistant through a search tool.
    pub search_index: Option<IndexId>,
}

/// Remote file store, search indexes, and conversational agents.
///
/// Methods map 1:1 to remote calls. Long-running calls (`create_index`,
/// `add_index_files`) return an [`OperationId`] that the caller polls with
/// [`get_operation`](KnowledgeService::get_operation); runs are polled with
/// [`get_run`](KnowledgeService::get_run).
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn list_files(&self) -> Result<Vec<RemoteFile>, RemoteError>;
    async fn get_file(&self, id: &FileId) -> Result<RemoteFile, RemoteError>;
    async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<RemoteFile, RemoteError>;
    async fn delete_file(&self, id: &FileId) -> Result<(), RemoteError>;

    async fn list_indexes(&self) -> Result<Vec<RemoteIndex>, RemoteError>;
    /// Start creating an index seeded with `files`. The finished operation
    /// carries the new index id.
    async fn create_index(
        &self,
        files: &[FileId],
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<OperationId, RemoteError>;
    async fn add_index_files(
        &self,
        index: &IndexId,
        files: &[FileId],
    ) -> Result<OperationId, RemoteError>;
    async fn list_index_files(&self, index: &IndexId) -> Result<Vec<FileId>, RemoteError>;
    async fn delete_index(&self, index: &IndexId) -> Result<(), RemoteError>;
    async fn get_operation(&self, id: &OperationId) -> Result<OperationState, RemoteError>;

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, RemoteError>;
    async fn delete_assistant(&self, id: &AssistantId) -> Result<(), RemoteError>;

    async fn create_thread(&self) -> Result<ThreadId, RemoteError>;
    async fn write_message(&self, thread: &ThreadId, text: &str) -> Result<(), RemoteError>;
    async fn create_run(
        &self,
        assistant: &AssistantId,
        thread: &ThreadId,
    ) -> Result<RunId, RemoteError>;
    async fn get_run(&self, id: &RunId) -> Result<RunState, RemoteError>;
    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), RemoteError>;
}

/// An encoded image ready to be sent to a vision model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Remote multimodal model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Send `prompt` plus `image` to `model` and return the generated text.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: &ImagePayload,
    ) -> Result<String, RemoteError>;
}

/// Labels used to tag (and later rediscover) this application's index.
pub fn labels(key: &str, value: &str) -> HashMap<String, String> {
    HashMap::from([(key.to_string(), value.to_string())])
}
