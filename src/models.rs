//! Core data models shared by the ingestion pipeline and the RAG layer.
//!
//! Remote resources are referred to by opaque string ids wrapped in
//! newtypes, so a file id can never be passed where an index id is expected.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// A bounded, boundary-snapped excerpt of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `"<source>_chunk_<index>"`.
    pub id: String,
    pub text: String,
    /// Name of the document the chunk was cut from.
    pub source: String,
    pub chunk_index: usize,
    /// Character offset of the window this chunk was cut from.
    pub start: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

macro_rules! remote_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

remote_id!(
    /// Handle of an uploaded file in the remote store.
    FileId
);
remote_id!(
    /// Handle of the remote search index.
    IndexId
);
remote_id!(AssistantId);
remote_id!(ThreadId);
remote_id!(RunId);
remote_id!(
    /// Handle of a long-running remote operation (index creation or extension).
    OperationId
);

/// Metadata of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: FileId,
    pub name: Option<String>,
}

/// Metadata of a remote search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIndex {
    pub id: IndexId,
    pub name: Option<String>,
    pub labels: HashMap<String, String>,
}

impl RemoteIndex {
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).map(String::as_str) == Some(value)
    }
}

/// Snapshot of a long-running remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    /// Finished; carries the id of the resource the operation produced, if any.
    Done(Option<String>),
    Failed(String),
}

/// Snapshot of an assistant run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    /// Finished; carries the assistant's reply text (possibly empty).
    Completed(String),
    Failed(String),
}

/// One analysis submission from the shell. At least one field should be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub text: Option<String>,
    pub image: Option<PathBuf>,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, image: Option<PathBuf>) -> Self {
        let text = text.into();
        Self {
            text: if text.is_empty() { None } else { Some(text) },
            image,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Categorical status the assistant instruction asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Acceptable,
    NeedsRevision,
    Prohibited,
}

impl Verdict {
    /// Literal the model prints after `СТАТУС:`.
    pub fn literal(self) -> &'static str {
        match self {
            Verdict::Acceptable => "ДОПУСТИМО",
            Verdict::NeedsRevision => "ТРЕБУЕТ ДОРАБОТКИ",
            Verdict::Prohibited => "ЗАПРЕЩЕНО",
        }
    }
}
