//! Analysis orchestrator: the contract between the core and any shell.
//!
//! [`Engine`] owns the session state: the knowledge index, the assistant
//! bound to it, the vision describer, and a local chunk preview per
//! uploaded document. Without knowledge-service credentials the engine runs
//! unconfigured: analysis answers with a fixed message and document
//! operations are refused or ignored.
//!
//! # Analysis flow
//!
//! ```text
//! NotStarted ─▶ Describing (image only) ─▶ Querying ─▶ Done
//!                      │                      │
//!                      └──────────▶ Failed ◀──┘
//! ```
//!
//! [`Engine::analyze`] never fails: every outcome, including remote
//! failures, is rendered as text for the user.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::AgentManager;
use crate::chunk::Chunker;
use crate::config::Config;
use crate::diagnostics::{connection_report, excerpt, Probe};
use crate::extract::LoadError;
use crate::index::{IndexError, IndexSettings, KnowledgeIndexManager};
use crate::models::{AnalysisRequest, Chunk};
use crate::prompts::{image_query, text_query};
use crate::remote::cloud::CloudKnowledgeService;
use crate::remote::gemini::GeminiVision;
use crate::remote::{KnowledgeService, RemoteError, VisionModel};
use crate::retry::RetryPolicy;
use crate::vision::VisionDescriber;

pub const NOTHING_SUBMITTED: &str =
    "Не предоставлен материал для проверки. Введите текст или прикрепите изображение.";
pub const NOT_CONFIGURED: &str = "Yandex Cloud не настроен. Анализ невозможен.";
pub const CANCELLED: &str = "Анализ отменён.";

const DESCRIBE_FAILED: &str = "Ошибка описания изображения (Gemini):";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Yandex Cloud не настроен. Укажите Folder ID и API Key.")]
    NotConfigured,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Where an analysis request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    NotStarted,
    Describing,
    Querying,
    Done,
    Failed,
}

/// Knowledge-service state; present only when credentials are configured.
struct Session {
    index: KnowledgeIndexManager,
    agent: AgentManager,
}

impl Session {
    fn new(service: Arc<dyn KnowledgeService>, config: &Config) -> Self {
        Self {
            index: KnowledgeIndexManager::new(
                service.clone(),
                IndexSettings::from(&config.knowledge),
            ),
            agent: AgentManager::from_config(service, &config.knowledge),
        }
    }
}

pub struct Engine {
    chunker: Chunker,
    session: Option<Session>,
    vision: VisionDescriber,
    chunks: BTreeMap<String, Vec<Chunk>>,
}

impl Engine {
    /// Build an engine over the given remote services. `None` for the
    /// knowledge service means unconfigured mode.
    pub fn new(
        config: &Config,
        knowledge: Option<Arc<dyn KnowledgeService>>,
        vision: Option<Arc<dyn VisionModel>>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            chunker: Chunker::from_config(&config.chunking),
            session: knowledge.map(|service| Session::new(service, config)),
            vision: VisionDescriber::from_config(vision, &config.vision, retry),
            chunks: BTreeMap::new(),
        }
    }

    /// Build the HTTP clients from `config` and restore the previous
    /// session's knowledge index.
    pub async fn connect(config: &Config) -> Result<Self, RemoteError> {
        let creds = &config.credentials;
        let knowledge: Option<Arc<dyn KnowledgeService>> =
            match (&creds.folder_id, &creds.knowledge_api_key) {
                (Some(folder), Some(key)) => Some(Arc::new(CloudKnowledgeService::new(
                    &config.knowledge,
                    folder,
                    key,
                )?)),
                _ => {
                    tracing::warn!("YC_FOLDER_ID / YC_API_KEY not set, running unconfigured");
                    None
                }
            };
        let vision: Option<Arc<dyn VisionModel>> = match &creds.vision_api_key {
            Some(key) => Some(Arc::new(GeminiVision::new(&config.vision, key)?)),
            None => {
                tracing::warn!("GEMINI_API_KEY not set, image analysis disabled");
                None
            }
        };

        let mut engine = Self::new(config, knowledge, vision);
        engine.restore().await;
        Ok(engine)
    }

    /// Adopt the knowledge index left by a previous session, if any.
    pub async fn restore(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.index.restore_from_remote().await;
        }
    }

    pub fn is_configured(&self) -> bool {
        self.session.is_some()
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Parse, chunk, upload, and index one document. Returns its name.
    pub async fn add_document(&mut self, path: &Path) -> Result<String, EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NotConfigured)?;
        let chunks = self.chunker.process_document(path)?;
        tracing::info!(
            path = %path.display(),
            chunks = chunks.len(),
            "document parsed"
        );

        let name = match session.index.add_file(path).await {
            Ok(name) => name,
            Err(e) => {
                // The file stays tracked when only indexing failed.
                if let IndexError::Indexing { name, .. } = &e {
                    self.chunks.insert(name.clone(), chunks);
                }
                return Err(e.into());
            }
        };
        self.chunks.insert(name.clone(), chunks);
        Ok(name)
    }

    /// Add documents one after another, reporting each outcome.
    pub async fn add_documents(
        &mut self,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<String, EngineError>)> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let result = self.add_document(path).await;
            if let Err(e) = &result {
                tracing::warn!(path = %path.display(), error = %e, "document not added");
            }
            results.push((path.clone(), result));
        }
        results
    }

    pub async fn remove_document(&mut self, name: &str) {
        if let Some(session) = self.session.as_mut() {
            session.index.remove_file(name).await;
        }
        self.chunks.remove(name);
    }

    /// Delete the assistant, the index, and every uploaded document.
    pub async fn clear_all_documents(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.agent.discard().await;
            session.index.clear().await;
        }
        self.chunks.clear();
    }

    pub fn list_document_names(&self) -> Vec<String> {
        self.session
            .as_ref()
            .map(|s| s.index.names())
            .unwrap_or_default()
    }

    pub fn document_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.index.count())
    }

    /// Chunks cut from a document uploaded in this session.
    pub fn chunks(&self, name: &str) -> Option<&[Chunk]> {
        self.chunks.get(name).map(Vec::as_slice)
    }

    pub fn vision_model(&self) -> &str {
        self.vision.model()
    }

    pub fn set_vision_model(&mut self, name: &str) {
        self.vision.set_model(name);
    }

    pub async fn analyze(&mut self, text: &str, image: Option<&Path>) -> String {
        let request = AnalysisRequest::new(text, image.map(Path::to_path_buf));
        self.analyze_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Analyse an ad. `cancel` is checked before describing the image and
    /// before returning the report.
    pub async fn analyze_with_cancel(
        &mut self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> String {
        let image = request.image.as_deref().filter(|p| p.is_file());
        let text = request.text();
        if image.is_none() && text.trim().is_empty() {
            return NOTHING_SUBMITTED.to_string();
        }
        let Some(session) = self.session.as_mut() else {
            return NOT_CONFIGURED.to_string();
        };
        let documents = session.index.count();
        log_stage(AnalysisStage::NotStarted);

        let query = match image {
            Some(path) => {
                if cancel.is_cancelled() {
                    return CANCELLED.to_string();
                }
                log_stage(AnalysisStage::Describing);
                match self.vision.describe(path).await {
                    Ok(description) => image_query(&description, text, documents),
                    Err(e) => {
                        tracing::error!(error = %e, image = %path.display(), "image description failed");
                        log_stage(AnalysisStage::Failed);
                        return format!("{}\n{}", DESCRIBE_FAILED, excerpt(&e.to_string(), 200));
                    }
                }
            }
            None => text_query(text, documents),
        };

        log_stage(AnalysisStage::Querying);
        let report = session.agent.ask(&mut session.index, &query).await;
        if cancel.is_cancelled() {
            return CANCELLED.to_string();
        }
        log_stage(AnalysisStage::Done);
        report
    }

    /// Probe the knowledge service: `"ok"` or a diagnostic report.
    pub async fn test_connection(&self) -> String {
        let Some(session) = self.session.as_ref() else {
            return NOT_CONFIGURED.to_string();
        };
        let service = session.index.service();
        let probes = [
            Probe {
                label: "Файлы (files.list)",
                error: service.list_files().await.err().map(|e| e.to_string()),
            },
            Probe {
                label: "Индексы (search_indexes.list)",
                error: service.list_indexes().await.err().map(|e| e.to_string()),
            },
        ];
        connection_report(&probes)
    }
}

fn log_stage(stage: AnalysisStage) {
    tracing::debug!(?stage, "analysis stage");
}
