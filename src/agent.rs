//! Lifecycle of the remote conversational agent (assistant).
//!
//! At most one assistant exists per session. It is rebuilt lazily: when the
//! knowledge index reports itself dirty, the next [`AgentManager::ask`]
//! deletes the old assistant and creates one bound to the current index.

use std::sync::Arc;
use std::time::Duration;

use crate::config::KnowledgeConfig;
use crate::diagnostics::remediation_hint;
use crate::index::KnowledgeIndexManager;
use crate::models::{AssistantId, RunId, RunState, ThreadId};
use crate::poll::{await_completion, JobStatus};
use crate::prompts::ASSISTANT_INSTRUCTION;
use crate::remote::{AssistantSpec, KnowledgeService, RemoteError};

/// Returned when a run completes with no text.
pub const EMPTY_REPLY: &str = "(YandexGPT вернул пустой ответ.)";

const ANALYSIS_FAILED: &str = "Ошибка анализа через YandexGPT:";

pub struct AgentManager {
    service: Arc<dyn KnowledgeService>,
    model: String,
    run_poll_interval: Duration,
    assistant: Option<AssistantId>,
}

impl AgentManager {
    pub fn new(
        service: Arc<dyn KnowledgeService>,
        model: impl Into<String>,
        run_poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            model: model.into(),
            run_poll_interval,
            assistant: None,
        }
    }

    pub fn from_config(service: Arc<dyn KnowledgeService>, config: &KnowledgeConfig) -> Self {
        Self::new(service, config.model.clone(), config.run_poll_interval())
    }

    pub fn assistant(&self) -> Option<&AssistantId> {
        self.assistant.as_ref()
    }

    /// Return an assistant bound to the current index, rebuilding it if the
    /// index changed since it was created.
    pub async fn ensure_agent(
        &mut self,
        index: &mut KnowledgeIndexManager,
    ) -> Result<AssistantId, RemoteError> {
        if let Some(id) = &self.assistant {
            if !index.is_dirty() {
                return Ok(id.clone());
            }
        }
        self.discard().await;

        let spec = AssistantSpec {
            model: self.model.clone(),
            instruction: ASSISTANT_INSTRUCTION.to_string(),
            search_index: index.index().cloned(),
        };
        let id = self.service.create_assistant(&spec).await?;
        tracing::info!(
            assistant_id = %id,
            model = %self.model,
            search_index = ?spec.search_index.as_ref().map(|i| i.as_str()),
            "created assistant"
        );
        self.assistant = Some(id.clone());
        index.mark_clean();
        Ok(id)
    }

    /// Delete the current assistant, if any. Remote failures are logged.
    pub async fn discard(&mut self) {
        if let Some(id) = self.assistant.take() {
            if let Err(e) = self.service.delete_assistant(&id).await {
                tracing::warn!(assistant_id = %id, error = %e, "assistant deletion failed, continuing");
            }
        }
    }

    /// Ask the assistant one question in a fresh thread.
    ///
    /// Never fails: remote errors come back as a user-facing message.
    pub async fn ask(&mut self, index: &mut KnowledgeIndexManager, query: &str) -> String {
        match self.try_ask(index, query).await {
            Ok(reply) if reply.trim().is_empty() => EMPTY_REPLY.to_string(),
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "analysis request failed");
                format!("{}\n{}", ANALYSIS_FAILED, remediation_hint(&e.to_string()))
            }
        }
    }

    async fn try_ask(
        &mut self,
        index: &mut KnowledgeIndexManager,
        query: &str,
    ) -> Result<String, RemoteError> {
        let assistant = self.ensure_agent(index).await?;
        let thread = self.service.create_thread().await?;
        let reply = self.run_in_thread(&assistant, &thread, query).await;
        if let Err(e) = self.service.delete_thread(&thread).await {
            tracing::warn!(thread_id = %thread, error = %e, "thread deletion failed, continuing");
        }
        reply
    }

    async fn run_in_thread(
        &self,
        assistant: &AssistantId,
        thread: &ThreadId,
        query: &str,
    ) -> Result<String, RemoteError> {
        self.service.write_message(thread, query).await?;
        let run = self.service.create_run(assistant, thread).await?;
        tracing::debug!(run_id = %run, thread_id = %thread, "run started");
        self.await_run(&run).await
    }

    async fn await_run(&self, run: &RunId) -> Result<String, RemoteError> {
        let service = &self.service;
        await_completion(
            "run",
            self.run_poll_interval,
            || async move {
                service.get_run(run).await.map(|state| match state {
                    RunState::Pending => JobStatus::Pending,
                    RunState::Completed(text) => JobStatus::Done(text),
                    RunState::Failed(reason) => JobStatus::Failed(reason),
                })
            },
            RemoteError::JobFailed,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexSettings;
    use crate::remote::memory::{InMemoryKnowledgeService, DEFAULT_REPLY};
    use tempfile::TempDir;

    fn setup(
        service: &Arc<InMemoryKnowledgeService>,
    ) -> (AgentManager, KnowledgeIndexManager) {
        let agent = AgentManager::new(service.clone(), "yandexgpt", Duration::from_millis(500));
        let index = KnowledgeIndexManager::new(service.clone(), IndexSettings::default());
        (agent, index)
    }

    #[tokio::test]
    async fn clean_index_reuses_assistant() {
        let service = Arc::new(InMemoryKnowledgeService::new());
        let (mut agent, mut index) = setup(&service);

        let first = agent.ensure_agent(&mut index).await.unwrap();
        assert!(!index.is_dirty());
        let second = agent.ensure_agent(&mut index).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.calls("create_assistant"), 1);
        assert_eq!(service.calls("delete_assistant"), 0);
    }

    #[tokio::test]
    async fn dirty_index_rebuilds_assistant_with_search_tool() {
        let service = Arc::new(InMemoryKnowledgeService::new());
        let (mut agent, mut index) = setup(&service);
        let first = agent.ensure_agent(&mut index).await.unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("38-FZ.txt");
        std::fs::write(&path, "Статья 5.").unwrap();
        index.add_file(&path).await.unwrap();
        assert!(index.is_dirty());

        let second = agent.ensure_agent(&mut index).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(service.calls("delete_assistant"), 1);

        let assistants = service.assistants();
        assert_eq!(assistants.len(), 1);
        let (id, spec) = &assistants[0];
        assert_eq!(id, &second);
        assert_eq!(spec.model, "yandexgpt");
        assert_eq!(spec.instruction, ASSISTANT_INSTRUCTION);
        assert_eq!(spec.search_index.as_ref(), index.index());
    }

    #[tokio::test]
    async fn no_index_means_no_search_tool() {
        let service = Arc::new(InMemoryKnowledgeService::new());
        let (mut agent, mut index) = setup(&service);
        agent.ensure_agent(&mut index).await.unwrap();
        assert_eq!(service.assistants()[0].1.search_index, None);
    }

    #[tokio::test(start_paused = true)]
    async fn ask_returns_reply_and_deletes_thread() {
        let service = Arc::new(InMemoryKnowledgeService::with_pending_polls(3));
        let (mut agent, mut index) = setup(&service);

        let reply = agent.ask(&mut index, "Проверь: «Лучший кофе»").await;

        assert_eq!(reply, DEFAULT_REPLY);
        assert_eq!(service.messages(), vec!["Проверь: «Лучший кофе»".to_string()]);
        assert_eq!(service.calls("get_run"), 4);
        assert_eq!(service.calls("delete_thread"), 1);
        assert_eq!(service.thread_count(), 0);
    }

    #[tokio::test]
    async fn empty_reply_has_placeholder() {
        let service = Arc::new(InMemoryKnowledgeService::new());
        service.set_reply("  \n");
        let (mut agent, mut index) = setup(&service);
        assert_eq!(agent.ask(&mut index, "q").await, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn failure_is_reported_with_hint() {
        let service = Arc::new(InMemoryKnowledgeService::new());
        service.fail("create_run", RemoteError::status(401, "token expired"));
        let (mut agent, mut index) = setup(&service);

        let reply = agent.ask(&mut index, "q").await;

        assert!(reply.starts_with("Ошибка анализа через YandexGPT:\nНе авторизован."));
        assert!(reply.contains("Оригинал: UNAUTHENTICATED (HTTP 401)"));
        // Thread is still cleaned up.
        assert_eq!(service.calls("delete_thread"), 1);
    }

    #[tokio::test]
    async fn assistant_creation_failure_is_reported() {
        let service = Arc::new(InMemoryKnowledgeService::new());
        service.fail("create_assistant", RemoteError::Transport("dns".into()));
        let (mut agent, mut index) = setup(&service);

        let reply = agent.ask(&mut index, "q").await;

        assert!(reply.starts_with(ANALYSIS_FAILED));
        assert!(agent.assistant().is_none());
        assert!(index.is_dirty());
        assert_eq!(service.calls("create_thread"), 0);
    }

    #[tokio::test]
    async fn discard_swallows_remote_failure() {
        let service = Arc::new(InMemoryKnowledgeService::new());
        let (mut agent, mut index) = setup(&service);
        agent.ensure_agent(&mut index).await.unwrap();

        service.fail("delete_assistant", RemoteError::status(503, "busy"));
        agent.discard().await;

        assert!(agent.assistant().is_none());
        assert_eq!(service.calls("delete_assistant"), 1);
    }
}
