//! In-memory [`KnowledgeService`] and [`VisionModel`] fakes.
//!
//! Used by the test suite and by `adcensor --offline`. Every remote call is
//! counted per method so tests can assert which paths were (or were not)
//! taken. Failures can be injected per method, long-running operations stay
//! pending for a configurable number of polls, and runs answer with a fixed
//! reply.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{AssistantSpec, ImagePayload, KnowledgeService, RemoteError, VisionModel};
use crate::models::{
    AssistantId, FileId, IndexId, OperationId, OperationState, RemoteFile, RemoteIndex, RunId,
    RunState, ThreadId,
};

/// Reply used by runs unless [`InMemoryKnowledgeService::set_reply`] is called.
pub const DEFAULT_REPLY: &str = "======================================\n\
УРОВЕНЬ РИСКА: 15%\n\
СТАТУС: ДОПУСТИМО\n\
======================================";

/// Methods of [`KnowledgeService`] that make up the conversational-agent path.
pub const AGENT_METHODS: [&str; 5] = [
    "create_assistant",
    "create_thread",
    "write_message",
    "create_run",
    "get_run",
];

struct StoredIndex {
    index: RemoteIndex,
    files: Vec<FileId>,
}

struct PendingJob {
    polls_left: u32,
    outcome: OperationState,
}

#[derive(Default)]
struct State {
    files: BTreeMap<FileId, RemoteFile>,
    indexes: BTreeMap<IndexId, StoredIndex>,
    operations: HashMap<OperationId, PendingJob>,
    assistants: BTreeMap<AssistantId, AssistantSpec>,
    threads: BTreeMap<ThreadId, Vec<String>>,
    runs: HashMap<RunId, u32>,
    messages: Vec<String>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, RemoteError>,
    operation_failure: Option<String>,
    reply: String,
}

/// In-memory knowledge service.
pub struct InMemoryKnowledgeService {
    state: Mutex<State>,
    pending_polls: u32,
}

impl Default for InMemoryKnowledgeService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKnowledgeService {
    pub fn new() -> Self {
        Self::with_pending_polls(0)
    }

    /// Operations and runs report `Pending` this many times before finishing.
    pub fn with_pending_polls(pending_polls: u32) -> Self {
        Self {
            state: Mutex::new(State {
                reply: DEFAULT_REPLY.to_string(),
                ..State::default()
            }),
            pending_polls,
        }
    }

    /// Create a labelled index holding files with the given names, as if left
    /// behind by a previous session. Not counted as calls.
    pub fn seed_index(&self, labels: HashMap<String, String>, file_names: &[&str]) -> IndexId {
        let mut state = self.state.lock().unwrap();
        let mut ids = Vec::new();
        for name in file_names {
            let id = FileId(format!("file-{}", Uuid::new_v4()));
            state.files.insert(
                id.clone(),
                RemoteFile {
                    id: id.clone(),
                    name: Some(name.to_string()),
                },
            );
            ids.push(id);
        }
        let index_id = IndexId(format!("index-{}", Uuid::new_v4()));
        state.indexes.insert(
            index_id.clone(),
            StoredIndex {
                index: RemoteIndex {
                    id: index_id.clone(),
                    name: Some("ad_censor_index".to_string()),
                    labels,
                },
                files: ids,
            },
        );
        index_id
    }

    /// Make every call of `method` fail with `error` until [`recover`](Self::recover).
    pub fn fail(&self, method: &'static str, error: RemoteError) {
        self.state.lock().unwrap().failures.insert(method, error);
    }

    pub fn recover(&self, method: &'static str) {
        self.state.lock().unwrap().failures.remove(method);
    }

    /// Make subsequently started operations finish as failed.
    pub fn fail_operations(&self, reason: &str) {
        self.state.lock().unwrap().operation_failure = Some(reason.to_string());
    }

    /// Forget a file's name so `get_file` returns it without one.
    pub fn strip_file_name(&self, id: &FileId) {
        if let Some(file) = self.state.lock().unwrap().files.get_mut(id) {
            file.name = None;
        }
    }

    pub fn set_reply(&self, reply: &str) {
        self.state.lock().unwrap().reply = reply.to_string();
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    /// Calls made on the conversational-agent path.
    pub fn agent_calls(&self) -> usize {
        AGENT_METHODS.iter().map(|m| self.calls(m)).sum()
    }

    /// Every message written to any thread, in order.
    pub fn messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    pub fn index_ids(&self) -> Vec<IndexId> {
        self.state.lock().unwrap().indexes.keys().cloned().collect()
    }

    pub fn index_file_count(&self, index: &IndexId) -> usize {
        self.state
            .lock()
            .unwrap()
            .indexes
            .get(index)
            .map(|i| i.files.len())
            .unwrap_or(0)
    }

    pub fn assistants(&self) -> Vec<(AssistantId, AssistantSpec)> {
        self.state
            .lock()
            .unwrap()
            .assistants
            .iter()
            .map(|(id, spec)| (id.clone(), spec.clone()))
            .collect()
    }

    pub fn thread_count(&self) -> usize {
        self.state.lock().unwrap().threads.len()
    }

    /// Count the call and return the injected failure for `method`, if any.
    fn enter(&self, method: &'static str) -> Result<std::sync::MutexGuard<'_, State>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_insert(0) += 1;
        if let Some(err) = state.failures.get(method) {
            return Err(err.clone());
        }
        Ok(state)
    }

    fn start_operation(&self, state: &mut State, resource: Option<String>) -> OperationId {
        let id = OperationId(format!("op-{}", Uuid::new_v4()));
        let outcome = match &state.operation_failure {
            Some(reason) => OperationState::Failed(reason.clone()),
            None => OperationState::Done(resource),
        };
        state.operations.insert(
            id.clone(),
            PendingJob {
                polls_left: self.pending_polls,
                outcome,
            },
        );
        id
    }
}

fn not_found(what: &str, id: &str) -> RemoteError {
    RemoteError::status(404, format!("{} {} not found", what, id))
}

#[async_trait]
impl KnowledgeService for InMemoryKnowledgeService {
    async fn list_files(&self) -> Result<Vec<RemoteFile>, RemoteError> {
        let state = self.enter("list_files")?;
        Ok(state.files.values().cloned().collect())
    }

    async fn get_file(&self, id: &FileId) -> Result<RemoteFile, RemoteError> {
        let state = self.enter("get_file")?;
        state
            .files
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("file", id.as_str()))
    }

    async fn upload_file(
        &self,
        name: &str,
        _mime_type: &str,
        _content: Vec<u8>,
    ) -> Result<RemoteFile, RemoteError> {
        let mut state = self.enter("upload_file")?;
        let file = RemoteFile {
            id: FileId(format!("file-{}", Uuid::new_v4())),
            name: Some(name.to_string()),
        };
        state.files.insert(file.id.clone(), file.clone());
        Ok(file)
    }

    async fn delete_file(&self, id: &FileId) -> Result<(), RemoteError> {
        let mut state = self.enter("delete_file")?;
        state
            .files
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("file", id.as_str()))?;
        for stored in state.indexes.values_mut() {
            stored.files.retain(|f| f != id);
        }
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<RemoteIndex>, RemoteError> {
        let state = self.enter("list_indexes")?;
        Ok(state.indexes.values().map(|s| s.index.clone()).collect())
    }

    async fn create_index(
        &self,
        files: &[FileId],
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<OperationId, RemoteError> {
        let mut state = self.enter("create_index")?;
        let id = IndexId(format!("index-{}", Uuid::new_v4()));
        if state.operation_failure.is_none() {
            state.indexes.insert(
                id.clone(),
                StoredIndex {
                    index: RemoteIndex {
                        id: id.clone(),
                        name: Some(name.to_string()),
                        labels: labels.clone(),
                    },
                    files: files.to_vec(),
                },
            );
        }
        Ok(self.start_operation(&mut state, Some(id.0)))
    }

    async fn add_index_files(
        &self,
        index: &IndexId,
        files: &[FileId],
    ) -> Result<OperationId, RemoteError> {
        let mut state = self.enter("add_index_files")?;
        let failing = state.operation_failure.is_some();
        let stored = state
            .indexes
            .get_mut(index)
            .ok_or_else(|| not_found("search index", index.as_str()))?;
        if !failing {
            stored.files.extend(files.iter().cloned());
        }
        Ok(self.start_operation(&mut state, None))
    }

    async fn list_index_files(&self, index: &IndexId) -> Result<Vec<FileId>, RemoteError> {
        let state = self.enter("list_index_files")?;
        state
            .indexes
            .get(index)
            .map(|s| s.files.clone())
            .ok_or_else(|| not_found("search index", index.as_str()))
    }

    async fn delete_index(&self, index: &IndexId) -> Result<(), RemoteError> {
        let mut state = self.enter("delete_index")?;
        state
            .indexes
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| not_found("search index", index.as_str()))
    }

    async fn get_operation(&self, id: &OperationId) -> Result<OperationState, RemoteError> {
        let mut state = self.enter("get_operation")?;
        let job = state
            .operations
            .get_mut(id)
            .ok_or_else(|| not_found("operation", id.as_str()))?;
        if job.polls_left > 0 {
            job.polls_left -= 1;
            return Ok(OperationState::Pending);
        }
        Ok(job.outcome.clone())
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, RemoteError> {
        let mut state = self.enter("create_assistant")?;
        let id = AssistantId(format!("assistant-{}", Uuid::new_v4()));
        state.assistants.insert(id.clone(), spec.clone());
        Ok(id)
    }

    async fn delete_assistant(&self, id: &AssistantId) -> Result<(), RemoteError> {
        let mut state = self.enter("delete_assistant")?;
        state
            .assistants
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("assistant", id.as_str()))
    }

    async fn create_thread(&self) -> Result<ThreadId, RemoteError> {
        let mut state = self.enter("create_thread")?;
        let id = ThreadId(format!("thread-{}", Uuid::new_v4()));
        state.threads.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn write_message(&self, thread: &ThreadId, text: &str) -> Result<(), RemoteError> {
        let mut state = self.enter("write_message")?;
        state
            .threads
            .get_mut(thread)
            .ok_or_else(|| not_found("thread", thread.as_str()))?
            .push(text.to_string());
        state.messages.push(text.to_string());
        Ok(())
    }

    async fn create_run(
        &self,
        assistant: &AssistantId,
        thread: &ThreadId,
    ) -> Result<RunId, RemoteError> {
        let mut state = self.enter("create_run")?;
        if !state.assistants.contains_key(assistant) {
            return Err(not_found("assistant", assistant.as_str()));
        }
        if !state.threads.contains_key(thread) {
            return Err(not_found("thread", thread.as_str()));
        }
        let id = RunId(format!("run-{}", Uuid::new_v4()));
        state.runs.insert(id.clone(), self.pending_polls);
        Ok(id)
    }

    async fn get_run(&self, id: &RunId) -> Result<RunState, RemoteError> {
        let mut state = self.enter("get_run")?;
        let reply = state.reply.clone();
        let polls_left = state
            .runs
            .get_mut(id)
            .ok_or_else(|| not_found("run", id.as_str()))?;
        if *polls_left > 0 {
            *polls_left -= 1;
            return Ok(RunState::Pending);
        }
        Ok(RunState::Completed(reply))
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), RemoteError> {
        let mut state = self.enter("delete_thread")?;
        state
            .threads
            .remove(thread)
            .map(|_| ())
            .ok_or_else(|| not_found("thread", thread.as_str()))
    }
}

/// Vision model answering from a script of canned results.
///
/// Each call pops the next scripted result; once the script runs out every
/// call succeeds with [`ScriptedVision::DEFAULT_DESCRIPTION`].
pub struct ScriptedVision {
    script: Mutex<VecDeque<Result<String, RemoteError>>>,
    seen: Mutex<Vec<(String, ImagePayload)>>,
}

impl ScriptedVision {
    pub const DEFAULT_DESCRIPTION: &'static str =
        "На изображении чашка кофе и надпись «Лучший кофе в городе».";

    pub fn new(script: Vec<Result<String, RemoteError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Models requested so far, in call order.
    pub fn models(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn last_image(&self) -> Option<ImagePayload> {
        self.seen.lock().unwrap().last().map(|(_, img)| img.clone())
    }
}

impl Default for ScriptedVision {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    async fn generate(
        &self,
        model: &str,
        _prompt: &str,
        image: &ImagePayload,
    ) -> Result<String, RemoteError> {
        self.seen
            .lock()
            .unwrap()
            .push((model.to_string(), image.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::DEFAULT_DESCRIPTION.to_string()))
    }
}
