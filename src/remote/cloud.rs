//! REST client for the cloud assistant API (files, search indexes,
//! assistants, threads, runs) and its operation service.
//!
//! Every request carries `Authorization: Api-Key <key>` and the folder id.
//! List endpoints are paginated with `pageToken` / `nextPageToken`.
//! Uploaded file content travels base64-encoded inside the JSON body.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::{rpc_code_name, AssistantSpec, KnowledgeService, RemoteError};
use crate::config::KnowledgeConfig;
use crate::models::{
    AssistantId, FileId, IndexId, OperationId, OperationState, RemoteFile, RemoteIndex, RunId,
    RunState, ThreadId,
};

const PAGE_SIZE: u32 = 100;

pub struct CloudKnowledgeService {
    client: reqwest::Client,
    base_url: String,
    operations_url: String,
    folder_id: String,
    api_key: String,
    file_ttl_days: u32,
}

impl CloudKnowledgeService {
    pub fn new(
        config: &KnowledgeConfig,
        folder_id: &str,
        api_key: &str,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            operations_url: config.operations_url.trim_end_matches('/').to_string(),
            folder_id: folder_id.to_string(),
            api_key: api_key.to_string(),
            file_ttl_days: config.file_ttl_days,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .header("x-folder-id", &self.folder_id)
    }

    async fn get(&self, url: String, query: &[(&str, String)]) -> Result<Value, RemoteError> {
        send(self.request(reqwest::Method::GET, url).query(query)).await
    }

    async fn post(&self, url: String, body: Value) -> Result<Value, RemoteError> {
        send(self.request(reqwest::Method::POST, url).json(&body)).await
    }

    async fn delete(&self, url: String) -> Result<(), RemoteError> {
        send(self.request(reqwest::Method::DELETE, url)).await.map(|_| ())
    }

    /// Fetch every page of a list endpoint and concatenate the `field` arrays.
    async fn list_all(
        &self,
        path: &str,
        field: &str,
        mut query: Vec<(&str, String)>,
    ) -> Result<Vec<Value>, RemoteError> {
        query.push(("pageSize", PAGE_SIZE.to_string()));
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut q = query.clone();
            if let Some(token) = &page_token {
                q.push(("pageToken", token.clone()));
            }
            let page = self.get(self.url(path), &q).await?;
            if let Some(arr) = page.get(field).and_then(|v| v.as_array()) {
                items.extend(arr.iter().cloned());
            }
            page_token = page
                .get("nextPageToken")
                .and_then(|t| t.as_str())
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                return Ok(items);
            }
        }
    }
}

/// Send a request and decode the JSON body, mapping non-2xx statuses.
async fn send(request: reqwest::RequestBuilder) -> Result<Value, RemoteError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(RemoteError::status(status.as_u16(), error_message(&body)));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

/// Pull the human-readable message out of an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.pointer("/error/message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn id_field(value: &Value) -> Result<String, RemoteError> {
    value
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| RemoteError::InvalidResponse("missing id".to_string()))
}

fn parse_file(value: &Value) -> Result<RemoteFile, RemoteError> {
    Ok(RemoteFile {
        id: FileId(id_field(value)?),
        name: value
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string),
    })
}

fn parse_index(value: &Value) -> Result<RemoteIndex, RemoteError> {
    let labels = value
        .get("labels")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Ok(RemoteIndex {
        id: IndexId(id_field(value)?),
        name: value.get("name").and_then(|v| v.as_str()).map(str::to_string),
        labels,
    })
}

fn parse_operation(value: &Value) -> Result<OperationState, RemoteError> {
    if !value.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Ok(OperationState::Pending);
    }
    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("operation failed");
        let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        return Ok(OperationState::Failed(format!(
            "{} (code {}): {}",
            rpc_code_name(code),
            code,
            message
        )));
    }
    let resource = value
        .pointer("/response/id")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Ok(OperationState::Done(resource))
}

fn parse_run(value: &Value) -> Result<RunState, RemoteError> {
    let status = value
        .pointer("/state/status")
        .and_then(|v| v.as_str())
        .unwrap_or("PENDING");
    match status {
        "COMPLETED" => {
            let parts = value
                .pointer("/state/completedMessage/content/content")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.pointer("/text/content").and_then(|t| t.as_str()))
                .collect();
            Ok(RunState::Completed(text.join("\n")))
        }
        "FAILED" | "CANCELLED" => {
            let message = value
                .pointer("/state/error/message")
                .and_then(|v| v.as_str())
                .unwrap_or(status);
            Ok(RunState::Failed(message.to_string()))
        }
        _ => Ok(RunState::Pending),
    }
}

#[async_trait]
impl KnowledgeService for CloudKnowledgeService {
    async fn list_files(&self) -> Result<Vec<RemoteFile>, RemoteError> {
        let items = self
            .list_all(
                "/files/v1/files",
                "files",
                vec![("folderId", self.folder_id.clone())],
            )
            .await?;
        items.iter().map(parse_file).collect()
    }

    async fn get_file(&self, id: &FileId) -> Result<RemoteFile, RemoteError> {
        let value = self.get(self.url(&format!("/files/v1/files/{}", id)), &[]).await?;
        parse_file(&value)
    }

    async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<RemoteFile, RemoteError> {
        let body = json!({
            "folderId": self.folder_id,
            "name": name,
            "mimeType": mime_type,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "expirationConfig": {
                "expirationPolicy": "SINCE_LAST_ACTIVE",
                "ttlDays": self.file_ttl_days,
            },
        });
        let value = self.post(self.url("/files/v1/files"), body).await?;
        parse_file(&value)
    }

    async fn delete_file(&self, id: &FileId) -> Result<(), RemoteError> {
        self.delete(self.url(&format!("/files/v1/files/{}", id))).await
    }

    async fn list_indexes(&self) -> Result<Vec<RemoteIndex>, RemoteError> {
        let items = self
            .list_all(
                "/assistants/v1/searchIndex",
                "indices",
                vec![("folderId", self.folder_id.clone())],
            )
            .await?;
        items.iter().map(parse_index).collect()
    }

    async fn create_index(
        &self,
        files: &[FileId],
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<OperationId, RemoteError> {
        let body = json!({
            "folderId": self.folder_id,
            "fileIds": files.iter().map(FileId::as_str).collect::<Vec<_>>(),
            "name": name,
            "labels": labels,
            "textSearchIndex": {},
        });
        let value = self.post(self.url("/assistants/v1/searchIndex"), body).await?;
        Ok(OperationId(id_field(&value)?))
    }

    async fn add_index_files(
        &self,
        index: &IndexId,
        files: &[FileId],
    ) -> Result<OperationId, RemoteError> {
        let body = json!({
            "searchIndexId": index.as_str(),
            "fileIds": files.iter().map(FileId::as_str).collect::<Vec<_>>(),
        });
        let value = self
            .post(self.url("/assistants/v1/searchIndexFile/batchCreate"), body)
            .await?;
        Ok(OperationId(id_field(&value)?))
    }

    async fn list_index_files(&self, index: &IndexId) -> Result<Vec<FileId>, RemoteError> {
        let items = self
            .list_all(
                "/assistants/v1/searchIndexFile",
                "files",
                vec![("searchIndexId", index.to_string())],
            )
            .await?;
        items.iter().map(|v| id_field(v).map(FileId)).collect()
    }

    async fn delete_index(&self, index: &IndexId) -> Result<(), RemoteError> {
        self.delete(self.url(&format!("/assistants/v1/searchIndex/{}", index)))
            .await
    }

    async fn get_operation(&self, id: &OperationId) -> Result<OperationState, RemoteError> {
        let url = format!("{}/operations/{}", self.operations_url, id);
        let value = self.get(url, &[]).await?;
        parse_operation(&value)
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, RemoteError> {
        let tools: Vec<Value> = spec
            .search_index
            .iter()
            .map(|index| json!({ "searchIndex": { "searchIndexIds": [index.as_str()] } }))
            .collect();
        let body = json!({
            "folderId": self.folder_id,
            "modelUri": format!("gpt://{}/{}/latest", self.folder_id, spec.model),
            "instruction": spec.instruction,
            "tools": tools,
        });
        let value = self.post(self.url("/assistants/v1/assistants"), body).await?;
        Ok(AssistantId(id_field(&value)?))
    }

    async fn delete_assistant(&self, id: &AssistantId) -> Result<(), RemoteError> {
        self.delete(self.url(&format!("/assistants/v1/assistants/{}", id)))
            .await
    }

    async fn create_thread(&self) -> Result<ThreadId, RemoteError> {
        let value = self
            .post(
                self.url("/assistants/v1/threads"),
                json!({ "folderId": self.folder_id }),
            )
            .await?;
        Ok(ThreadId(id_field(&value)?))
    }

    async fn write_message(&self, thread: &ThreadId, text: &str) -> Result<(), RemoteError> {
        let body = json!({
            "threadId": thread.as_str(),
            "content": { "content": [ { "text": { "content": text } } ] },
        });
        self.post(self.url("/assistants/v1/messages"), body)
            .await
            .map(|_| ())
    }

    async fn create_run(
        &self,
        assistant: &AssistantId,
        thread: &ThreadId,
    ) -> Result<RunId, RemoteError> {
        let body = json!({
            "assistantId": assistant.as_str(),
            "threadId": thread.as_str(),
        });
        let value = self.post(self.url("/assistants/v1/runs"), body).await?;
        Ok(RunId(id_field(&value)?))
    }

    async fn get_run(&self, id: &RunId) -> Result<RunState, RemoteError> {
        let value = self
            .get(self.url(&format!("/assistants/v1/runs/{}", id)), &[])
            .await?;
        parse_run(&value)
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), RemoteError> {
        self.delete(self.url(&format!("/assistants/v1/threads/{}", thread)))
            .await
    }
}
