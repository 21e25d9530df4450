//! HTTP client for the task server.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::RemoteClient;
use tasksync_common::{Attachment, Error, Record, Result};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Task as returned by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTask {
    id: String,
    name: String,
    completed: bool,
    #[serde(default)]
    photo_base64: Option<String>,
    date: String,
}

/// Body of `addTask`. The server assigns the id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddTaskRequest<'a> {
    name: &'a str,
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_base64: Option<&'a str>,
    date: &'a str,
}

impl<'a> From<&'a Record> for AddTaskRequest<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            name: &record.name,
            completed: record.completed,
            photo_base64: record.attachment.as_ref().map(Attachment::as_base64),
            date: &record.timestamp,
        }
    }
}

/// Body of `updateTask`. The creation date is not editable.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskRequest<'a> {
    id: &'a str,
    name: &'a str,
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_base64: Option<&'a str>,
}

impl<'a> From<&'a Record> for UpdateTaskRequest<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            id: &record.id,
            name: &record.name,
            completed: record.completed,
            photo_base64: record.attachment.as_ref().map(Attachment::as_base64),
        }
    }
}

fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| Error::Encoding(format!("Failed to encode task: {}", e)))
}

impl TryFrom<WireTask> for Record {
    type Error = Error;

    fn try_from(task: WireTask) -> Result<Self> {
        let attachment = task
            .photo_base64
            .map(Attachment::from_base64)
            .transpose()
            .map_err(|e| Error::Decoding(format!("Task '{}': {}", task.id, e)))?;

        Ok(Record::new(task.id, task.name, task.completed, task.date).with_attachment(attachment))
    }
}

/// Response envelope returned by every endpoint.
#[derive(Debug, Deserialize)]
struct TasksResponse {
    values: Vec<WireTask>,
}

/// Remote authority reached over HTTP.
///
/// Every endpoint is a `POST` under `{base}/api/` answering with the whole
/// collection wrapped in `{"values": [...]}`.
pub struct HttpRemote {
    http: Client,
    list_url: Url,
    add_url: Url,
    update_url: Url,
}

impl HttpRemote {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    /// - `InvalidInput` if the URL cannot be parsed
    /// - `Transport` if the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid server URL '{}': {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let endpoint = |path: &str| {
            base.join(path)
                .map_err(|e| Error::InvalidInput(format!("Invalid endpoint '{}': {}", path, e)))
        };

        let http = Client::builder()
            .user_agent(concat!("tasksync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            list_url: endpoint("api/getTasks")?,
            add_url: endpoint("api/addTask")?,
            update_url: endpoint("api/updateTask")?,
        })
    }

    async fn post(&self, url: &Url, body: Option<Vec<u8>>) -> Result<Vec<Record>> {
        let mut request = self
            .http
            .post(url.clone())
            .header(header::CONTENT_TYPE, "application/json");

        if let Some(json) = body {
            request = request.body(json);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Server(status.as_u16()));
        }

        let envelope: TasksResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                Error::Decoding(format!("Invalid response from {}: {}", url, e))
            } else {
                Error::Transport(format!("Failed to read response from {}: {}", url, e))
            }
        })?;

        debug!("{} returned {} tasks", url.path(), envelope.values.len());
        envelope.values.into_iter().map(Record::try_from).collect()
    }
}

#[async_trait]
impl RemoteClient for HttpRemote {
    fn name(&self) -> &str {
        "http"
    }

    async fn list(&self) -> Result<Vec<Record>> {
        self.post(&self.list_url, None).await
    }

    async fn create(&self, record: &Record) -> Result<Vec<Record>> {
        let body = encode(&AddTaskRequest::from(record))?;
        self.post(&self.add_url, Some(body)).await
    }

    async fn update(&self, record: &Record) -> Result<Vec<Record>> {
        let body = encode(&UpdateTaskRequest::from(record))?;
        self.post(&self.update_url, Some(body)).await
    }
}
