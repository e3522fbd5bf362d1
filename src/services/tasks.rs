// src/services/tasks.rs

//! Remote task-list sink.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{Config, NewTask, RemoteTask, TaskList};
use crate::utils::http::create_async_client;

/// Downstream task list.
///
/// `get_task` reports a missing or trashed task as [`AppError::SinkNotFound`];
/// every other failure is [`AppError::SinkApi`].
#[async_trait]
pub trait TaskSink: Send + Sync {
    async fn get_task(&self, list_id: &str, task_id: &str) -> Result<RemoteTask>;

    async fn insert_task(&self, list_id: &str, task: &NewTask) -> Result<RemoteTask>;

    async fn list_task_lists(&self) -> Result<Vec<TaskList>>;

    async fn create_task_list(&self, title: &str) -> Result<TaskList>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskListPage {
    #[serde(default)]
    items: Vec<TaskList>,
    next_page_token: Option<String>,
}

/// Google Tasks API client authenticated with a bearer token.
pub struct GoogleTasksClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl GoogleTasksClient {
    pub fn new(config: &Config, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: create_async_client(&config.crawler)?,
            base_url: config.google.tasks_base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(AppError::sink_api)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::sink_api(format!("{status} {body}")));
        }
        Ok(resp)
    }

    async fn json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        resp.json().await.map_err(AppError::sink_api)
    }
}

#[async_trait]
impl TaskSink for GoogleTasksClient {
    async fn get_task(&self, list_id: &str, task_id: &str) -> Result<RemoteTask> {
        let url = format!("{}/lists/{}/tasks/{}", self.base_url, list_id, task_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(AppError::sink_api)?;

        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Err(AppError::SinkNotFound {
                task_id: task_id.to_string(),
            });
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::sink_api(format!("{status} {body}")));
        }

        let task: RemoteTask = Self::json(resp).await?;
        if task.deleted {
            return Err(AppError::SinkNotFound {
                task_id: task_id.to_string(),
            });
        }
        Ok(task)
    }

    async fn insert_task(&self, list_id: &str, task: &NewTask) -> Result<RemoteTask> {
        let url = format!("{}/lists/{}/tasks", self.base_url, list_id);
        let resp = self.send(self.client.post(&url).json(task)).await?;
        Self::json(resp).await
    }

    async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        let url = format!("{}/users/@me/lists", self.base_url);
        let mut lists = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).query(&[("maxResults", "100")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: TaskListPage = Self::json(self.send(request).await?).await?;
            lists.extend(page.items);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(lists)
    }

    async fn create_task_list(&self, title: &str) -> Result<TaskList> {
        let url = format!("{}/users/@me/lists", self.base_url);
        let resp = self
            .send(self.client.post(&url).json(&json!({ "title": title })))
            .await?;
        Self::json(resp).await
    }
}
