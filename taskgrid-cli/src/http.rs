//! Schedule backend talking to the remote REST service.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use taskgrid_core::wire::{self, TimeTableResponse};
use taskgrid_core::{
    ApiPenaltyTask, ApiTask, BackendError, ConstraintRecord, RebuildWindow, ScheduleBackend, Task, TaskId, UserId,
};

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub base_url: String,
    pub retries: u32,
    pub backoff_ms: u64,
    pub request_timeout: Duration,
}

pub struct HttpBackend {
    client: reqwest::Client,
    options: HttpOptions,
}

impl HttpBackend {
    pub fn new(options: HttpOptions) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self { client, options })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.options.base_url.trim_end_matches('/'), path)
    }

    /// Send with bounded exponential backoff on transport failures and 5xx.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, BackendError> {
        let attempts = self.options.retries.saturating_add(1);
        let mut last = String::new();

        for attempt in 0..attempts {
            match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if !is_transient(resp.status()) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(rejection(status, &body));
                }
                Ok(resp) => last = format!("server answered {}", resp.status()),
                Err(e) => last = e.to_string(),
            }
            if attempt + 1 < attempts {
                let delay = backoff_delay(self.options.backoff_ms, attempt);
                warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %last, "retrying request");
                tokio::time::sleep(delay).await;
            }
        }

        Err(BackendError::Transport(format!("gave up after {attempts} attempts: {last}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.url(path);
        let resp = self.send(|| self.client.get(&url)).await?;
        resp.json::<T>()
            .await
            .map_err(|e| BackendError::Rejected(format!("decode {path}: {e}")))
    }

    async fn time_table(&self, user: UserId) -> Result<Vec<ApiTask>, BackendError> {
        let response: TimeTableResponse = self.get_json(&format!("time-table/{}", user.0)).await?;
        Ok(response.into_tasks())
    }

    /// Requests addressed at one task; a 404 means the id is unknown.
    async fn task_call(&self, method: Method, path: String, id: &TaskId) -> Result<(), BackendError> {
        let url = self.url(&path);
        match self.send(|| self.client.request(method.clone(), &url)).await {
            Err(BackendError::Rejected(msg)) if msg.starts_with("404") => Err(BackendError::NotFound(id.clone())),
            other => other.map(|_| ()),
        }
    }
}

impl ScheduleBackend for HttpBackend {
    async fn list_tasks(&self, user: UserId) -> Result<Vec<Task>, BackendError> {
        let records = self.time_table(user).await?;
        let mut tasks = Vec::with_capacity(records.len());
        for api in &records {
            match wire::task_from_api(api) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(task = ?api.task_id(), error = %e, "skipping undecodable task"),
            }
        }
        Ok(tasks)
    }

    async fn records(&self, user: UserId) -> Result<Vec<ApiTask>, BackendError> {
        self.time_table(user).await
    }

    async fn penalty_tasks(&self, user: UserId) -> Result<Vec<ApiPenaltyTask>, BackendError> {
        self.get_json(&format!("penalty-tasks/{}", user.0)).await
    }

    async fn create_task(&self, user: UserId, record: &ConstraintRecord) -> Result<TaskId, BackendError> {
        let body = wire::api_from_record(record);
        let url = self.url("task");
        let user_id = user.0.to_string();
        let resp = self
            .send(|| self.client.post(&url).query(&[("userId", user_id.as_str())]).json(&body))
            .await?;
        let text = resp.text().await.unwrap_or_default();
        let id = created_id(&text).unwrap_or_else(TaskId::pending);
        debug!(%user, task = %id, "task created");
        Ok(id)
    }

    async fn update_task(&self, user: UserId, record: &ConstraintRecord) -> Result<(), BackendError> {
        let body = wire::api_from_record(record);
        let url = self.url("task");
        match self.send(|| self.client.put(&url).json(&body)).await {
            Err(BackendError::Rejected(msg)) if msg.starts_with("404") => Err(BackendError::NotFound(record.id.clone())),
            other => {
                other?;
                debug!(%user, task = %record.id, "task updated");
                Ok(())
            }
        }
    }

    async fn delete_task(&self, _user: UserId, id: &TaskId) -> Result<(), BackendError> {
        self.task_call(Method::DELETE, format!("task/{id}"), id).await
    }

    async fn complete_task(&self, _user: UserId, id: &TaskId) -> Result<(), BackendError> {
        self.task_call(Method::PUT, format!("task/complete/{id}"), id).await
    }

    async fn rebuild(&self, user: UserId, window: &RebuildWindow) -> Result<(), BackendError> {
        let url = self.url("time-table");
        let query = [
            ("userId", user.0.to_string()),
            ("startTimeTable", wire::format_instant(window.start())),
            ("endDateTime", wire::format_instant(window.end())),
        ];
        self.send(|| self.client.post(&url).query(&query)).await?;
        Ok(())
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT
}

fn rejection(status: StatusCode, body: &str) -> BackendError {
    let body = body.trim();
    if body.is_empty() {
        BackendError::Rejected(status.as_u16().to_string())
    } else {
        BackendError::Rejected(format!("{}: {body}", status.as_u16()))
    }
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let multiplier = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(multiplier).min(30_000))
}

/// The create endpoint may answer with a bare id, a task record, or nothing.
fn created_id(body: &str) -> Option<TaskId> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    match value {
        serde_json::Value::Number(n) => Some(TaskId::new(n.to_string())),
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(TaskId::new(s.trim())),
        serde_json::Value::Object(_) => {
            let api: ApiTask = serde_json::from_value(value).ok()?;
            api.task_id().cloned()
        }
        _ => None,
    }
}
