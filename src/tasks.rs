use crate::devices::Target;
use crate::extension_control::defaults::{
    DEFAULT_TASK_POLL_INTERVAL, LOCAL_ADMIN_USER, PACKAGE_TASKS_PATH, REMOTE_DOWNLOADS_DIR,
};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const FINISHED_STATUS: &str = "FINISHED";
const FAILED_STATUS: &str = "FAILED";

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task submission did not return a task id: {0}")]
    Submission(String),
    #[error("task {task_id} failed: {body}")]
    Failed { task_id: TaskId, body: String },
    #[error("task {task_id} did not reach FINISHED status within {timeout:?}")]
    Timeout { task_id: TaskId, timeout: Duration },
    #[error("unexpected task response: {0}")]
    UnexpectedResponse(String),
    #[error("task request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Identifier assigned by the package management framework to a submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskId(String);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Operations accepted by the package management task endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "UPPERCASE")]
pub enum TaskRequest {
    Query,
    Install {
        #[serde(rename = "packageFilePath")]
        package_file_path: String,
    },
    Uninstall {
        #[serde(rename = "packageName")]
        package_name: String,
    },
}

impl TaskRequest {
    /// INSTALL task for an artifact previously uploaded to the device. The
    /// REST framework leaves uploads in its downloads directory.
    pub fn install(rpm_file: &str) -> Self {
        Self::Install {
            package_file_path: format!("{REMOTE_DOWNLOADS_DIR}/{rpm_file}"),
        }
    }

    pub fn uninstall(package_name: impl Into<String>) -> Self {
        Self::Uninstall {
            package_name: package_name.into(),
        }
    }

    fn operation_name(&self) -> &'static str {
        match self {
            TaskRequest::Query => "QUERY",
            TaskRequest::Install { .. } => "INSTALL",
            TaskRequest::Uninstall { .. } => "UNINSTALL",
        }
    }
}

/// Runs asynchronous package management tasks on a target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageTaskDriver: Send + Sync {
    async fn submit(&self, target: &Target, request: TaskRequest) -> Result<TaskId, TaskError>;

    /// Polls the task until it reaches FINISHED or FAILED, or until `timeout`
    /// elapses. A FINISHED task yields its `queryResponse` when present, the
    /// raw status body otherwise.
    async fn poll_until_done(
        &self,
        target: &Target,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<Value, TaskError>;

    async fn run(
        &self,
        target: &Target,
        request: TaskRequest,
        timeout: Duration,
    ) -> Result<Value, TaskError> {
        let task_id = self.submit(target, request).await?;
        self.poll_until_done(target, &task_id, timeout).await
    }
}

/// Task driver speaking to the target's package management REST endpoint.
pub struct HttpPackageTaskDriver {
    client: reqwest::Client,
    poll_interval: Duration,
}

impl HttpPackageTaskDriver {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_TASK_POLL_INTERVAL,
        }
    }

    /// Overrides the delay between status polls.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    fn tasks_url(&self, target: &Target) -> String {
        target.management_url(PACKAGE_TASKS_PATH)
    }

    /// The local gateway expects the fixed admin credentials, remote devices
    /// are reached over the established trust channel.
    fn authorized(&self, target: &Target, request: RequestBuilder) -> RequestBuilder {
        if target.is_local() {
            request.basic_auth(LOCAL_ADMIN_USER, Some(""))
        } else {
            request
        }
    }

    async fn task_status(&self, target: &Target, task_id: &TaskId) -> Result<Value, TaskError> {
        let url = format!("{}/{}", self.tasks_url(target), task_id);
        let body = self
            .authorized(target, self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    /// Best-effort cleanup of a closed task, failures are only logged.
    async fn delete_task(&self, target: &Target, task_id: &TaskId) {
        let url = format!("{}/{}", self.tasks_url(target), task_id);
        let result = self.authorized(target, self.client.delete(url)).send().await;
        match result.and_then(|response| response.error_for_status()) {
            Ok(_) => debug!(%task_id, "deleted finished package task"),
            Err(err) => warn!(%task_id, %err, "could not delete finished package task"),
        }
    }
}

#[async_trait]
impl PackageTaskDriver for HttpPackageTaskDriver {
    async fn submit(&self, target: &Target, request: TaskRequest) -> Result<TaskId, TaskError> {
        debug!(target = %target, operation = request.operation_name(), "submitting package task");
        let body: Value = self
            .authorized(target, self.client.post(self.tasks_url(target)))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let task_id = body
            .get("id")
            .and_then(Value::as_str)
            .map(TaskId::from)
            .ok_or_else(|| TaskError::Submission(body.to_string()))?;
        Ok(task_id)
    }

    async fn poll_until_done(
        &self,
        target: &Target,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<Value, TaskError> {
        let deadline = Instant::now() + timeout;
        loop {
            let body = self.task_status(target, task_id).await?;
            let Some(status) = body.get("status").and_then(Value::as_str).map(str::to_string)
            else {
                return Err(TaskError::UnexpectedResponse(body.to_string()));
            };
            debug!(%task_id, status, "package task status");

            match status.as_str() {
                FINISHED_STATUS => {
                    self.delete_task(target, task_id).await;
                    let result = body.get("queryResponse").cloned().unwrap_or(body);
                    return Ok(result);
                }
                FAILED_STATUS => {
                    return Err(TaskError::Failed {
                        task_id: task_id.clone(),
                        body: body.to_string(),
                    });
                }
                _ => {
                    sleep(self.poll_interval).await;
                    if Instant::now() >= deadline {
                        return Err(TaskError::Timeout {
                            task_id: task_id.clone(),
                            timeout,
                        });
                    }
                }
            }
        }
    }
}
