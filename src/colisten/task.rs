use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::channel::{self, UnboundedSender};
use super::semver::Version;

/// Work shipped to a remote worker over the long-poll endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: HashMap<String, String>,
}

/// What a worker posts back once a task is done.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Synchronous-over-asynchronous bridge to remote workers.
///
/// Handlers call [`Dispatcher::call`] and suspend; workers pull tasks via HTTP
/// long polling and post results back, which wakes the matching caller up.
/// Tasks are delivered at-most-once: a worker that pulls a task and dies never
/// gets it re-queued, the caller simply times out.
pub struct Dispatcher {
    token: String,
    min_version: Version,
    tasks: UnboundedSender<Task>,
    queue: tokio::sync::Mutex<mpsc::Receiver<Task>>,
    results: Mutex<HashMap<String, oneshot::Sender<TaskResult>>>,
    id_gen: AtomicU64,
}

impl Dispatcher {
    pub fn new(token: String) -> Dispatcher {
        let (tasks, queue) = channel::unbounded(32);
        Dispatcher {
            token,
            min_version: Version::parse("v0.0.2"),
            tasks,
            queue: tokio::sync::Mutex::new(queue),
            results: Mutex::new(HashMap::new()),
            id_gen: AtomicU64::new(0),
        }
    }

    pub fn new_task(&self, kind: &str, payload: HashMap<String, String>) -> Task {
        let id = self.id_gen.fetch_add(1, Ordering::SeqCst) + 1;
        Task {
            id: id.to_string(),
            kind: kind.to_owned(),
            payload,
        }
    }

    /// Enqueues `task` and waits for its result. `None` on timeout; the task
    /// itself is not retracted, a late submit just finds no waiter anymore.
    pub async fn call(&self, task: Task, timeout: Duration) -> Option<TaskResult> {
        let id = task.id.clone();
        let (tx, rx) = oneshot::channel();
        self.results.lock().unwrap().insert(id.clone(), tx);

        self.tasks.send(task).await;

        let result = tokio::time::timeout(timeout, rx).await;
        self.results.lock().unwrap().remove(&id);

        match result {
            Ok(Ok(result)) => Some(result),
            _ => None,
        }
    }

    /// Hands out the next queued task to a long-polling worker, or `None`
    /// once `timeout` elapses with an empty queue.
    pub async fn poll(&self, timeout: Duration) -> Option<Task> {
        tokio::time::timeout(timeout, async {
            let mut queue = self.queue.lock().await;
            queue.recv().await
        })
        .await
        .ok()
        .flatten()
    }

    /// Routes a submitted result to the waiting caller. `false` when no
    /// caller is registered under that id.
    pub fn complete(&self, result: TaskResult) -> bool {
        match self.results.lock().unwrap().remove(&result.id) {
            Some(tx) => {
                // the caller may have just timed out, that race is his loss
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// An empty configured token disables authentication.
    pub fn validate_token(&self, auth_header: Option<&str>) -> bool {
        if self.token.is_empty() {
            return true;
        }
        auth_header
            .and_then(|h| h.strip_prefix("Bearer "))
            .is_some_and(|t| t == self.token)
    }

    pub fn version_supported(&self, header: &str) -> bool {
        Version::parse(header) >= self.min_version
    }

    pub fn min_version(&self) -> Version {
        self.min_version
    }
}
