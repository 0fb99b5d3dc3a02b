// Task runner: a FIFO queue drained by one worker thread
// Callers get a task id back immediately and poll or wait on its TaskInfo

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use strata_core::Result;

pub type TaskId = String;

/// Finished tasks kept for polling; the oldest are forgotten first.
pub const DEFAULT_RETAINED_TASKS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub status: TaskStatus,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

#[derive(Default)]
struct TaskTable {
    infos: HashMap<TaskId, TaskInfo>,
    /// Finished ids, oldest first.
    done: VecDeque<TaskId>,
}

impl TaskTable {
    fn retire(&mut self, id: &str, retain: usize) {
        self.done.push_back(id.to_string());
        while self.done.len() > retain {
            if let Some(old) = self.done.pop_front() {
                self.infos.remove(&old);
            }
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<(TaskId, Job)>>,
    available: Condvar,
    tasks: Mutex<TaskTable>,
    finished: Condvar,
    running: AtomicBool,
    retain: usize,
}

impl Shared {
    fn next_job(&self) -> Option<(TaskId, Job)> {
        let mut queue = self.queue.lock();
        while queue.is_empty() && self.running.load(Ordering::Acquire) {
            self.available.wait(&mut queue);
        }
        // Drains what is queued before stopping.
        queue.pop_front()
    }

    fn finish(&self, id: &str, result: std::result::Result<Result<()>, String>) {
        let mut tasks = self.tasks.lock();
        if let Some(info) = tasks.infos.get_mut(id) {
            info.end_timestamp = Some(Utc::now());
            match result {
                Ok(Ok(())) => {
                    info.status = TaskStatus::Completed;
                    info!("Task {} ({}) completed", id, info.name);
                }
                Ok(Err(e)) => {
                    info.status = TaskStatus::Error;
                    info.error = Some(e.to_string());
                    error!("Task {} ({}) failed: {}", id, info.name, e);
                }
                Err(panic) => {
                    info.status = TaskStatus::Error;
                    error!("Task {} ({}) panicked: {}", id, info.name, panic);
                    info.error = Some(panic);
                }
            }
            tasks.retire(id, self.retain);
        }
        self.finished.notify_all();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}

/// Runs submitted work in order on a single worker thread.
pub struct TaskManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new() -> Result<Self> {
        Self::with_retention(DEFAULT_RETAINED_TASKS)
    }

    /// A manager that remembers at most `retain` finished tasks.
    pub fn with_retention(retain: usize) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            tasks: Mutex::new(TaskTable::default()),
            finished: Condvar::new(),
            running: AtomicBool::new(true),
            retain,
        });
        let for_thread = shared.clone();
        let handle = thread::Builder::new()
            .name("strata-task-worker".to_string())
            .spawn(move || {
                while let Some((id, job)) = for_thread.next_job() {
                    debug!("Running task {}", id);
                    let result = catch_unwind(AssertUnwindSafe(job)).map_err(panic_message);
                    for_thread.finish(&id, result);
                }
            })?;
        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queues `job` and returns its id without waiting for it. After [`Self::shutdown`] the
    /// task is recorded as failed and `job` never runs.
    pub fn submit<F>(&self, name: impl Into<String>, job: F) -> TaskId
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let name = name.into();
        let info = TaskInfo {
            name: name.clone(),
            status: TaskStatus::Pending,
            start_timestamp: Utc::now(),
            end_timestamp: None,
            error: None,
        };

        // Holding the queue lock orders this check against shutdown's store.
        let mut queue = self.shared.queue.lock();
        if !self.shared.running.load(Ordering::Acquire) {
            drop(queue);
            let mut tasks = self.shared.tasks.lock();
            tasks.infos.insert(
                id.clone(),
                TaskInfo {
                    status: TaskStatus::Error,
                    end_timestamp: Some(Utc::now()),
                    error: Some("task manager is shut down".to_string()),
                    ..info
                },
            );
            tasks.retire(&id, self.shared.retain);
            warn!("Rejected task {} ({}): task manager is shut down", id, name);
            return id;
        }
        self.shared.tasks.lock().infos.insert(id.clone(), info);
        queue.push_back((id.clone(), Box::new(job)));
        drop(queue);
        self.shared.available.notify_one();
        debug!("Submitted task {} ({})", id, name);
        id
    }

    pub fn task(&self, id: &str) -> Option<TaskInfo> {
        self.shared.tasks.lock().infos.get(id).cloned()
    }

    pub fn tasks(&self) -> Vec<(TaskId, TaskInfo)> {
        let mut tasks: Vec<(TaskId, TaskInfo)> = self
            .shared
            .tasks
            .lock()
            .infos
            .iter()
            .map(|(id, info)| (id.clone(), info.clone()))
            .collect();
        tasks.sort_by(|a, b| a.1.start_timestamp.cmp(&b.1.start_timestamp));
        tasks
    }

    /// Blocks until the task leaves `Pending`. `None` for an unknown id.
    pub fn wait(&self, id: &str) -> Option<TaskInfo> {
        let mut tasks = self.shared.tasks.lock();
        loop {
            match tasks.infos.get(id) {
                None => return None,
                Some(info) if info.status != TaskStatus::Pending => return Some(info.clone()),
                Some(_) => self.shared.finished.wait(&mut tasks),
            }
        }
    }

    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.shared
            .tasks
            .lock()
            .infos
            .values()
            .filter(|info| info.status == TaskStatus::Pending)
            .count()
    }

    /// Stops the worker after the queued work has run.
    pub fn shutdown(&self) {
        {
            let _queue = self.shared.queue.lock();
            self.shared.running.store(false, Ordering::Release);
        }
        self.shared.available.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("Task worker exited with a panic");
            }
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
