// ABOUTME: Process-wide task registry - handle allocation, worker spawning and event fan-out
//
// One registry exists per process. It is created with `TaskRegistry::initialize`
// and handed out as `Arc<TaskRegistry>` to whoever starts or observes tasks.
// Each task gets a broadcast channel; the terminal result is also retained on
// the entry so subscribers that arrive late still see it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    GitTask, TaskContext, TaskError, TaskEvent, TaskFailure, TaskHandle, TaskKind, TaskProgress,
    TaskResult, TaskState,
};
use crate::config::TaskConfig;

static REGISTRY: OnceLock<Arc<TaskRegistry>> = OnceLock::new();

struct TaskEntry {
    kind: TaskKind,
    description: String,
    state: TaskState,
    created_at: DateTime<Utc>,
    events: broadcast::Sender<TaskEvent>,
    latest: Arc<Mutex<Option<TaskProgress>>>,
    result: Option<TaskResult>,
    cancel: watch::Sender<bool>,
}

/// Point-in-time view of a registered task
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub handle: TaskHandle,
    pub kind: TaskKind,
    pub description: String,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub latest_progress: Option<TaskProgress>,
    pub result: Option<TaskResult>,
}

pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskHandle, TaskEntry>>,
    event_buffer: usize,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.read().len())
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

impl TaskRegistry {
    pub(crate) fn new(event_buffer: usize) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            event_buffer: event_buffer.max(1),
        }
    }

    /// Create the process-wide registry.
    ///
    /// # Errors
    /// `AlreadyInitialized` on any call after the first
    pub fn initialize(config: &TaskConfig) -> Result<Arc<Self>, TaskError> {
        let registry = Arc::new(Self::new(config.event_buffer));
        REGISTRY
            .set(Arc::clone(&registry))
            .map_err(|_| TaskError::AlreadyInitialized)?;
        info!(event_buffer = registry.event_buffer, "Task registry initialized");
        Ok(registry)
    }

    /// The process-wide registry, if initialized
    pub fn instance() -> Result<Arc<Self>, TaskError> {
        REGISTRY.get().cloned().ok_or(TaskError::NotInitialized)
    }

    /// The process-wide registry, creating it on first use
    pub fn get_or_initialize(config: &TaskConfig) -> Arc<Self> {
        Arc::clone(REGISTRY.get_or_init(|| Arc::new(Self::new(config.event_buffer))))
    }

    /// Register a task and start it on its own worker. Must be called within a tokio runtime.
    pub fn register(self: &Arc<Self>, task: Box<dyn GitTask>) -> TaskHandle {
        let handle = TaskHandle::new();
        let (events, _) = broadcast::channel(self.event_buffer);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let latest = Arc::new(Mutex::new(None));
        let kind = task.kind();
        let description = task.describe();

        let ctx = TaskContext::new(events.clone(), Arc::clone(&latest), cancel_rx);

        self.write().insert(
            handle,
            TaskEntry {
                kind,
                description: description.clone(),
                state: TaskState::Pending,
                created_at: Utc::now(),
                events,
                latest,
                result: None,
                cancel: cancel_tx,
            },
        );
        info!(task = %handle, kind = ?kind, description = %description, "Task registered");

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.set_running(handle);

            let worker = tokio::spawn(task.run(ctx));
            let result = match worker.await {
                Ok(result) => result,
                Err(e) => {
                    error!(task = %handle, error = %e, "Task worker panicked");
                    TaskResult::failed(
                        TaskFailure::Io(format!("task worker aborted: {e}")),
                        "Task aborted unexpectedly",
                    )
                }
            };

            registry.finish(handle, result);
        });

        handle
    }

    /// Look up a task. Terminal tasks remain visible until `remove`.
    pub fn get(&self, handle: TaskHandle) -> Result<TaskInfo, TaskError> {
        self.read()
            .get(&handle)
            .map(|entry| Self::info(handle, entry))
            .ok_or(TaskError::NotFound(handle))
    }

    pub fn state(&self, handle: TaskHandle) -> Result<TaskState, TaskError> {
        self.read()
            .get(&handle)
            .map(|entry| entry.state)
            .ok_or(TaskError::NotFound(handle))
    }

    /// All registered tasks, oldest first
    pub fn list(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .read()
            .iter()
            .map(|(handle, entry)| Self::info(*handle, entry))
            .collect();
        tasks.sort_by_key(|info| info.created_at);
        tasks
    }

    /// Request cancellation. Terminal tasks are left alone.
    pub fn cancel(&self, handle: TaskHandle) -> Result<(), TaskError> {
        let tasks = self.read();
        let entry = tasks.get(&handle).ok_or(TaskError::NotFound(handle))?;

        if entry.state.is_terminal() {
            debug!(task = %handle, state = ?entry.state, "Cancel ignored for finished task");
            return Ok(());
        }

        info!(task = %handle, "Cancellation requested");
        // The worker may have just dropped its receiver on completion
        let _ = entry.cancel.send(true);
        Ok(())
    }

    /// Event stream for one task. A finished task yields just its result.
    pub fn subscribe(&self, handle: TaskHandle) -> Result<TaskSubscription, TaskError> {
        let tasks = self.read();
        let entry = tasks.get(&handle).ok_or(TaskError::NotFound(handle))?;

        Ok(TaskSubscription {
            handle,
            receiver: entry.events.subscribe(),
            stored_result: entry.result.clone(),
            done: false,
        })
    }

    /// Callback-style subscription. Callbacks run on a tokio task until the
    /// result is delivered or the guard is dropped.
    pub fn subscribe_with<P, R>(
        &self,
        handle: TaskHandle,
        mut on_progress: P,
        on_result: R,
    ) -> Result<SubscriptionGuard, TaskError>
    where
        P: FnMut(TaskProgress) + Send + 'static,
        R: FnOnce(TaskResult) + Send + 'static,
    {
        let mut subscription = self.subscribe(handle)?;

        let relay = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                match event {
                    TaskEvent::Progress(progress) => on_progress(progress),
                    TaskEvent::Finished(result) => {
                        on_result(result);
                        return;
                    }
                }
            }
        });

        Ok(SubscriptionGuard { relay: Some(relay) })
    }

    /// Wait for the terminal result
    pub async fn wait(&self, handle: TaskHandle) -> Result<TaskResult, TaskError> {
        let mut subscription = self.subscribe(handle)?;
        while let Some(event) = subscription.next().await {
            if let TaskEvent::Finished(result) = event {
                return Ok(result);
            }
        }

        // Channel closed without a result: the entry was removed meanwhile
        Err(TaskError::NotFound(handle))
    }

    /// Drop a finished task from the registry
    pub fn remove(&self, handle: TaskHandle) -> Result<TaskInfo, TaskError> {
        let mut tasks = self.write();
        let entry = tasks.get(&handle).ok_or(TaskError::NotFound(handle))?;

        if !entry.state.is_terminal() {
            return Err(TaskError::StillRunning(handle));
        }

        let info = Self::info(handle, entry);
        tasks.remove(&handle);
        debug!(task = %handle, "Task removed");
        Ok(info)
    }

    fn set_running(&self, handle: TaskHandle) {
        if let Some(entry) = self.write().get_mut(&handle) {
            if entry.state == TaskState::Pending {
                entry.state = TaskState::Running;
            }
        }
    }

    fn finish(&self, handle: TaskHandle, result: TaskResult) {
        let mut tasks = self.write();
        let Some(entry) = tasks.get_mut(&handle) else {
            warn!(task = %handle, "Finished task is no longer registered");
            return;
        };

        entry.state = result.state();
        entry.result = Some(result.clone());
        info!(task = %handle, state = ?entry.state, message = %result.message, "Task finished");

        // Sent under the write lock so `subscribe` sees either the stored
        // result or the event, never neither
        let _ = entry.events.send(TaskEvent::Finished(result));
    }

    fn info(handle: TaskHandle, entry: &TaskEntry) -> TaskInfo {
        TaskInfo {
            handle,
            kind: entry.kind,
            description: entry.description.clone(),
            state: entry.state,
            created_at: entry.created_at,
            latest_progress: entry.latest.lock().ok().and_then(|guard| guard.clone()),
            result: entry.result.clone(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TaskHandle, TaskEntry>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskHandle, TaskEntry>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ordered event stream of one task; ends after the `Finished` event
pub struct TaskSubscription {
    handle: TaskHandle,
    receiver: broadcast::Receiver<TaskEvent>,
    stored_result: Option<TaskResult>,
    done: bool,
}

impl TaskSubscription {
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    pub async fn next(&mut self) -> Option<TaskEvent> {
        if self.done {
            return None;
        }

        if let Some(result) = self.stored_result.take() {
            self.done = true;
            return Some(TaskEvent::Finished(result));
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if matches!(event, TaskEvent::Finished(_)) {
                        self.done = true;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Only progress can be dropped; the result is always the newest event
                    debug!(task = %self.handle, skipped = skipped, "Subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// Keeps a callback subscription alive; dropping it unsubscribes
pub struct SubscriptionGuard {
    relay: Option<JoinHandle<()>>,
}

impl SubscriptionGuard {
    /// Wait until the result callback has run (or the stream ended)
    pub async fn join(mut self) {
        if let Some(relay) = self.relay.take() {
            if let Err(e) = relay.await {
                warn!(error = %e, "Subscription relay failed");
            }
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
    }
}
