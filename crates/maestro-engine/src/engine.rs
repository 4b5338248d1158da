use crate::events::{EngineEvent, EventBus, EventHandler, Subscription};
use crate::executor::TaskExecutor;
use crate::modes::ModeRegistry;
use crate::queue::TaskQueue;
use crate::state::{TaskState, TaskStatus};
use maestro_core::{Clock, MaestroError, MaestroResult, SystemClock};
use maestro_provider::ProviderRegistry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Mode used when a submission does not name one.
    pub default_mode: String,
    /// Maximum number of concurrently executing tasks.
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mode: "QUALITY".to_string(),
            max_workers: 4,
        }
    }
}

/// A point-in-time view of the engine, returned by [`Engine::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// The current default mode.
    pub current_mode: String,
    /// Number of tasks the engine knows about, in any status.
    pub active_tasks: usize,
    /// Number of task ids waiting in the queue.
    pub queued_tasks: usize,
    /// Number of tasks currently executing.
    pub running_workers: usize,
    /// The worker pool bound.
    pub max_workers: usize,
}

/// The result of [`Engine::switch_mode`].
#[derive(Debug, Clone, Serialize)]
pub struct ModeSwitch {
    /// The mode that was active before the switch.
    pub old_mode: String,
    /// The mode that is now active.
    pub new_mode: String,
    /// Number of tasks the engine knows about at switch time.
    pub active_tasks: usize,
}

struct Worker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct EngineInner {
    modes: ModeRegistry,
    providers: Arc<ProviderRegistry>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    max_workers: usize,
    current_mode: RwLock<String>,
    tasks: RwLock<HashMap<String, Arc<RwLock<TaskState>>>>,
    queue: Mutex<TaskQueue>,
    workers: Mutex<HashMap<String, Worker>>,
}

/// The orchestration engine facade.
///
/// Cheap to clone; all clones share the same state. Construct one engine
/// per process and hand references to collaborators. There is no ambient
/// singleton.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with the system clock.
    pub fn new(config: EngineConfig, modes: ModeRegistry, providers: Arc<ProviderRegistry>) -> Self {
        Self::with_clock(config, modes, providers, Arc::new(SystemClock))
    }

    /// Create an engine with an injected clock (used by tests).
    pub fn with_clock(
        config: EngineConfig,
        modes: ModeRegistry,
        providers: Arc<ProviderRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bus = Arc::new(EventBus::new(clock.clone()));
        Self {
            inner: Arc::new(EngineInner {
                modes,
                providers,
                bus,
                clock,
                max_workers: config.max_workers,
                current_mode: RwLock::new(config.default_mode),
                tasks: RwLock::new(HashMap::new()),
                queue: Mutex::new(TaskQueue::new()),
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The event bus shared by this engine.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// The current default mode name.
    pub async fn current_mode(&self) -> String {
        self.inner.current_mode.read().await.clone()
    }

    /// Submit a task for execution.
    ///
    /// Creates a pending state carrying a snapshot of the mode's config,
    /// queues it, emits `task_submitted`, and admits work if a worker slot
    /// is free. Fails with [`MaestroError::UnknownMode`] when the mode is
    /// not registered and [`MaestroError::DuplicateTask`] when the id is
    /// already known.
    pub async fn submit(
        &self,
        task_id: &str,
        description: &str,
        mode: Option<&str>,
        project_id: Option<String>,
        priority: i32,
    ) -> MaestroResult<TaskState> {
        let mode_name = match mode {
            Some(name) => name.to_string(),
            None => self.inner.current_mode.read().await.clone(),
        };
        let config = self
            .inner
            .modes
            .get(&mode_name)
            .cloned()
            .ok_or_else(|| MaestroError::UnknownMode(mode_name.clone()))?;

        let state = TaskState::new(
            task_id,
            description,
            &mode_name,
            config,
            project_id,
            priority,
            self.inner.clock.now(),
        );

        let snapshot = {
            let mut tasks = self.inner.tasks.write().await;
            if tasks.contains_key(task_id) {
                return Err(MaestroError::DuplicateTask(task_id.to_string()));
            }
            tasks.insert(task_id.to_string(), Arc::new(RwLock::new(state.clone())));
            state
        };

        let queue_position = {
            let mut queue = self.inner.queue.lock().await;
            queue.push(task_id, priority);
            queue.position(task_id)
        };
        info!(
            task_id,
            mode = %mode_name,
            priority,
            queue_position = ?queue_position,
            "Task submitted"
        );

        self.inner
            .bus
            .emit(&EngineEvent::TaskSubmitted(snapshot.clone()))
            .await;

        dispatch(&self.inner).await;
        Ok(snapshot)
    }

    /// A read-only snapshot of a task's state.
    pub async fn get_state(&self, task_id: &str) -> Option<TaskState> {
        let task = self.inner.tasks.read().await.get(task_id).cloned()?;
        let state = task.read().await.clone();
        Some(state)
    }

    /// Cancel a task.
    ///
    /// Returns `true` when the task was pending or running and is now
    /// cancelled; `false` when it is absent or already terminal. Running
    /// executors stop at their next cooperative checkpoint; an in-flight
    /// provider call finishes but its output is discarded.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let task = match self.inner.tasks.read().await.get(task_id) {
            Some(task) => task.clone(),
            None => return false,
        };

        let snapshot = {
            let mut state = task.write().await;
            if state.status.is_terminal() {
                return false;
            }
            state.status = TaskStatus::Cancelled;
            state.completed_at = Some(self.inner.clock.now());
            state.clone()
        };

        self.inner.queue.lock().await.remove(task_id);
        if let Some(worker) = self.inner.workers.lock().await.get(task_id) {
            worker.cancel.store(true, Ordering::SeqCst);
        }

        info!(task_id, "Task cancelled");
        self.inner
            .bus
            .emit(&EngineEvent::TaskCancelled(snapshot))
            .await;
        true
    }

    /// Change the default mode for future submissions.
    ///
    /// Tasks already submitted keep the config snapshot taken at their
    /// submission time.
    pub async fn switch_mode(&self, new_mode: &str) -> MaestroResult<ModeSwitch> {
        let config = self
            .inner
            .modes
            .get(new_mode)
            .cloned()
            .ok_or_else(|| MaestroError::UnknownMode(new_mode.to_string()))?;

        let old_mode = {
            let mut current = self.inner.current_mode.write().await;
            std::mem::replace(&mut *current, new_mode.to_string())
        };
        let active_tasks = self.inner.tasks.read().await.len();

        info!(old_mode = %old_mode, new_mode, active_tasks, "Mode switched");
        self.inner
            .bus
            .emit(&EngineEvent::ModeChange {
                old_mode: old_mode.clone(),
                new_mode: new_mode.to_string(),
                config,
            })
            .await;

        Ok(ModeSwitch {
            old_mode,
            new_mode: new_mode.to_string(),
            active_tasks,
        })
    }

    /// Engine statistics.
    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            current_mode: self.inner.current_mode.read().await.clone(),
            active_tasks: self.inner.tasks.read().await.len(),
            queued_tasks: self.inner.queue.lock().await.len(),
            running_workers: self.inner.workers.lock().await.len(),
            max_workers: self.inner.max_workers,
        }
    }

    /// Register an in-process handler for a named event type.
    pub async fn on(&self, event_type: &str, handler: EventHandler) {
        self.inner.bus.on(event_type, handler).await;
    }

    /// Subscribe to an event channel.
    pub async fn subscribe(&self, channel: &str) -> Subscription {
        self.inner.bus.subscribe(channel).await
    }

    /// Remove a channel subscriber.
    pub async fn unsubscribe(&self, channel: &str, id: Uuid) {
        self.inner.bus.unsubscribe(channel, id).await;
    }

    /// Stop the engine: signal cancellation to every running worker and
    /// detach them. Task states are left as they are.
    pub async fn stop(&self) {
        let workers: Vec<(String, Worker)> =
            self.inner.workers.lock().await.drain().collect();
        for (task_id, worker) in workers {
            worker.cancel.store(true, Ordering::SeqCst);
            worker.handle.abort();
            info!(task_id = %task_id, "Worker stopped");
        }
    }
}

/// Admit queued tasks while worker slots are free.
///
/// Called on submit and whenever a worker completes. Stale queue entries
/// (tasks no longer pending) are discarded.
async fn dispatch(inner: &Arc<EngineInner>) {
    loop {
        let mut workers = inner.workers.lock().await;
        if workers.len() >= inner.max_workers {
            return;
        }
        let task_id = match inner.queue.lock().await.pop() {
            Some(task_id) => task_id,
            None => return,
        };
        let task = match inner.tasks.read().await.get(&task_id) {
            Some(task) => task.clone(),
            None => continue,
        };
        if task.read().await.status != TaskStatus::Pending {
            continue;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let handle = spawn_worker(inner.clone(), task_id.clone(), task, cancel.clone());
        workers.insert(task_id.clone(), Worker { cancel, handle });
        info!(task_id = %task_id, running = workers.len(), "Task worker started");
    }
}

fn spawn_worker(
    inner: Arc<EngineInner>,
    task_id: String,
    task: Arc<RwLock<TaskState>>,
    cancel: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let timeout_ms = task.read().await.mode_config.task_timeout_ms;
        let executor = TaskExecutor {
            task: task.clone(),
            bus: inner.bus.clone(),
            providers: inner.providers.clone(),
            clock: inner.clock.clone(),
            cancel,
        };

        let timed_out = tokio::time::timeout(Duration::from_millis(timeout_ms), executor.run())
            .await
            .is_err();

        if timed_out {
            let snapshot = {
                let mut state = task.write().await;
                if state.status.is_terminal() {
                    None
                } else {
                    let now = inner.clock.now();
                    state.push_error(
                        "timeout",
                        format!("task exceeded {timeout_ms}ms timeout"),
                        now,
                    );
                    state.status = TaskStatus::Failed;
                    state.completed_at = Some(now);
                    Some(state.clone())
                }
            };
            if let Some(snapshot) = snapshot {
                warn!(task_id = %snapshot.task_id, timeout_ms, "Task timed out");
                inner.bus.emit(&EngineEvent::TaskFailed(snapshot)).await;
            }
        }

        inner.workers.lock().await.remove(&task_id);
        dispatch(&inner).await;
    })
}
