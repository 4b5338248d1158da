use crate::modes::ModeConfig;
use crate::state::{AgentExecution, AgentKind, PhaseState, TaskState};
use chrono::{DateTime, Utc};
use maestro_core::Clock;
use serde_json::json;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, warn};
use uuid::Uuid;

/// The global channel receiving every task-scoped event.
pub const CHANNEL_TASKS: &str = "tasks";
/// The channel receiving mode changes.
pub const CHANNEL_MODE: &str = "mode";
/// The channel receiving non-task events.
pub const CHANNEL_BROADCAST: &str = "broadcast";

/// Per-subscriber buffer; events beyond this are dropped rather than
/// stalling the engine.
const SUBSCRIBER_BUFFER: usize = 256;

/// A typed event emitted by the engine.
///
/// Task-scoped variants carry a deep snapshot of the state they describe;
/// consumers can never observe later mutations through a payload.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A task entered the queue.
    TaskSubmitted(TaskState),
    /// A worker picked the task up.
    TaskStarted(TaskState),
    /// Decomposition produced the task's phases.
    TaskDecomposed(TaskState),
    /// All phases succeeded.
    TaskCompleted(TaskState),
    /// The task ended in failure.
    TaskFailed(TaskState),
    /// The task was cancelled.
    TaskCancelled(TaskState),
    /// A phase began executing.
    PhaseStarted {
        /// Owning task.
        task_id: String,
        /// Snapshot of the phase at start.
        phase: PhaseState,
    },
    /// A phase finished.
    PhaseCompleted {
        /// Owning task.
        task_id: String,
        /// Snapshot of the phase at completion.
        phase: PhaseState,
    },
    /// An agent execution began.
    AgentStarted {
        /// Owning task.
        task_id: String,
        /// 1-based phase number.
        phase: u32,
        /// The agent kind.
        agent: AgentKind,
    },
    /// An agent execution finished (success or failure).
    AgentCompleted {
        /// Owning task.
        task_id: String,
        /// 1-based phase number.
        phase: u32,
        /// The agent kind.
        agent: AgentKind,
        /// Snapshot of the execution record.
        execution: AgentExecution,
    },
    /// The engine's default mode changed.
    ModeChange {
        /// The previous mode name.
        old_mode: String,
        /// The new mode name.
        new_mode: String,
        /// The new mode's config.
        config: ModeConfig,
    },
}

impl EngineEvent {
    /// The wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::TaskSubmitted(_) => "task_submitted",
            EngineEvent::TaskStarted(_) => "task_started",
            EngineEvent::TaskDecomposed(_) => "task_decomposed",
            EngineEvent::TaskCompleted(_) => "task_completed",
            EngineEvent::TaskFailed(_) => "task_failed",
            EngineEvent::TaskCancelled(_) => "task_cancelled",
            EngineEvent::PhaseStarted { .. } => "phase_started",
            EngineEvent::PhaseCompleted { .. } => "phase_completed",
            EngineEvent::AgentStarted { .. } => "agent_started",
            EngineEvent::AgentCompleted { .. } => "agent_completed",
            EngineEvent::ModeChange { .. } => "mode_change",
        }
    }

    /// The id of the task this event concerns, when task-scoped.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            EngineEvent::TaskSubmitted(state)
            | EngineEvent::TaskStarted(state)
            | EngineEvent::TaskDecomposed(state)
            | EngineEvent::TaskCompleted(state)
            | EngineEvent::TaskFailed(state)
            | EngineEvent::TaskCancelled(state) => Some(&state.task_id),
            EngineEvent::PhaseStarted { task_id, .. }
            | EngineEvent::PhaseCompleted { task_id, .. }
            | EngineEvent::AgentStarted { task_id, .. }
            | EngineEvent::AgentCompleted { task_id, .. } => Some(task_id),
            EngineEvent::ModeChange { .. } => None,
        }
    }

    /// The JSON payload of this event.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            EngineEvent::TaskSubmitted(state)
            | EngineEvent::TaskStarted(state)
            | EngineEvent::TaskDecomposed(state)
            | EngineEvent::TaskCompleted(state)
            | EngineEvent::TaskFailed(state)
            | EngineEvent::TaskCancelled(state) => {
                serde_json::to_value(state).unwrap_or_default()
            }
            EngineEvent::PhaseStarted { task_id, phase }
            | EngineEvent::PhaseCompleted { task_id, phase } => json!({
                "task_id": task_id,
                "phase": serde_json::to_value(phase).unwrap_or_default(),
            }),
            EngineEvent::AgentStarted {
                task_id,
                phase,
                agent,
            } => json!({
                "task_id": task_id,
                "phase": phase,
                "agent": agent,
            }),
            EngineEvent::AgentCompleted {
                task_id,
                phase,
                agent,
                execution,
            } => json!({
                "task_id": task_id,
                "phase": phase,
                "agent": agent,
                "execution": serde_json::to_value(execution).unwrap_or_default(),
            }),
            EngineEvent::ModeChange {
                old_mode,
                new_mode,
                config,
            } => json!({
                "old_mode": old_mode,
                "new_mode": new_mode,
                "config": serde_json::to_value(config).unwrap_or_default(),
            }),
        }
    }

    /// The wire envelope delivered to channel subscribers.
    pub fn to_message(&self, timestamp: DateTime<Utc>) -> serde_json::Value {
        let mut message = json!({
            "type": self.event_type(),
            "data": self.payload(),
            "timestamp": timestamp.to_rfc3339(),
        });
        if let Some(task_id) = self.task_id() {
            message["task_id"] = json!(task_id);
        }
        message
    }
}

/// An in-process event callback registered with [`EventBus::on`].
pub type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<serde_json::Value>,
}

/// A channel subscription handed out by [`EventBus::subscribe`].
///
/// Dropping the subscription closes the channel; the bus removes the dead
/// subscriber on the next delivery.
pub struct Subscription {
    /// Identity of this subscriber, for [`EventBus::unsubscribe`].
    pub id: Uuid,
    /// The channel this subscription listens on.
    pub channel: String,
    receiver: mpsc::Receiver<serde_json::Value>,
}

impl Subscription {
    /// Receive the next event envelope, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<serde_json::Value> {
        self.receiver.try_recv().ok()
    }
}

/// Fan-out of engine events to in-process handlers and channel subscribers.
///
/// Task-scoped events are routed to `task:<id>` and the global `tasks`
/// channel; mode changes go to `mode` and `broadcast`; anything else
/// non-task goes to `broadcast`. Delivery is best-effort and never blocks:
/// a closed subscriber is removed, a full one loses the event.
pub struct EventBus {
    clock: Arc<dyn Clock>,
    channels: RwLock<HashMap<String, Vec<Subscriber>>>,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventBus {
    /// Create a bus stamping envelopes with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            channels: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a channel (`tasks`, `task:<id>`, `mode`, `broadcast`).
    pub async fn subscribe(&self, channel: &str) -> Subscription {
        let (tx, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        self.channels
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        Subscription {
            id,
            channel: channel.to_string(),
            receiver,
        }
    }

    /// Remove a subscriber from a channel.
    pub async fn unsubscribe(&self, channel: &str, id: Uuid) {
        let mut channels = self.channels.write().await;
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.retain(|subscriber| subscriber.id != id);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Number of live subscribers on a channel.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Register an in-process handler for a named event type.
    ///
    /// Handlers run synchronously during emit, before channel fan-out.
    /// A panicking handler is logged and ignored.
    pub async fn on(&self, event_type: &str, handler: EventHandler) {
        self.handlers
            .write()
            .await
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Emit an event to handlers and channel subscribers.
    pub async fn emit(&self, event: &EngineEvent) {
        self.run_handlers(event).await;

        let message = event.to_message(self.clock.now());
        match event.task_id() {
            Some(task_id) => {
                let task_channel = format!("task:{task_id}");
                self.deliver(&task_channel, &message).await;
                self.deliver(CHANNEL_TASKS, &message).await;
            }
            None => {
                if matches!(event, EngineEvent::ModeChange { .. }) {
                    self.deliver(CHANNEL_MODE, &message).await;
                }
                self.deliver(CHANNEL_BROADCAST, &message).await;
            }
        }
    }

    async fn run_handlers(&self, event: &EngineEvent) {
        let handlers: Vec<EventHandler> = {
            let registered = self.handlers.read().await;
            match registered.get(event.event_type()) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(event = event.event_type(), "Event handler panicked");
            }
        }
    }

    async fn deliver(&self, channel: &str, message: &serde_json::Value) {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(channel) else {
            return;
        };
        subscribers.retain(|subscriber| match subscriber.tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    channel = %channel,
                    subscriber = %subscriber.id,
                    "Subscriber buffer full, dropping event"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subscribers.is_empty() {
            channels.remove(channel);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::modes::ModeRegistry;
    use maestro_core::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task_state(task_id: &str) -> TaskState {
        let config = ModeRegistry::builtin().get("SPEED").unwrap().clone();
        TaskState::new(task_id, "demo task", "SPEED", config, None, 0, Utc::now())
    }

    fn bus() -> EventBus {
        EventBus::new(Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_task_event_routes_to_both_channels() {
        let bus = bus();
        let mut task_sub = bus.subscribe("task:t-1").await;
        let mut global_sub = bus.subscribe(CHANNEL_TASKS).await;

        bus.emit(&EngineEvent::TaskSubmitted(task_state("t-1"))).await;

        let message = task_sub.recv().await.unwrap();
        assert_eq!(message["type"], "task_submitted");
        assert_eq!(message["task_id"], "t-1");
        assert_eq!(message["data"]["status"], "pending");

        let message = global_sub.recv().await.unwrap();
        assert_eq!(message["type"], "task_submitted");
    }

    #[tokio::test]
    async fn test_other_task_channel_not_notified() {
        let bus = bus();
        let mut other_sub = bus.subscribe("task:other").await;

        bus.emit(&EngineEvent::TaskSubmitted(task_state("t-1"))).await;
        assert!(other_sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_mode_change_routes_to_mode_and_broadcast() {
        let bus = bus();
        let mut mode_sub = bus.subscribe(CHANNEL_MODE).await;
        let mut broadcast_sub = bus.subscribe(CHANNEL_BROADCAST).await;
        let config = ModeRegistry::builtin().get("SPEED").unwrap().clone();

        bus.emit(&EngineEvent::ModeChange {
            old_mode: "QUALITY".to_string(),
            new_mode: "SPEED".to_string(),
            config,
        })
        .await;

        let message = mode_sub.recv().await.unwrap();
        assert_eq!(message["type"], "mode_change");
        assert_eq!(message["data"]["old_mode"], "QUALITY");
        assert!(message.get("task_id").is_none());

        assert!(broadcast_sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_dead_subscriber_removed() {
        let bus = bus();
        let subscription = bus.subscribe(CHANNEL_TASKS).await;
        assert_eq!(bus.subscriber_count(CHANNEL_TASKS).await, 1);

        drop(subscription);
        bus.emit(&EngineEvent::TaskSubmitted(task_state("t-1"))).await;
        assert_eq!(bus.subscriber_count(CHANNEL_TASKS).await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = bus();
        let subscription = bus.subscribe(CHANNEL_TASKS).await;
        bus.unsubscribe(CHANNEL_TASKS, subscription.id).await;
        assert_eq!(bus.subscriber_count(CHANNEL_TASKS).await, 0);
    }

    #[tokio::test]
    async fn test_per_subscriber_order_matches_emit_order() {
        let bus = bus();
        let mut subscription = bus.subscribe(CHANNEL_TASKS).await;

        bus.emit(&EngineEvent::TaskSubmitted(task_state("t-1"))).await;
        bus.emit(&EngineEvent::TaskStarted(task_state("t-1"))).await;
        bus.emit(&EngineEvent::TaskCompleted(task_state("t-1"))).await;

        assert_eq!(subscription.recv().await.unwrap()["type"], "task_submitted");
        assert_eq!(subscription.recv().await.unwrap()["type"], "task_started");
        assert_eq!(subscription.recv().await.unwrap()["type"], "task_completed");
    }

    #[tokio::test]
    async fn test_handler_invoked_for_matching_event_only() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        bus.on(
            "task_submitted",
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;

        bus.emit(&EngineEvent::TaskSubmitted(task_state("t-1"))).await;
        bus.emit(&EngineEvent::TaskStarted(task_state("t-1"))).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_break_emit() {
        let bus = bus();
        bus.on(
            "task_submitted",
            Arc::new(|_| panic!("handler blew up")),
        )
        .await;
        let mut subscription = bus.subscribe(CHANNEL_TASKS).await;

        bus.emit(&EngineEvent::TaskSubmitted(task_state("t-1"))).await;

        // Fan-out still happened after the handler panic.
        assert_eq!(subscription.recv().await.unwrap()["type"], "task_submitted");
    }

    #[test]
    fn test_event_types() {
        let event = EngineEvent::AgentStarted {
            task_id: "t-1".to_string(),
            phase: 2,
            agent: AgentKind::Implement,
        };
        assert_eq!(event.event_type(), "agent_started");
        assert_eq!(event.task_id(), Some("t-1"));
        let payload = event.payload();
        assert_eq!(payload["phase"], 2);
        assert_eq!(payload["agent"], "implement");
    }
}
