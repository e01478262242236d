// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use switchyard_bus::EventBus;
use switchyard_engine::EngineRegistry;
use switchyard_pool::PoolManager;
use switchyard_types::{Event, Priority, SessionEndReason, Task, TaskStatus};

/// Outcome of [`TaskManager::execute`] when the task does not complete
/// successfully — a distinguished `Aborted` variant lets a caller tell
/// "the task ran and failed" apart from "the task was cancelled or timed
/// out" without string-matching the message (spec.md §7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecuteError {
    #[error("{0}")]
    Failed(String),
    #[error("aborted: {0}")]
    Aborted(String),
}

/// Options a caller attaches to one [`TaskManager::submit`]/[`TaskManager::execute`] call.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub priority: Priority,
    pub timeout_ms: Option<u64>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    pub max_parallel: usize,
    pub default_timeout_ms: u64,
    pub max_history: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            default_timeout_ms: 300_000,
            max_history: 200,
        }
    }
}

/// One terminal result retained in [`TaskManager::history`].
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub task_id: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot combining a task's runtime status with its timing.
#[derive(Debug, Clone)]
pub struct TaskMetadataSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

struct PendingEntry {
    task: Task,
    priority: Priority,
    seq: u64,
    timeout_ms: u64,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for PendingEntry {}
impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingEntry {
    /// Highest priority first; ties broken by earliest enqueue order. A
    /// `BinaryHeap` pops the maximum, so smaller `seq` must compare as
    /// greater.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct RunningEntry {
    task: Task,
    #[allow(dead_code)]
    priority: Priority,
    cancel: CancellationToken,
    cancel_reason: Arc<Mutex<Option<String>>>,
    start_time: DateTime<Utc>,
    session_id: Option<String>,
}

struct State {
    pending: BinaryHeap<PendingEntry>,
    running: HashMap<String, RunningEntry>,
    history: VecDeque<HistoryEntry>,
    next_seq: u64,
}

struct Inner {
    state: Mutex<State>,
    bus: Arc<EventBus>,
    registry: Arc<EngineRegistry>,
    pools: Arc<PoolManager>,
    config: ManagerConfig,
    scheduling: AtomicBool,
}

/// Priority-scheduling layer above [`crate::TaskQueue`]: resolves an engine
/// and pooled session for each task lazily (at start time, not at submit
/// time), arms a timeout per running task, and keeps a bounded history of
/// terminal results (C7, priority variant — spec.md §4.7).
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub fn new(
        bus: Arc<EventBus>,
        registry: Arc<EngineRegistry>,
        pools: Arc<PoolManager>,
        config: ManagerConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                pending: BinaryHeap::new(),
                running: HashMap::new(),
                history: VecDeque::new(),
                next_seq: 0,
            }),
            bus,
            registry,
            pools,
            config,
            scheduling: AtomicBool::new(false),
        });
        install_correlation(&inner);
        Self { inner }
    }

    /// Enqueues `task` with `options.priority`; the scheduler starts the
    /// highest-priority pending task whenever a running slot frees.
    pub fn submit(&self, task: Task, options: SubmitOptions) -> String {
        let task_id = task.id.clone();
        let timeout_ms = options.timeout_ms.unwrap_or(self.inner.config.default_timeout_ms);
        let depth = {
            let mut state = self.inner.state.lock().expect("manager lock poisoned");
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push(PendingEntry {
                task: task.clone(),
                priority: options.priority,
                seq,
                timeout_ms,
            });
            state.pending.len()
        };
        self.inner.bus.publish(Event::TaskMetadata {
            task_id: task_id.clone(),
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            duration_ms: None,
            error: None,
        });
        self.inner.bus.publish(Event::TaskProgress {
            task_id: task_id.clone(),
            message: Some(format!("enqueued, depth={depth}")),
            percent: None,
        });
        self.schedule();
        task_id
    }

    /// Submits `task` and resolves once its terminal `task_completed` or
    /// `task_canceled` event is observed.
    pub async fn execute(&self, task: Task, options: SubmitOptions) -> Result<Value, ExecuteError> {
        let target_id = task.id.clone();
        let (tx, rx) = oneshot::channel::<Result<Value, ExecuteError>>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let tx_completed = tx.clone();
        let id_completed = target_id.clone();
        let sub_completed = self.inner.bus.subscribe(
            "task_completed",
            Arc::new(move |event: &Event| {
                if let Event::TaskCompleted { task_id, status, error, .. } = event {
                    if *task_id == id_completed {
                        if let Some(sender) = tx_completed.lock().unwrap().take() {
                            let result = match status {
                                TaskStatus::Success => Ok(Value::Null),
                                _ => Err(ExecuteError::Failed(
                                    error.clone().unwrap_or_else(|| format!("{status:?}")),
                                )),
                            };
                            let _ = sender.send(result);
                        }
                    }
                }
            }),
            switchyard_bus::SubscribeOptions::once(),
        );

        let tx_canceled = tx.clone();
        let id_canceled = target_id.clone();
        let sub_canceled = self.inner.bus.subscribe(
            "task_canceled",
            Arc::new(move |event: &Event| {
                if let Event::TaskCanceled { task_id, reason } = event {
                    if *task_id == id_canceled {
                        if let Some(sender) = tx_canceled.lock().unwrap().take() {
                            let _ = sender.send(Err(ExecuteError::Aborted(
                                reason.clone().unwrap_or_else(|| "canceled".to_string()),
                            )));
                        }
                    }
                }
            }),
            switchyard_bus::SubscribeOptions::once(),
        );

        self.submit(task, options);
        let outcome = rx
            .await
            .unwrap_or_else(|_| Err(ExecuteError::Aborted("execute channel closed".to_string())));
        self.inner.bus.unsubscribe(&sub_completed);
        self.inner.bus.unsubscribe(&sub_canceled);
        outcome
    }

    /// For a pending task: removes and publishes cancellation. For a
    /// running task: signals cancellation and calls `session.abort`.
    pub fn abort(&self, task_id: &str) -> bool {
        let pending_removed = {
            let mut state = self.inner.state.lock().expect("manager lock poisoned");
            let mut rest: BinaryHeap<PendingEntry> = BinaryHeap::new();
            let mut found = false;
            for entry in state.pending.drain() {
                if !found && entry.task.id == task_id {
                    found = true;
                } else {
                    rest.push(entry);
                }
            }
            state.pending = rest;
            found
        };
        if pending_removed {
            self.publish_canceled(task_id, None);
            return true;
        }

        let cancel = {
            let state = self.inner.state.lock().expect("manager lock poisoned");
            state.running.get(task_id).map(|e| (e.cancel.clone(), e.cancel_reason.clone()))
        };
        let Some((cancel, cancel_reason)) = cancel else {
            return false;
        };
        *cancel_reason.lock().expect("manager lock poisoned") = Some("user canceled".to_string());
        cancel.cancel();
        true
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        let state = self.inner.state.lock().expect("manager lock poisoned");
        if state.running.contains_key(task_id) {
            return Some(TaskStatus::Running);
        }
        if state.pending.iter().any(|e| e.task.id == task_id) {
            return Some(TaskStatus::Pending);
        }
        state
            .history
            .iter()
            .rev()
            .find(|h| h.task_id == task_id)
            .map(|h| if h.success { TaskStatus::Success } else { TaskStatus::Error })
    }

    pub fn metadata(&self, task_id: &str) -> Option<TaskMetadataSnapshot> {
        let state = self.inner.state.lock().expect("manager lock poisoned");
        if let Some(entry) = state.running.get(task_id) {
            return Some(TaskMetadataSnapshot {
                task_id: task_id.to_string(),
                status: TaskStatus::Running,
                start_time: Some(entry.start_time),
                end_time: None,
                duration_ms: None,
                error: None,
            });
        }
        state.history.iter().rev().find(|h| h.task_id == task_id).map(|h| {
            TaskMetadataSnapshot {
                task_id: task_id.to_string(),
                status: if h.success { TaskStatus::Success } else { TaskStatus::Error },
                start_time: None,
                end_time: Some(h.timestamp),
                duration_ms: None,
                error: h.error.clone(),
            }
        })
    }

    pub fn active_tasks(&self) -> Vec<Task> {
        let state = self.inner.state.lock().expect("manager lock poisoned");
        state.running.values().map(|e| e.task.clone()).collect()
    }

    /// Queued tasks, highest priority (and earliest enqueue order within a
    /// priority) first.
    pub fn queued_tasks(&self) -> Vec<Task> {
        let state = self.inner.state.lock().expect("manager lock poisoned");
        let mut entries: Vec<&PendingEntry> = state.pending.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|e| e.task.clone()).collect()
    }

    pub fn history(&self, filter: Option<&dyn Fn(&HistoryEntry) -> bool>) -> Vec<HistoryEntry> {
        let state = self.inner.state.lock().expect("manager lock poisoned");
        match filter {
            Some(f) => state.history.iter().filter(|h| f(h)).cloned().collect(),
            None => state.history.iter().cloned().collect(),
        }
    }

    /// Cancels every pending task; returns the count.
    pub fn clear_queue(&self) -> usize {
        let removed: Vec<Task> = {
            let mut state = self.inner.state.lock().expect("manager lock poisoned");
            let tasks = state.pending.drain().map(|e| e.task).collect();
            tasks
        };
        for task in &removed {
            self.publish_canceled(&task.id, Some("queue cleared".to_string()));
        }
        removed.len()
    }

    /// Cancels everything pending and running, without further bookkeeping.
    pub fn dispose(&self) {
        let running: Vec<CancellationToken> = {
            let mut state = self.inner.state.lock().expect("manager lock poisoned");
            state.pending.clear();
            state.running.values().map(|e| e.cancel.clone()).collect()
        };
        for cancel in running {
            cancel.cancel();
        }
    }

    fn publish_canceled(&self, task_id: &str, reason: Option<String>) {
        self.inner.bus.publish(Event::TaskCanceled {
            task_id: task_id.to_string(),
            reason: reason.clone(),
        });
        self.inner.bus.publish(Event::TaskMetadata {
            task_id: task_id.to_string(),
            status: TaskStatus::Canceled,
            start_time: None,
            end_time: None,
            duration_ms: None,
            error: None,
        });
    }

    fn schedule(&self) {
        if self.inner.scheduling.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            loop {
                let next = {
                    let mut state = self.inner.state.lock().expect("manager lock poisoned");
                    if state.running.len() >= self.inner.config.max_parallel {
                        None
                    } else {
                        state.pending.pop()
                    }
                };
                match next {
                    Some(entry) => self.start(entry),
                    None => break,
                }
            }
            self.inner.scheduling.store(false, Ordering::Release);
            let more_work = {
                let state = self.inner.state.lock().expect("manager lock poisoned");
                !state.pending.is_empty() && state.running.len() < self.inner.config.max_parallel
            };
            if !more_work || self.inner.scheduling.swap(true, Ordering::AcqRel) {
                break;
            }
        }
    }

    fn start(&self, entry: PendingEntry) {
        let task_id = entry.task.id.clone();
        let cancel = CancellationToken::new();
        let cancel_reason: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let start_time = Utc::now();
        {
            let mut state = self.inner.state.lock().expect("manager lock poisoned");
            state.running.insert(
                task_id.clone(),
                RunningEntry {
                    task: entry.task.clone(),
                    priority: entry.priority,
                    cancel: cancel.clone(),
                    cancel_reason: cancel_reason.clone(),
                    start_time,
                    session_id: None,
                },
            );
        }
        self.inner.bus.publish(Event::TaskMetadata {
            task_id: task_id.clone(),
            status: TaskStatus::Running,
            start_time: Some(start_time),
            end_time: None,
            duration_ms: None,
            error: None,
        });
        self.inner.bus.publish(Event::TaskProgress {
            task_id: task_id.clone(),
            message: Some("started".to_string()),
            percent: None,
        });

        let inner = self.inner.clone();
        let task = entry.task;
        let timeout_ms = entry.timeout_ms;
        tokio::spawn(async move {
            let engine_id = task.engine_id.clone().or_else(|| inner.registry.default_id());
            let engine = engine_id.as_deref().and_then(|id| inner.registry.get(id));

            let Some(engine) = engine else {
                finish(&inner, &task_id, start_time, TaskStatus::Error, Some("no engine available".to_string()), None);
                TaskManager { inner: inner.clone() }.schedule();
                return;
            };

            let pool = inner.pools.get_pool(engine.clone()).await;
            let session = match pool.acquire(None).await {
                Ok(session) => session,
                Err(err) => {
                    finish(&inner, &task_id, start_time, TaskStatus::Error, Some(err.to_string()), None);
                    TaskManager { inner: inner.clone() }.schedule();
                    return;
                }
            };

            {
                let mut state = inner.state.lock().expect("manager lock poisoned");
                if let Some(running) = state.running.get_mut(&task_id) {
                    running.session_id = Some(session.id().to_string());
                }
            }

            let timeout = tokio::time::sleep(std::time::Duration::from_millis(timeout_ms));
            tokio::pin!(timeout);

            let (status, error) = match session.run(task).await {
                Err(err) => (TaskStatus::Error, Some(err.to_string())),
                Ok(mut stream) => loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            session.abort(Some(&task_id)).await;
                            inner.bus.publish(Event::SessionEnd {
                                session_id: session.id().to_string(),
                                reason: SessionEndReason::Aborted,
                            });
                            let reason = cancel_reason.lock().expect("manager lock poisoned").clone();
                            break (TaskStatus::Canceled, reason);
                        }
                        _ = &mut timeout => {
                            session.abort(Some(&task_id)).await;
                            inner.bus.publish(Event::SessionEnd {
                                session_id: session.id().to_string(),
                                reason: SessionEndReason::Aborted,
                            });
                            break (TaskStatus::Canceled, Some("timeout".to_string()));
                        }
                        maybe_event = stream.next() => match maybe_event {
                            Some(event) => inner.bus.publish(event),
                            None => break (TaskStatus::Success, None),
                        },
                    }
                },
            };

            pool.release(&session, status == TaskStatus::Error).await;
            finish(&inner, &task_id, start_time, status, error, None);
            TaskManager { inner }.schedule();
        });
    }
}

/// Removes `task_id` from the running set and records its terminal result.
/// A no-op if the task was already finished — the `session_end`/`error`
/// correlation handlers in [`install_correlation`] race the task's own
/// stream-driven completion in [`TaskManager::start`], and only the first
/// to observe the task still running should publish its outcome.
fn finish(
    inner: &Arc<Inner>,
    task_id: &str,
    start_time: DateTime<Utc>,
    status: TaskStatus,
    error: Option<String>,
    output: Option<Value>,
) {
    {
        let mut state = inner.state.lock().expect("manager lock poisoned");
        if state.running.remove(task_id).is_none() {
            return;
        }
        state.history.push_back(HistoryEntry {
            task_id: task_id.to_string(),
            success: status == TaskStatus::Success,
            output: output.clone(),
            error: error.clone(),
            timestamp: Utc::now(),
        });
        while state.history.len() > inner.config.max_history {
            state.history.pop_front();
        }
    }

    let end_time = Utc::now();
    let duration_ms = (end_time - start_time).num_milliseconds();

    inner.bus.publish(Event::TaskMetadata {
        task_id: task_id.to_string(),
        status,
        start_time: Some(start_time),
        end_time: Some(end_time),
        duration_ms: Some(duration_ms),
        error: error.clone(),
    });

    match status {
        TaskStatus::Canceled => inner.bus.publish(Event::TaskCanceled {
            task_id: task_id.to_string(),
            reason: error,
        }),
        _ => inner.bus.publish(Event::TaskCompleted {
            task_id: task_id.to_string(),
            status,
            duration_ms,
            error,
        }),
    }
}

/// Registers the bus-driven correlation rules from spec.md §4.7: a bare
/// `error` event forces every currently-running task into the `error`
/// state, and a `session_end` whose session id matches a running task's
/// resolved session acts as a safety net in case that task's own stream
/// never produced a terminal event.
fn install_correlation(inner: &Arc<Inner>) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let weak_for_error = weak.clone();
    inner.bus.subscribe(
        "error",
        Arc::new(move |event: &Event| {
            let Event::Error { error, .. } = event else { return };
            let Some(inner) = weak_for_error.upgrade() else { return };
            let running_ids: Vec<(String, DateTime<Utc>)> = {
                let state = inner.state.lock().expect("manager lock poisoned");
                state.running.iter().map(|(id, e)| (id.clone(), e.start_time)).collect()
            };
            for (task_id, start_time) in running_ids {
                warn!(task_id = %task_id, "forcing task to error on bare error event");
                finish(&inner, &task_id, start_time, TaskStatus::Error, Some(error.clone()), None);
            }
        }),
        switchyard_bus::SubscribeOptions::default(),
    );

    let weak_for_session_end = weak;
    inner.bus.subscribe(
        "session_end",
        Arc::new(move |event: &Event| {
            let Event::SessionEnd { session_id, reason } = event else { return };
            let Some(inner) = weak_for_session_end.upgrade() else { return };
            let matching: Vec<(String, DateTime<Utc>)> = {
                let state = inner.state.lock().expect("manager lock poisoned");
                state
                    .running
                    .iter()
                    .filter(|(_, e)| e.session_id.as_deref() == Some(session_id.as_str()))
                    .map(|(id, e)| (id.clone(), e.start_time))
                    .collect()
            };
            let status = match reason {
                SessionEndReason::Completed => TaskStatus::Success,
                SessionEndReason::Aborted => TaskStatus::Canceled,
                SessionEndReason::Error => TaskStatus::Error,
            };
            for (task_id, start_time) in matching {
                finish(&inner, &task_id, start_time, status, None, None);
            }
        }),
        switchyard_bus::SubscribeOptions::default(),
    );
}
