// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use switchyard_bus::EventBus;
use switchyard_engine::Session;
use switchyard_types::{Event, SessionEndReason, Task, TaskStatus};

/// Bound on how many tasks [`TaskQueue`] runs concurrently.
#[derive(Debug, Clone, Copy)]
pub struct TaskQueueConfig {
    pub max_parallel: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self { max_parallel: 1 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
}

struct PendingEntry {
    task: Task,
    session: Arc<dyn Session>,
}

struct RunningEntry {
    #[allow(dead_code)]
    task: Task,
    session: Arc<dyn Session>,
    cancel: CancellationToken,
    cancel_reason: Arc<Mutex<Option<String>>>,
    start_time: DateTime<Utc>,
}

struct QueueState {
    pending: VecDeque<PendingEntry>,
    running: HashMap<String, RunningEntry>,
}

struct Inner {
    state: Mutex<QueueState>,
    bus: Arc<EventBus>,
    config: TaskQueueConfig,
    scheduling: AtomicBool,
    idle_notify: Notify,
}

/// Admission, scheduling, cancellation, and lifecycle-event emission for
/// tasks that already have a session assigned (C7, basic variant).
///
/// Republishes every event a running task's session produces, verbatim,
/// through the shared [`EventBus`] (spec.md §4.6, "Scheduler").
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    pub fn new(bus: Arc<EventBus>, config: TaskQueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: HashMap::new(),
                }),
                bus,
                config,
                scheduling: AtomicBool::new(false),
                idle_notify: Notify::new(),
            }),
        }
    }

    /// Appends `task` (already bound to `session`) to the pending list and
    /// invokes the scheduler.
    pub fn enqueue(&self, task: Task, session: Arc<dyn Session>) -> String {
        let task_id = task.id.clone();
        let depth = {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            state.pending.push_back(PendingEntry {
                task: task.clone(),
                session,
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

    /// For a pending task: removes it and publishes its cancellation. For
    /// a running task: signals its cancellation handle and calls
    /// `session.abort`. Returns whether a task was found at all.
    pub fn cancel(&self, task_id: &str) -> bool {
        let pending_removed = {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            if let Some(pos) = state.pending.iter().position(|e| e.task.id == task_id) {
                state.pending.remove(pos);
                true
            } else {
                false
            }
        };
        if pending_removed {
            self.inner.bus.publish(Event::TaskCanceled {
                task_id: task_id.to_string(),
                reason: None,
            });
            self.inner.bus.publish(Event::TaskMetadata {
                task_id: task_id.to_string(),
                status: TaskStatus::Canceled,
                start_time: None,
                end_time: None,
                duration_ms: None,
                error: None,
            });
            self.inner.idle_notify.notify_waiters();
            return true;
        }

        let running = {
            let state = self.inner.state.lock().expect("queue lock poisoned");
            state
                .running
                .get(task_id)
                .map(|e| (e.cancel.clone(), e.cancel_reason.clone(), e.session.clone()))
        };
        let Some((cancel, cancel_reason, session)) = running else {
            return false;
        };
        *cancel_reason.lock().expect("queue lock poisoned") = Some("user canceled".to_string());
        cancel.cancel();
        let id = task_id.to_string();
        tokio::spawn(async move {
            session.abort(Some(&id)).await;
        });
        true
    }

    /// Cancels every pending task with reason "queue cleared"; returns the
    /// count.
    pub fn clear(&self) -> usize {
        let removed: Vec<Task> = {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            state.pending.drain(..).map(|e| e.task).collect()
        };
        for task in &removed {
            self.inner.bus.publish(Event::TaskCanceled {
                task_id: task.id.clone(),
                reason: Some("queue cleared".to_string()),
            });
            self.inner.bus.publish(Event::TaskMetadata {
                task_id: task.id.clone(),
                status: TaskStatus::Canceled,
                start_time: None,
                end_time: None,
                duration_ms: None,
                error: None,
            });
        }
        self.inner.idle_notify.notify_waiters();
        removed.len()
    }

    /// Cancels every pending and running task without publishing terminal
    /// events beyond those needed to drain: pending tasks are dropped
    /// silently, running tasks are signalled and left to complete through
    /// the normal path.
    pub fn dispose(&self) {
        let running: Vec<(String, CancellationToken, Arc<dyn Session>)> = {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            state.pending.clear();
            state
                .running
                .iter()
                .map(|(id, e)| (id.clone(), e.cancel.clone(), e.session.clone()))
                .collect()
        };
        for (task_id, cancel, session) in running {
            cancel.cancel();
            tokio::spawn(async move {
                session.abort(Some(&task_id)).await;
            });
        }
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        let state = self.inner.state.lock().expect("queue lock poisoned");
        if state.running.contains_key(task_id) {
            return Some(TaskStatus::Running);
        }
        if state.pending.iter().any(|e| e.task.id == task_id) {
            return Some(TaskStatus::Pending);
        }
        None
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock().expect("queue lock poisoned");
        QueueStats {
            pending: state.pending.len(),
            running: state.running.len(),
        }
    }

    fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().expect("queue lock poisoned");
        state.pending.is_empty() && state.running.is_empty()
    }

    /// Resolves once no task is pending or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle_notify.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Re-entrant guarded scheduling pass: while there is pending work and
    /// a free slot, starts the head of the pending list.
    fn schedule(&self) {
        if self.inner.scheduling.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            loop {
                let next = {
                    let mut state = self.inner.state.lock().expect("queue lock poisoned");
                    if state.running.len() >= self.inner.config.max_parallel {
                        None
                    } else {
                        state.pending.pop_front()
                    }
                };
                match next {
                    Some(entry) => self.start(entry),
                    None => break,
                }
            }
            self.inner.scheduling.store(false, Ordering::Release);
            let more_work = {
                let state = self.inner.state.lock().expect("queue lock poisoned");
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
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            state.running.insert(
                task_id.clone(),
                RunningEntry {
                    task: entry.task.clone(),
                    session: entry.session.clone(),
                    cancel: cancel.clone(),
                    cancel_reason: cancel_reason.clone(),
                    start_time,
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
        let session = entry.session;
        let task = entry.task;
        tokio::spawn(async move {
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
                            let reason = cancel_reason.lock().expect("queue lock poisoned").clone();
                            break (TaskStatus::Canceled, reason);
                        }
                        maybe_event = stream.next() => match maybe_event {
                            Some(event) => inner.bus.publish(event),
                            None => break (TaskStatus::Success, None),
                        },
                    }
                },
            };
            complete(&inner, &task_id, start_time, status, error);
            TaskQueue { inner }.schedule();
        });
    }
}

fn complete(
    inner: &Arc<Inner>,
    task_id: &str,
    start_time: DateTime<Utc>,
    status: TaskStatus,
    error: Option<String>,
) {
    {
        let mut state = inner.state.lock().expect("queue lock poisoned");
        state.running.remove(task_id);
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

    inner.idle_notify.notify_waiters();
}
