//! Timer-driven polling of the backend's read endpoints.
//!
//! Each poll task is its own tokio task with its own interval, so a slow or
//! failing endpoint never holds up the others. Tasks don't touch UI state:
//! they send what they fetched to the controller, which reconciles it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::backend::*;
use crate::event::Update;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollTask {
    Status,
    CommunicationMode,
    DeviceList,
    CommunicationLog,
}

impl PollTask {
    pub fn name(&self) -> &'static str {
        match self {
            PollTask::Status => "status",
            PollTask::CommunicationMode => "communication mode",
            PollTask::DeviceList => "device list",
            PollTask::CommunicationLog => "communication log",
        }
    }
}

/// What one poll fetched
#[derive(Debug, Clone)]
pub enum PollResult {
    Status(BackendResult<StatusReport>),
    CommunicationMode(BackendResult<ModeReport>),
    DeviceList(BackendResult<DeviceListing>),
    CommunicationLog(BackendResult<LogSnapshot>),
}

impl PollResult {
    pub fn task(&self) -> PollTask {
        match self {
            PollResult::Status(_) => PollTask::Status,
            PollResult::CommunicationMode(_) => PollTask::CommunicationMode,
            PollResult::DeviceList(_) => PollTask::DeviceList,
            PollResult::CommunicationLog(_) => PollTask::CommunicationLog,
        }
    }
}

/// Issue the single request behind `task`
pub async fn poll_once(task: PollTask, backend: &dyn Backend) -> PollResult {
    match task {
        PollTask::Status => PollResult::Status(backend.status().await),
        PollTask::CommunicationMode => {
            PollResult::CommunicationMode(backend.communication_mode().await)
        }
        PollTask::DeviceList => PollResult::DeviceList(backend.device_list().await),
        PollTask::CommunicationLog => {
            PollResult::CommunicationLog(backend.communication_log().await)
        }
    }
}

/// Owns the running poll tasks
pub struct Scheduler {
    backend: Arc<dyn Backend>,
    tx: UnboundedSender<Update>,
    running: HashMap<PollTask, JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(backend: Arc<dyn Backend>, tx: UnboundedSender<Update>) -> Self {
        Self {
            backend,
            tx,
            running: HashMap::new(),
        }
    }

    pub fn is_running(&self, task: PollTask) -> bool {
        self.running
            .get(&task)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start polling `task` every `every`. The first request goes out
    /// immediately. Returns `false` if it was already running.
    pub fn start(&mut self, task: PollTask, every: Duration) -> bool {
        if self.is_running(task) {
            return false;
        }

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            // A slow response delays the next tick instead of stacking requests
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = poll_once(task, backend.as_ref()).await;
                if tx.send(Update::Poll(result)).is_err() {
                    tracing::debug!("Controller gone, stopping {} poll", task.name());
                    break;
                }
            }
        });

        tracing::debug!("Polling {} every {:?}", task.name(), every);
        self.running.insert(task, handle);
        true
    }

    /// Stop polling `task` and release its timer. Returns `false` if it
    /// wasn't running.
    pub fn stop(&mut self, task: PollTask) -> bool {
        match self.running.remove(&task) {
            Some(handle) => {
                let was_live = !handle.is_finished();
                handle.abort();
                tracing::debug!("Stopped {} poll", task.name());
                was_live
            }
            None => false,
        }
    }

    /// One extra fetch outside the schedule (refresh after a command)
    pub fn poll_now(&self, task: PollTask) {
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = poll_once(task, backend.as_ref()).await;
            let _ = tx.send(Update::Poll(result));
        });
    }

    pub fn shutdown(&mut self) {
        for (_, handle) in self.running.drain() {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
