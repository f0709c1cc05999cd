//! Status polling for tasks dispatched while the push channel is down.

use solutioniq_api::{AgentApi, TaskRecord};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The task reached `completed` or `failed`.
    Resolved(TaskRecord),
    TimedOut,
}

/// Receives the end of a polling loop.
pub trait PollSink: Send + Sync {
    fn poll_finished(&self, task_id: &str, placeholder_id: &str, outcome: PollOutcome);
}

struct ActiveLoop {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct LoopTable {
    next_generation: u64,
    loops: HashMap<String, ActiveLoop>,
}

/// One polling loop per placeholder.
pub struct FallbackPoller {
    api: Arc<dyn AgentApi>,
    config: PollerConfig,
    table: Arc<Mutex<LoopTable>>,
}

impl FallbackPoller {
    pub fn new(api: Arc<dyn AgentApi>, config: PollerConfig) -> Self {
        Self {
            api,
            config: PollerConfig {
                interval: config.interval.max(Duration::from_millis(1)),
                max_attempts: config.max_attempts.max(1),
            },
            table: Arc::new(Mutex::new(LoopTable::default())),
        }
    }

    #[must_use]
    pub fn config(&self) -> PollerConfig {
        self.config
    }

    /// Start polling `task_id` on behalf of `placeholder_id`, replacing any
    /// loop already running for that placeholder.
    ///
    /// The sink is held weakly; a loop whose sink is gone finishes silently.
    pub fn poll_for_result(
        &self,
        task_id: &str,
        placeholder_id: &str,
        conversation_id: Option<&str>,
        sink: Weak<dyn PollSink>,
    ) {
        let mut table = lock_table(&self.table);
        table.next_generation += 1;
        let generation = table.next_generation;

        debug!(task_id, placeholder_id, conversation_id = ?conversation_id, "starting fallback poll");
        let task = tokio::spawn(run_poll(
            Arc::clone(&self.api),
            self.config,
            Arc::clone(&self.table),
            generation,
            task_id.to_string(),
            placeholder_id.to_string(),
            sink,
        ));

        // The new loop cannot deregister itself before this insert: it
        // needs the table lock we are holding.
        if let Some(previous) = table
            .loops
            .insert(placeholder_id.to_string(), ActiveLoop { generation, task })
        {
            previous.task.abort();
        }
    }

    /// Stop the loop for `placeholder_id`. Returns `true` if one was running.
    pub fn cancel(&self, placeholder_id: &str) -> bool {
        match lock_table(&self.table).loops.remove(placeholder_id) {
            Some(active) => {
                active.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<ActiveLoop> = lock_table(&self.table)
            .loops
            .drain()
            .map(|(_, active)| active)
            .collect();
        for active in drained {
            active.task.abort();
        }
    }

    #[must_use]
    pub fn is_polling(&self, placeholder_id: &str) -> bool {
        lock_table(&self.table).loops.contains_key(placeholder_id)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        lock_table(&self.table).loops.len()
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock_table(table: &Mutex<LoopTable>) -> MutexGuard<'_, LoopTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_poll(
    api: Arc<dyn AgentApi>,
    config: PollerConfig,
    table: Arc<Mutex<LoopTable>>,
    generation: u64,
    task_id: String,
    placeholder_id: String,
    sink: Weak<dyn PollSink>,
) {
    let outcome = poll_until_terminal(api.as_ref(), config, &task_id).await;

    {
        let mut table = lock_table(&table);
        if table
            .loops
            .get(&placeholder_id)
            .is_some_and(|active| active.generation == generation)
        {
            table.loops.remove(&placeholder_id);
        }
    }

    if let Some(sink) = sink.upgrade() {
        sink.poll_finished(&task_id, &placeholder_id, outcome);
    }
}

async fn poll_until_terminal(api: &dyn AgentApi, config: PollerConfig, task_id: &str) -> PollOutcome {
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for attempt in 1..=config.max_attempts {
        ticker.tick().await;
        match api.get_task(task_id).await {
            Ok(record) if record.status.is_terminal() => {
                debug!(task_id, attempt, status = record.status.as_str(), "poll resolved");
                return PollOutcome::Resolved(record);
            }
            Ok(record) => {
                debug!(task_id, attempt, status = record.status.as_str(), "task not finished");
            }
            Err(error) => {
                debug!(task_id, attempt, "poll read failed: {}", error);
            }
        }
    }

    debug!(task_id, attempts = config.max_attempts, "poll timed out");
    PollOutcome::TimedOut
}
