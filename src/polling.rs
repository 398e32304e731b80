//! Strategies for driving a task through POLLING.
//!
//! Both strategies go through [`TaskOrchestrator::poll_step`], so they reach
//! the same persisted terminal state and differ only in who waits.

use std::time::Duration;

use tokio::time::sleep;

use crate::error::OrchestratorError;
use crate::orchestrator::TaskOrchestrator;
use crate::state_machine::Task;

/// Result of one status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// The remote job is still queued or running.
    Pending,
    /// The task reached a terminal status.
    Terminal,
}

/// Sleeps in the calling task between status reads.
#[derive(Debug, Clone, Copy)]
pub struct BlockingPoller {
    interval: Duration,
}

impl BlockingPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Polls until the task is terminal. Errors propagate unsettled so the
    /// caller can classify them once.
    pub async fn drive(&self, orchestrator: &TaskOrchestrator, task: &mut Task) -> Result<(), OrchestratorError> {
        loop {
            match orchestrator.poll_once(task).await? {
                PollStep::Terminal => return Ok(()),
                PollStep::Pending => sleep(self.interval).await,
            }
        }
    }
}

/// Runs a [`DeferredPoll`] after a delay.
///
/// Implementations may deliver a poll more than once; a poll of a task that
/// is already terminal does nothing.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, poll: DeferredPoll);
}

/// [`Scheduler`] backed by `tokio::spawn`. Polls die with the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, poll: DeferredPoll) {
        tokio::spawn(async move {
            sleep(delay).await;
            poll.run().await;
        });
    }
}

/// One status read of one task, which re-queues itself while the remote job
/// is still pending.
///
/// Each poll carries the generation it was scheduled under. Running a poll
/// claims the next generation before reading, so a duplicate delivery of the
/// same poll finds a newer generation on the record and exits without
/// scheduling a successor.
#[derive(Clone)]
pub struct DeferredPoll {
    orchestrator: TaskOrchestrator,
    task_id: String,
    interval: Duration,
    seq: u64,
}

impl DeferredPoll {
    pub fn new(orchestrator: TaskOrchestrator, task_id: impl Into<String>, interval: Duration, seq: u64) -> Self {
        Self {
            orchestrator,
            task_id: task_id.into(),
            interval,
            seq,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub async fn run(mut self) {
        match self.step().await {
            Ok(Some(PollStep::Pending)) => {
                let scheduler = self.orchestrator.scheduler();
                scheduler.schedule(self.interval, self);
            }
            Ok(Some(PollStep::Terminal)) | Ok(None) => {}
            Err(e) => {
                tracing::error!(task_id = %self.task_id, error = %e, "deferred poll failed");
            }
        }
    }

    /// `None` when this poll is stale or the task is already terminal.
    async fn step(&mut self) -> Result<Option<PollStep>, OrchestratorError> {
        let task = self.orchestrator.get(&self.task_id).await?;
        let Some(mut task) = task else {
            return Err(OrchestratorError::TaskNotFound(self.task_id.clone()));
        };
        if task.is_terminal() {
            tracing::debug!(task_id = %self.task_id, status = %task.status, "task already terminal, skipping poll");
            return Ok(None);
        }
        if task.poll_seq != self.seq {
            tracing::debug!(
                task_id = %self.task_id,
                seq = self.seq,
                current = task.poll_seq,
                "stale poll, another chain owns the task"
            );
            return Ok(None);
        }
        self.seq = self.orchestrator.claim_poll(&mut task).await?;
        self.orchestrator.poll_step(&mut task).await.map(Some)
    }
}
