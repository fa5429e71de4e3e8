//! Drainable job queue between task intake and the worker pool.
//!
//! Producers push [`Job`]s into a bounded intake channel; a single scheduler
//! task moves them to the bounded output channel that workers consume.
//! Jobs that cannot be forwarded immediately (drain latched on, or output
//! full) spill into an internal FIFO backlog owned by the scheduler, which
//! a 250 ms tick flushes head-first whenever emission is allowed.
//!
//! Ordering is best-effort FIFO only: a job arriving while the output has
//! room may leapfrog older jobs sitting in the backlog.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info};

const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Scheduling token for one file of one task. Ephemeral, never journaled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub task_id: String,
    pub file_index: usize,
    pub host: String,
}

/// Two-stage queue with a drain latch.
pub struct Dispatcher {
    intake_tx: mpsc::Sender<Job>,
    output_rx: Mutex<mpsc::Receiver<Job>>,
    drain: Arc<AtomicBool>,
    closed: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl Dispatcher {
    /// Creates the dispatcher and spawns its scheduler task.
    pub fn new(intake_buffer: usize, output_buffer: usize) -> Self {
        let (intake_tx, intake_rx) = mpsc::channel(intake_buffer);
        let (output_tx, output_rx) = mpsc::channel(output_buffer);
        let drain = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = watch::channel(false);

        tokio::spawn(scheduler_loop(
            intake_rx,
            output_tx,
            Arc::clone(&drain),
            stop_rx,
        ));

        Self {
            intake_tx,
            output_rx: Mutex::new(output_rx),
            drain,
            closed: AtomicBool::new(false),
            stop_tx,
        }
    }

    /// Pushes a job into intake, blocking when the buffer is full
    /// (backpressure). Returns false once the scheduler has stopped.
    pub async fn enqueue(&self, job: Job) -> bool {
        self.intake_tx.send(job).await.is_ok()
    }

    /// Pulls the next job for a worker; `None` once the queue is closed and
    /// its buffered jobs are consumed.
    pub async fn next_job(&self) -> Option<Job> {
        self.output_rx.lock().await.recv().await
    }

    /// Latches emission on/off. While draining, intake keeps accepting jobs
    /// into the backlog; in-flight workers are unaffected.
    pub fn set_drain(&self, on: bool) {
        self.drain.store(on, Ordering::SeqCst);
        info!(drain = on, "dispatcher drain latch changed");
    }

    pub fn is_drain(&self) -> bool {
        self.drain.load(Ordering::SeqCst)
    }

    /// Stops the scheduler; the output channel closes after its buffer
    /// drains. Idempotent. Intake stays open so in-flight producers do not
    /// crash; anything left in the backlog is lost from this run and comes
    /// back as pending state on the next start.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_tx.send(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn scheduler_loop(
    mut intake_rx: mpsc::Receiver<Job>,
    output_tx: mpsc::Sender<Job>,
    drain: Arc<AtomicBool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut backlog: VecDeque<Job> = VecDeque::new();
    let mut tick = tokio::time::interval(FLUSH_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = tick.tick() => {
                if !drain.load(Ordering::SeqCst) {
                    flush_backlog(&mut backlog, &output_tx);
                }
            }
            job = intake_rx.recv() => {
                let Some(job) = job else { break };
                if drain.load(Ordering::SeqCst) {
                    backlog.push_back(job);
                    continue;
                }
                match output_tx.try_send(job) {
                    Ok(()) => {}
                    Err(TrySendError::Full(job)) => backlog.push_back(job),
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }
    }

    if !backlog.is_empty() {
        debug!(
            count = backlog.len(),
            "scheduler stopping with backlogged jobs; their journaled state is pending"
        );
    }
    // Dropping output_tx closes the worker channel once buffered jobs drain.
}

/// Moves backlog jobs into the output head-first, stopping at the first
/// full send.
fn flush_backlog(backlog: &mut VecDeque<Job>, output_tx: &mpsc::Sender<Job>) {
    while let Some(job) = backlog.pop_front() {
        match output_tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                backlog.push_front(job);
                return;
            }
            Err(TrySendError::Closed(_)) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn job(n: usize) -> Job {
        Job {
            task_id: format!("task-{n}"),
            file_index: n,
            host: "example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn forwards_jobs_to_output() {
        let dispatcher = Dispatcher::new(16, 16);
        assert!(dispatcher.enqueue(job(1)).await);

        let got = timeout(Duration::from_secs(1), dispatcher.next_job())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, job(1));
    }

    #[tokio::test]
    async fn drain_buffers_jobs_until_resumed() {
        let dispatcher = Dispatcher::new(16, 16);
        dispatcher.set_drain(true);
        for n in 0..3 {
            assert!(dispatcher.enqueue(job(n)).await);
        }

        // Nothing must be emitted while draining.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(timeout(Duration::from_millis(50), dispatcher.next_job())
            .await
            .is_err());

        dispatcher.set_drain(false);
        // The next tick flushes the backlog.
        for _ in 0..3 {
            let got = timeout(Duration::from_millis(600), dispatcher.next_job())
                .await
                .expect("backlog should flush within one tick")
                .unwrap();
            assert_eq!(got.host, "example.com");
        }
    }

    #[tokio::test]
    async fn full_output_spills_to_backlog_and_recovers() {
        let dispatcher = Dispatcher::new(16, 1);
        for n in 0..5 {
            assert!(dispatcher.enqueue(job(n)).await);
        }
        // Give the scheduler time to spill past the 1-slot output buffer.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut seen = Vec::new();
        for _ in 0..5 {
            let got = timeout(Duration::from_secs(2), dispatcher.next_job())
                .await
                .expect("all spilled jobs must eventually be emitted")
                .unwrap();
            seen.push(got.file_index);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn close_ends_the_output_stream() {
        let dispatcher = Dispatcher::new(16, 16);
        assert!(dispatcher.enqueue(job(1)).await);
        dispatcher.close();
        dispatcher.close(); // idempotent

        // The buffered job is still delivered, then the channel ends.
        let mut jobs = Vec::new();
        while let Some(found) = timeout(Duration::from_secs(1), dispatcher.next_job())
            .await
            .expect("output must close promptly after close()")
        {
            jobs.push(found);
        }
        assert!(jobs.len() <= 1);
        assert!(dispatcher.is_closed());
    }

    #[tokio::test]
    async fn enqueue_after_close_reports_failure() {
        let dispatcher = Dispatcher::new(16, 16);
        dispatcher.close();
        while dispatcher.next_job().await.is_some() {}

        // Scheduler is gone, so intake sends are rejected.
        assert!(!dispatcher.enqueue(job(1)).await);
    }
}
