//! Bounded-concurrency execution of independent remote mutations.
//!
//! Every unit of a phase is spawned at once and gated by a semaphore sized
//! for the phase. Completions are consumed in arrival order on the calling
//! task, which is the only place outcomes are accumulated. The first failure
//! cancels every unit that has not started yet; units already running finish
//! and land in [`BatchOutcome::late`]. An interrupt aborts everything, keeping
//! the results of units that had already finished.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, warn};

/// Kinds of work the engine runs, used in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AddCase,
    UpdateCase,
    AddResults,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::AddCase => "adding case",
            Phase::UpdateCase => "updating case",
            Phase::AddResults => "adding results",
        })
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Interrupted while {phase}")]
    Interrupted { phase: Phase },
}

/// Receives progress as units complete.
pub trait Progress: Send + Sync {
    /// `amount` more items are done.
    fn advance(&self, amount: u64);

    /// The phase ended; `message` says how.
    fn finish(&self, message: &str);
}

/// Creates a [`Progress`] per phase.
pub trait ProgressReporter: Send + Sync {
    fn start(&self, label: &str, total: u64) -> Box<dyn Progress>;
}

/// Reporter that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&self, _amount: u64) {}
    fn finish(&self, _message: &str) {}
}

impl ProgressReporter for NoProgress {
    fn start(&self, _label: &str, _total: u64) -> Box<dyn Progress> {
        Box::new(NoProgress)
    }
}

/// A failed unit, with whatever it managed to create before failing.
#[derive(Debug)]
pub struct UnitFailure<R> {
    pub message: String,
    pub partial: Option<R>,
}

impl<R> UnitFailure<R> {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial: None,
        }
    }

    pub fn with_partial(mut self, partial: Option<R>) -> Self {
        self.partial = partial;
        self
    }
}

/// Aggregated outcome of one phase.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// Successes observed before any failure, in completion order.
    pub completed: Vec<R>,
    /// Successes of units that were already running when the failure was
    /// observed, and partial results of failed units.
    pub late: Vec<R>,
    /// The first failure, if any.
    pub error: Option<String>,
    /// Units that never started or were aborted.
    pub cancelled: usize,
    /// The phase was cut short by the interrupt.
    pub interrupted: bool,
}

impl<R> BatchOutcome<R> {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
            late: Vec::new(),
            error: None,
            cancelled: 0,
            interrupted: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.interrupted
    }

    /// [`SubmitError::Interrupted`] if the interrupt ended `phase`.
    pub fn interruption(&self, phase: Phase) -> Result<(), SubmitError> {
        if self.interrupted {
            Err(SubmitError::Interrupted { phase })
        } else {
            Ok(())
        }
    }

    fn record_success(&mut self, result: R) {
        if self.error.is_none() {
            self.completed.push(result);
        } else {
            self.late.push(result);
        }
    }

    /// Every success, including the late ones.
    pub fn all_successes(self) -> Vec<R> {
        let mut all = self.completed;
        all.extend(self.late);
        all
    }
}

enum UnitOutcome<R> {
    Done(R),
    Failed(UnitFailure<R>),
    Cancelled,
}

/// Runs phases of independent units with bounded parallelism.
#[derive(Debug, Clone, Default)]
pub struct SubmissionEngine {
    interrupt: Option<watch::Receiver<bool>>,
}

impl SubmissionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort running phases once `interrupt` turns `true`.
    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Run `op` for every unit, at most `workers` at a time.
    ///
    /// `weight` gives the progress increment of a unit. The returned outcome
    /// carries at most one error message. An interrupt aborts the phase and
    /// sets [`BatchOutcome::interrupted`]; callers record the outcome before
    /// raising [`BatchOutcome::interruption`].
    pub async fn run<U, R, F, Fut, W>(
        &self,
        phase: Phase,
        units: Vec<U>,
        workers: usize,
        weight: W,
        op: F,
        progress: &dyn Progress,
    ) -> BatchOutcome<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: Fn(U) -> Fut,
        Fut: Future<Output = Result<R, UnitFailure<R>>> + Send + 'static,
        W: Fn(&U) -> u64,
    {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut set = JoinSet::new();

        for unit in units {
            let amount = weight(&unit);
            let work = op(unit);
            let semaphore = Arc::clone(&semaphore);
            let cancelled = Arc::clone(&cancelled);
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (amount, UnitOutcome::Cancelled);
                };
                if cancelled.load(Ordering::SeqCst) {
                    return (amount, UnitOutcome::Cancelled);
                }
                match work.await {
                    Ok(result) => (amount, UnitOutcome::Done(result)),
                    Err(failure) => {
                        // Flag before the permit is released so no queued unit starts.
                        cancelled.store(true, Ordering::SeqCst);
                        (amount, UnitOutcome::Failed(failure))
                    }
                }
            });
        }

        let mut outcome = BatchOutcome::new();
        let mut interrupt = self.interrupt.clone();

        loop {
            let joined = tokio::select! {
                biased;
                _ = wait_for_interrupt(&mut interrupt) => {
                    cancelled.store(true, Ordering::SeqCst);
                    set.abort_all();
                    // Units that finished before the abort still count.
                    while let Some(joined) = set.join_next().await {
                        match joined {
                            Ok((_, UnitOutcome::Done(result))) => outcome.record_success(result),
                            Ok((_, UnitOutcome::Failed(failure))) => outcome.late.extend(failure.partial),
                            Ok((_, UnitOutcome::Cancelled)) | Err(_) => outcome.cancelled += 1,
                        }
                    }
                    warn!("Interrupted: {phase}. Outstanding tasks were cancelled.");
                    progress.finish("Interrupted.");
                    outcome.interrupted = true;
                    return outcome;
                }
                joined = set.join_next() => joined,
            };
            let Some(joined) = joined else { break };

            let failure = match joined {
                Ok((amount, UnitOutcome::Done(result))) => {
                    if outcome.error.is_none() {
                        progress.advance(amount);
                    }
                    outcome.record_success(result);
                    None
                }
                Ok((_, UnitOutcome::Failed(failure))) => {
                    outcome.late.extend(failure.partial);
                    Some(failure.message)
                }
                Ok((_, UnitOutcome::Cancelled)) => {
                    outcome.cancelled += 1;
                    None
                }
                Err(join_error) => {
                    cancelled.store(true, Ordering::SeqCst);
                    Some(format!("Unexpected error during {phase}: {join_error}"))
                }
            };

            if let Some(message) = failure {
                if outcome.error.is_none() {
                    error!("Error during {phase}: {message}");
                    warn!("Aborting: {phase}. Trying to cancel scheduled tasks.");
                    outcome.error = Some(message);
                }
            }
        }

        if outcome.is_success() {
            progress.finish("Done.");
        } else {
            progress.finish("Aborted.");
        }
        outcome
    }
}

/// Resolves once the interrupt flag is set; never resolves without a receiver.
async fn wait_for_interrupt(interrupt: &mut Option<watch::Receiver<bool>>) {
    match interrupt {
        Some(rx) => loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    struct Counter(AtomicU64);

    impl Progress for Counter {
        fn advance(&self, amount: u64) {
            self.0.fetch_add(amount, Ordering::SeqCst);
        }
        fn finish(&self, _message: &str) {}
    }

    #[tokio::test]
    async fn test_all_units_succeed() {
        let engine = SubmissionEngine::new();
        let progress = Counter(AtomicU64::new(0));
        let outcome = engine
            .run(
                Phase::AddCase,
                vec![1, 2, 3, 4],
                2,
                |_| 1,
                |n: i32| async move { Ok::<_, UnitFailure<i32>>(n * 10) },
                &progress,
            )
            .await;

        assert!(outcome.is_success());
        let mut results = outcome.completed;
        results.sort();
        assert_eq!(results, vec![10, 20, 30, 40]);
        assert_eq!(progress.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_progress_weighted_by_batch_size() {
        let engine = SubmissionEngine::new();
        let progress = Counter(AtomicU64::new(0));
        let batches = vec![vec![1, 2, 3], vec![4, 5]];
        engine
            .run(
                Phase::AddResults,
                batches,
                2,
                |batch| batch.len() as u64,
                |batch: Vec<i32>| async move { Ok::<_, UnitFailure<usize>>(batch.len()) },
                &progress,
            )
            .await;
        assert_eq!(progress.0.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failure_cancels_pending_units() {
        let engine = SubmissionEngine::new();
        let outcome = engine
            .run(
                Phase::AddResults,
                vec![1, 2, 3, 4, 5],
                1,
                |_| 1,
                |n: i32| async move {
                    if n == 3 {
                        Err(UnitFailure::new("batch 3 rejected"))
                    } else {
                        Ok(n)
                    }
                },
                &NoProgress,
            )
            .await;

        assert_eq!(outcome.error.as_deref(), Some("batch 3 rejected"));
        assert_eq!(outcome.cancelled, 2);
        let mut kept = outcome.all_successes();
        kept.sort();
        assert_eq!(kept, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_partial_result_of_failed_unit_is_kept() {
        let engine = SubmissionEngine::new();
        let outcome = engine
            .run(
                Phase::AddCase,
                vec![1, 2],
                1,
                |_| 1,
                |n: i32| async move {
                    if n == 2 {
                        Err(UnitFailure::new("echo mismatch").with_partial(Some(n)))
                    } else {
                        Ok(n)
                    }
                },
                &NoProgress,
            )
            .await;

        assert_eq!(outcome.error.as_deref(), Some("echo mismatch"));
        assert_eq!(outcome.completed, vec![1]);
        assert_eq!(outcome.late, vec![2]);
    }

    #[tokio::test]
    async fn test_interrupt_aborts_phase() {
        let (tx, rx) = watch::channel(false);
        let engine = SubmissionEngine::new().with_interrupt(rx);
        let handle = tokio::spawn(async move {
            engine
                .run(
                    Phase::UpdateCase,
                    vec![1, 2],
                    2,
                    |_| 1,
                    |_n: i32| async move {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok::<_, UnitFailure<()>>(())
                    },
                    &NoProgress,
                )
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let outcome = handle.await.unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.cancelled, 2);
        assert!(matches!(
            outcome.interruption(Phase::UpdateCase),
            Err(SubmitError::Interrupted { phase: Phase::UpdateCase })
        ));
    }

    #[tokio::test]
    async fn test_interrupt_keeps_finished_units() {
        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let engine = SubmissionEngine::new().with_interrupt(rx);
        let outcome = engine
            .run(
                Phase::AddCase,
                vec![1, 2, 3],
                1,
                |_| 1,
                move |n: i32| {
                    let tx = Arc::clone(&tx);
                    async move {
                        if n == 2 {
                            let _ = tx.send(true);
                            std::future::pending::<()>().await;
                        }
                        Ok::<_, UnitFailure<i32>>(n)
                    }
                },
                &NoProgress,
            )
            .await;

        assert!(outcome.interrupted);
        assert_eq!(outcome.all_successes(), vec![1]);
    }
}
