//! Debounced evaluation scheduling.
//!
//! Every `notify` cancels the pending evaluation (if any) and installs a
//! new one, so a burst of device notifications results in a single
//! evaluation once the burst goes quiet. Evaluations already past their
//! delay are never interrupted; a newer request waits for them to finish.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::audio::ChangeListener;

use super::policy::SharedPolicy;

/// The work a scheduler runs once a request survives its quiet period.
pub trait Reconcile: Send + Sync + 'static {
    fn reconcile(&self, reason: &str) -> anyhow::Result<()>;
}

impl<F> Reconcile for F
where
    F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn reconcile(&self, reason: &str) -> anyhow::Result<()> {
        self(reason)
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending { reason: String },
    Running { reason: String },
}

struct PendingRun {
    generation: u64,
    reason: String,
    token: CancellationToken,
}

#[derive(Default)]
struct SchedulerState {
    pending: Option<PendingRun>,
    running: Option<String>,
    generation: u64,
    disposed: bool,
}

struct Shared {
    state: Mutex<SchedulerState>,
    run_gate: tokio::sync::Mutex<()>,
    reconciler: Arc<dyn Reconcile>,
    policy: SharedPolicy,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move a surviving request from pending to running.
    ///
    /// The cancellation check happens under the state lock so a concurrent
    /// `notify` either cancels this request or lets it run, never both.
    fn begin_run(&self, generation: u64, token: &CancellationToken, reason: &str) -> bool {
        let mut state = self.lock();
        if token.is_cancelled() {
            return false;
        }
        if state
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == generation)
        {
            state.pending = None;
        }
        state.running = Some(reason.to_string());
        true
    }

    fn end_run(&self) {
        self.lock().running = None;
    }
}

/// Coalesces change notifications into debounced evaluations.
#[derive(Clone)]
pub struct DebounceScheduler {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl DebounceScheduler {
    /// The quiet period is read from `policy` each time a request arrives.
    pub fn new(runtime: Handle, policy: SharedPolicy, reconciler: Arc<dyn Reconcile>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::default()),
                run_gate: tokio::sync::Mutex::new(()),
                reconciler,
                policy,
            }),
            runtime,
        }
    }

    /// Request an evaluation.
    ///
    /// `immediate` skips the quiet period. Either way the previously pending
    /// request is superseded. Never blocks.
    pub fn notify(&self, reason: &str, immediate: bool) {
        let delay = if immediate {
            None
        } else {
            Some(self.shared.policy.debounce())
        };

        let (generation, token) = {
            let mut state = self.shared.lock();
            if state.disposed {
                debug!(reason, "scheduler disposed, ignoring request");
                return;
            }

            if let Some(previous) = state.pending.take() {
                trace!(superseded = %previous.reason, reason, "cancelling pending evaluation");
                previous.token.cancel();
            }

            state.generation += 1;
            let token = CancellationToken::new();
            state.pending = Some(PendingRun {
                generation: state.generation,
                reason: reason.to_string(),
                token: token.clone(),
            });
            (state.generation, token)
        };

        debug!(reason, immediate, "evaluation scheduled");
        let shared = self.shared.clone();
        let reason = reason.to_string();
        self.runtime
            .spawn(Self::run(shared, generation, token, reason, delay));
    }

    async fn run(
        shared: Arc<Shared>,
        generation: u64,
        token: CancellationToken,
        reason: String,
        delay: Option<Duration>,
    ) {
        if let Some(delay) = delay {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // Wait out an evaluation that is still in flight.
        let _gate = tokio::select! {
            _ = token.cancelled() => return,
            gate = shared.run_gate.lock() => gate,
        };

        if !shared.begin_run(generation, &token, &reason) {
            return;
        }

        let reconciler = shared.reconciler.clone();
        let task_reason = reason.clone();
        let result =
            tokio::task::spawn_blocking(move || reconciler.reconcile(&task_reason)).await;

        match result {
            Ok(Ok(())) => debug!(reason = %reason, "evaluation finished"),
            Ok(Err(e)) => error!(reason = %reason, error = %e, "evaluation failed"),
            Err(e) if e.is_panic() => error!(reason = %reason, "evaluation panicked"),
            Err(e) => error!(reason = %reason, error = %e, "evaluation aborted"),
        }

        shared.end_run();
    }

    /// Cancel the pending request and refuse new ones.
    ///
    /// An evaluation already running is allowed to finish.
    pub fn dispose(&self) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        if let Some(pending) = state.pending.take() {
            pending.token.cancel();
        }
        debug!("scheduler disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn phase(&self) -> Phase {
        let state = self.shared.lock();
        match (&state.running, &state.pending) {
            (Some(reason), _) => Phase::Running {
                reason: reason.clone(),
            },
            (None, Some(pending)) => Phase::Pending {
                reason: pending.reason.clone(),
            },
            (None, None) => Phase::Idle,
        }
    }
}

impl ChangeListener for DebounceScheduler {
    fn on_changed(&self, reason: &str) {
        self.notify(reason, false);
    }
}
