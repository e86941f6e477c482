//! # Worker Runtime
//!
//! Process lifecycle for one worker role:
//!
//! ```text
//! Starting -> LockWait -> Running -> Draining -> Stopped
//!                 |           |
//!                 |           +-- lock lost ------> Stopped (exit 1)
//!                 +-- lock held elsewhere --------> Stopped (exit 0)
//! ```
//!
//! While running, two tasks share a cancellation token derived from the
//! shutdown token:
//!
//! - **heartbeat**: renews the lease every heartbeat interval. A renewal that
//!   matches no row, or no successful renewal for a full TTL, cancels the
//!   token and marks the lock lost.
//! - **cycle**: runs the orchestrator immediately, then on every cycle
//!   interval. Cancellation stops the *next* cycle and keeps a running cycle
//!   from starting further servers. Servers already in flight finish, bounded
//!   by the drain timeout.
//!
//! The current state is published on a `watch` channel.

use crate::coordination::LockManager;
use crate::error::GatewatchResult;
use crate::logging::log_worker_transition;
use crate::orchestration::ProbeOrchestrator;
use std::fmt;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Starting,
    LockWait,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::LockWait => "lock_wait",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Why the runtime stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Another instance holds the lock
    LockHeld,
    /// Shut down on request after releasing the lock
    Stopped,
    /// The lease was taken over or could not be renewed
    LockLost,
}

impl WorkerExit {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::LockHeld | Self::Stopped => 0,
            Self::LockLost => 1,
        }
    }
}

impl From<WorkerExit> for ExitCode {
    fn from(exit: WorkerExit) -> Self {
        ExitCode::from(exit.exit_code())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RuntimeSettings {
    pub heartbeat_interval: Duration,
    pub cycle_interval: Duration,
    pub lock_ttl: Duration,
    pub drain_timeout: Duration,
}

pub struct WorkerRuntime {
    lock: Arc<LockManager>,
    orchestrator: Arc<ProbeOrchestrator>,
    settings: RuntimeSettings,
    shutdown: CancellationToken,
    state_tx: watch::Sender<WorkerState>,
}

impl fmt::Debug for WorkerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRuntime")
            .field("lock", &self.lock)
            .field("settings", &self.settings)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl WorkerRuntime {
    pub fn new(
        lock: Arc<LockManager>,
        orchestrator: Arc<ProbeOrchestrator>,
        settings: RuntimeSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(WorkerState::Starting);
        Self {
            lock,
            orchestrator,
            settings,
            shutdown: CancellationToken::new(),
            state_tx,
        }
    }

    /// Cancelling this token requests a graceful shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    fn transition(&self, next: WorkerState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            log_worker_transition(
                self.lock.lock_id(),
                self.lock.worker_id(),
                &previous.to_string(),
                &next.to_string(),
            );
        }
    }

    /// Run until shutdown, lock loss or lock contention. Errors only when the
    /// lock cannot be attempted at all.
    pub async fn run(self) -> GatewatchResult<WorkerExit> {
        self.transition(WorkerState::LockWait);

        match self.lock.acquire().await {
            Ok(true) => {}
            Ok(false) => {
                info!(lock_id = %self.lock.lock_id(), "Another instance is active, exiting");
                self.transition(WorkerState::Stopped);
                return Ok(WorkerExit::LockHeld);
            }
            Err(e) => {
                error!(error = %e, "Failed to acquire worker lock");
                self.transition(WorkerState::Stopped);
                return Err(e);
            }
        }

        self.transition(WorkerState::Running);

        let tasks = self.shutdown.child_token();
        let lock_lost = CancellationToken::new();
        let heartbeat = self.spawn_heartbeat(tasks.clone(), lock_lost.clone());
        let cycles = self.spawn_cycles(tasks.clone());

        tasks.cancelled().await;

        if lock_lost.is_cancelled() {
            error!(lock_id = %self.lock.lock_id(), "Worker lock lost, stopping without release");
            self.await_cycle(cycles).await;
            let _ = heartbeat.await;
            self.transition(WorkerState::Stopped);
            return Ok(WorkerExit::LockLost);
        }

        self.transition(WorkerState::Draining);
        let _ = heartbeat.await;
        self.await_cycle(cycles).await;

        if let Err(e) = self.lock.release().await {
            // The lease will expire on its own
            warn!(error = %e, "Failed to release worker lock during shutdown");
        }

        self.transition(WorkerState::Stopped);
        Ok(WorkerExit::Stopped)
    }

    async fn await_cycle(&self, mut cycles: JoinHandle<()>) {
        match tokio::time::timeout(self.settings.drain_timeout, &mut cycles).await {
            Ok(Ok(())) => debug!("Cycle task finished"),
            Ok(Err(e)) => error!(error = %e, "Cycle task panicked"),
            Err(_) => {
                warn!(
                    drain_timeout_seconds = self.settings.drain_timeout.as_secs(),
                    "In-flight cycle exceeded drain timeout, abandoning it"
                );
                cycles.abort();
            }
        }
    }

    fn spawn_heartbeat(
        &self,
        tasks: CancellationToken,
        lock_lost: CancellationToken,
    ) -> JoinHandle<()> {
        let lock = self.lock.clone();
        let period = self.settings.heartbeat_interval;
        let ttl = self.settings.lock_ttl;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_renewed = Instant::now();

            loop {
                tokio::select! {
                    biased;
                    _ = tasks.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match lock.renew().await {
                    Ok(true) => last_renewed = Instant::now(),
                    Ok(false) => {
                        lock_lost.cancel();
                        tasks.cancel();
                        break;
                    }
                    Err(e) => {
                        let stale_for = last_renewed.elapsed();
                        warn!(
                            error = %e,
                            stale_seconds = stale_for.as_secs(),
                            "Lock renewal failed, retrying next heartbeat"
                        );
                        if stale_for >= ttl {
                            error!("No successful renewal within lock TTL, treating lock as lost");
                            lock_lost.cancel();
                            tasks.cancel();
                            break;
                        }
                    }
                }
            }
            debug!("Heartbeat task stopped");
        })
    }

    fn spawn_cycles(&self, tasks: CancellationToken) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let period = self.settings.cycle_interval;

        tokio::spawn(async move {
            // First tick completes immediately, giving the initial cycle
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = tasks.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if let Err(e) = orchestrator.run_cycle_until(&tasks).await {
                    error!(role = %orchestrator.role(), error = %e, "Cycle aborted");
                }
            }
            debug!("Cycle task stopped");
        })
    }
}
