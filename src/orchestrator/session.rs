//! Per-job sync session: push consumption, stall-triggered pull fallback,
//! and single-shot teardown.
//!
//! Each session runs as one tokio task that owns every piece of mutable
//! state (snapshot, detector, timers, channels). Channel messages and timer
//! ticks are handled one at a time by the task's `select!` loop, so no
//! locking is needed around the merge or the stall check.
//!
//! ```text
//! Connecting ──update──▶ LivePushOnly ──stall / push fault──▶ LivePushAndFallback
//!     │                       │                                       │
//!     └──push fault───────────┼──────────────▶ LivePushAndFallback    │
//!                             ▼                                       ▼
//!                 Terminated (terminal status or stop)  ◀─────────────┘
//! ```
//!
//! The caller observes the session through a [`SyncHandle`], backed by a
//! `tokio::sync::watch` channel. Every publish checks the phase inside the
//! channel's lock, so nothing is published once `Terminated` is set, whether
//! the task set it or [`SyncHandle::stop`] did.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::channel::{PullSource, PushChannel, PushEvent, PushSource};
use crate::config::TimingConfig;
use crate::models::session::{SessionPhase, SessionView};
use crate::models::status::{StatusSnapshot, StatusUpdate};
use crate::Result;

use super::reconciler::Reconciler;
use super::stall_detector::StallDetector;

/// Which channel produced an accepted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Push,
    Pull(PullKind),
}

/// Why a pull fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullKind {
    /// Immediate fetch after a push fault.
    Probe,
    /// Scheduled fetch from the fallback loop.
    Fallback,
}

impl PullKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Fallback => "fallback",
        }
    }
}

/// Channel state owned by the session task.
///
/// The fallback timer only exists inside `PushAndFallback`, so the loop
/// cannot be started twice.
enum Link {
    Connecting,
    PushOnly,
    PushAndFallback { fallback: Interval },
}

impl Link {
    fn phase(&self) -> SessionPhase {
        match self {
            Self::Connecting => SessionPhase::Connecting,
            Self::PushOnly => SessionPhase::LivePushOnly,
            Self::PushAndFallback { .. } => SessionPhase::LivePushAndFallback,
        }
    }

    fn has_fallback(&self) -> bool {
        matches!(self, Self::PushAndFallback { .. })
    }
}

/// One iteration's worth of input to the session loop.
enum Step {
    Cancelled,
    Push(Option<PushEvent>),
    Pulled(std::result::Result<(PullKind, Result<StatusUpdate>), JoinError>),
    StallCheck,
    FallbackTick,
}

/// Whether the loop keeps running after a step.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// State shared between a session task and its handles.
struct Shared {
    job_id: String,
    session_id: String,
    view_tx: watch::Sender<SessionView>,
    cancel: CancellationToken,
    /// Cancelled by the task after teardown has released every resource.
    done: CancellationToken,
}

impl Shared {
    /// Apply `update` to the published view unless it is already terminated.
    fn publish(&self, update: impl FnOnce(&mut SessionView)) -> bool {
        self.view_tx.send_if_modified(|view| {
            if view.is_terminated() {
                return false;
            }
            update(view);
            true
        })
    }

    fn mark_terminated(&self) -> bool {
        self.publish(|view| view.phase = SessionPhase::Terminated)
    }
}

/// Cancels the session when the last handle goes away.
struct HandleGuard {
    shared: Arc<Shared>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.shared.mark_terminated();
        self.shared.cancel.cancel();
    }
}

/// Caller's handle to a running sync session.
///
/// Clones share the session; dropping the last clone stops it.
#[derive(Clone)]
pub struct SyncHandle {
    guard: Arc<HandleGuard>,
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("job_id", &self.shared().job_id)
            .field("session_id", &self.shared().session_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SyncHandle {
    fn shared(&self) -> &Shared {
        &self.guard.shared
    }

    /// Job this session follows.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.shared().job_id
    }

    /// Unique id of this session, used in log spans.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.shared().session_id
    }

    /// Copy of the currently published view.
    #[must_use]
    pub fn view(&self) -> SessionView {
        self.shared().view_tx.borrow().clone()
    }

    /// Copy of the currently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.shared().view_tx.borrow().snapshot.clone()
    }

    /// Current state machine phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.shared().view_tx.borrow().phase
    }

    /// Whether the session has reached `Terminated`.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.phase() == SessionPhase::Terminated
    }

    /// Receiver notified on every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.shared().view_tx.subscribe()
    }

    /// Wait until the session reaches `Terminated` and return the final view.
    pub async fn wait_terminated(&self) -> SessionView {
        let mut rx = self.subscribe();
        let view = match rx.wait_for(SessionView::is_terminated).await {
            Ok(view) => view.clone(),
            // The sender lives in `Shared`, which this handle keeps alive.
            Err(_) => self.view(),
        };
        view
    }

    /// Wait until the session task has closed its channels and timers.
    pub async fn closed(&self) {
        self.shared().done.cancelled().await;
    }

    /// Whether the session task has released all of its resources.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared().done.is_cancelled()
    }

    /// Terminate the session now.
    ///
    /// The published phase becomes `Terminated` before this returns; the
    /// task then closes the push channel, drops both timers, and aborts any
    /// in-flight pull. Calling `stop` again is a no-op.
    pub fn stop(&self) {
        let shared = self.shared();
        if shared.mark_terminated() {
            info!(job_id = %shared.job_id, session_id = %shared.session_id, "sync session stopped by caller");
        }
        shared.cancel.cancel();
    }
}

/// Sync session builder.
///
/// Call [`spawn`](Self::spawn) to open the push channel and start the task.
pub struct SyncSession {
    job_id: String,
    push: Arc<dyn PushSource>,
    pull: Arc<dyn PullSource>,
    timing: TimingConfig,
}

impl SyncSession {
    /// Construct a session for `job_id` (does not connect yet).
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        push: Arc<dyn PushSource>,
        pull: Arc<dyn PullSource>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            push,
            pull,
            timing,
        }
    }

    /// Open the push channel, spawn the session task, and return its handle.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> SyncHandle {
        let session_id = Uuid::new_v4().to_string();
        let (view_tx, _) = watch::channel(SessionView::default());
        let shared = Arc::new(Shared {
            job_id: self.job_id.clone(),
            session_id: session_id.clone(),
            view_tx,
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        });

        let span = info_span!("sync_session", job_id = %self.job_id, session_id = %session_id);
        let push = span.in_scope(|| self.push.open(&self.job_id));
        let now = Instant::now();

        let task = SessionTask {
            job_id: self.job_id,
            push,
            pull: self.pull,
            fallback_interval: self.timing.fallback_interval(),
            reconciler: Reconciler::new(now),
            detector: StallDetector::new(
                self.timing.stall_check_interval(),
                self.timing.stall_threshold(),
                now,
            ),
            link: Link::Connecting,
            pulls: JoinSet::new(),
            shared: Arc::clone(&shared),
        };

        tokio::spawn(task.run().instrument(span));

        SyncHandle {
            guard: Arc::new(HandleGuard { shared }),
        }
    }
}

/// Everything the session task owns.
struct SessionTask {
    job_id: String,
    push: PushChannel,
    pull: Arc<dyn PullSource>,
    fallback_interval: Duration,
    reconciler: Reconciler,
    detector: StallDetector,
    link: Link,
    pulls: JoinSet<(PullKind, Result<StatusUpdate>)>,
    shared: Arc<Shared>,
}

impl SessionTask {
    async fn run(mut self) {
        debug!("sync session started");

        loop {
            let step = tokio::select! {
                biased;

                () = self.shared.cancel.cancelled() => Step::Cancelled,

                event = self.push.recv(), if !self.push.is_closed() => Step::Push(event),

                Some(joined) = self.pulls.join_next(), if !self.pulls.is_empty() => Step::Pulled(joined),

                () = self.detector.tick() => Step::StallCheck,

                () = Self::fallback_tick(&mut self.link) => Step::FallbackTick,
            };

            if self.handle(step) == Flow::Stop {
                break;
            }
        }

        self.teardown();
    }

    /// Resolves on the next fallback tick; pending forever without fallback.
    async fn fallback_tick(link: &mut Link) {
        match link {
            Link::PushAndFallback { fallback } => {
                fallback.tick().await;
            }
            Link::Connecting | Link::PushOnly => std::future::pending().await,
        }
    }

    fn handle(&mut self, step: Step) -> Flow {
        match step {
            Step::Cancelled => {
                debug!("sync session cancelled");
                Flow::Stop
            }
            Step::Push(Some(PushEvent::Update(update))) => self.accept(&update, Origin::Push),
            Step::Push(Some(PushEvent::Fault(reason))) => {
                self.on_push_fault(&reason);
                Flow::Continue
            }
            Step::Push(None) => {
                self.on_push_fault("push stream ended");
                Flow::Continue
            }
            Step::Pulled(Ok((kind, Ok(update)))) => self.accept(&update, Origin::Pull(kind)),
            Step::Pulled(Ok((kind, Err(err)))) => {
                warn!(
                    job_id = %self.job_id,
                    kind = kind.as_str(),
                    error = %err,
                    "pull fetch failed; retrying on next fallback tick"
                );
                Flow::Continue
            }
            Step::Pulled(Err(err)) => {
                if !err.is_cancelled() {
                    warn!(job_id = %self.job_id, error = %err, "pull task panicked");
                }
                Flow::Continue
            }
            Step::StallCheck => {
                self.check_stall();
                Flow::Continue
            }
            Step::FallbackTick => {
                self.spawn_pull(PullKind::Fallback);
                Flow::Continue
            }
        }
    }

    /// Merge an update, publish it, and report whether the job is done.
    fn accept(&mut self, update: &StatusUpdate, origin: Origin) -> Flow {
        let snapshot = self.reconciler.apply(update, Instant::now()).clone();
        if matches!(self.link, Link::Connecting) {
            self.link = Link::PushOnly;
        }

        let terminal = snapshot.is_terminal();
        let phase = if terminal {
            SessionPhase::Terminated
        } else {
            self.link.phase()
        };
        let last_update_at = self.reconciler.last_update_at();

        let published = self.shared.publish(|view| {
            view.snapshot = snapshot;
            view.phase = phase;
            view.last_update_at = last_update_at;
            match origin {
                Origin::Push => view.push_updates += 1,
                Origin::Pull(_) => view.pull_updates += 1,
            }
        });

        if !published {
            debug!(?origin, "update arrived after termination; discarded");
            return Flow::Stop;
        }

        debug!(
            ?origin,
            status = %self.reconciler.snapshot().status,
            progress = self.reconciler.snapshot().progress,
            "status merged"
        );

        if terminal {
            info!(
                job_id = %self.job_id,
                status = %self.reconciler.snapshot().status,
                "job reached terminal status"
            );
            return Flow::Stop;
        }
        Flow::Continue
    }

    fn on_push_fault(&mut self, reason: &str) {
        warn!(job_id = %self.job_id, reason, "push channel fault; probing and starting fallback");
        self.push.close();
        self.spawn_pull(PullKind::Probe);
        self.start_fallback();
    }

    fn check_stall(&mut self) {
        if self.link.has_fallback() {
            return;
        }
        let status = self.reconciler.snapshot().status;
        let last_update = self.reconciler.last_update();
        let now = Instant::now();
        if self.detector.is_stalled(status, last_update, now) {
            info!(
                job_id = %self.job_id,
                idle_ms = u64::try_from(now.saturating_duration_since(last_update).as_millis())
                    .unwrap_or(u64::MAX),
                threshold_ms = u64::try_from(self.detector.threshold().as_millis())
                    .unwrap_or(u64::MAX),
                "push channel stalled; starting pull fallback"
            );
            self.start_fallback();
        }
    }

    /// Enter `PushAndFallback`; the first scheduled fetch is one interval out.
    fn start_fallback(&mut self) {
        if self.link.has_fallback() {
            return;
        }
        let mut fallback = interval_at(
            Instant::now() + self.fallback_interval,
            self.fallback_interval,
        );
        fallback.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.link = Link::PushAndFallback { fallback };
        self.shared
            .publish(|view| view.phase = SessionPhase::LivePushAndFallback);
    }

    fn spawn_pull(&mut self, kind: PullKind) {
        debug!(kind = kind.as_str(), "issuing pull fetch");
        let pull = Arc::clone(&self.pull);
        let job_id = self.job_id.clone();
        self.pulls.spawn(
            async move {
                let result = pull.fetch(&job_id).await;
                (kind, result)
            }
            .instrument(Span::current()),
        );
    }

    /// Release the push channel, both timers, and any in-flight pulls.
    fn teardown(mut self) {
        self.push.close();
        self.pulls.abort_all();
        self.shared.mark_terminated();
        debug!("sync session torn down");
        let done = self.shared.done.clone();
        drop(self);
        done.cancel();
    }
}
