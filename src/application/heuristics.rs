//! Heuristic signal collectors.
//!
//! Each collector observes ambient page behaviour and may at most *suggest* that the payment
//! finished, by asking the user. None of them writes the payment status: a "yes" answer goes
//! through the [`ConfirmationRouter`], which proposes it to the reconciler like any other
//! signal. Any collector can be disabled without affecting correctness.

use super::reconciler::ReconcilerHandle;
use super::scope::TaskScope;
use super::verification::ManualVerificationClient;
use crate::config::{ConfirmationPolicy, EngineConfig};
use crate::domain::ports::{ConfirmationPromptRef, FrameProbeRef, PromptOutcome, PromptReason};
use crate::domain::reconcile::Proposal;
use crate::domain::status::PaymentStatus;
use crate::domain::tally::{FrameRect, InteractionTally, PageEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

pub type SharedTally = Arc<RwLock<InteractionTally>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptAnswer {
    pub outcome: PromptOutcome,
    pub prompted_at: Instant,
}

#[derive(Default)]
struct GateState {
    in_flight: bool,
    last_prompt: Option<Instant>,
}

/// Serializes confirmation prompts: one open prompt at a time, a cooldown between prompts,
/// and a bounded wait that turns into [`PromptOutcome::TimedOut`].
pub struct PromptGate {
    prompt: ConfirmationPromptRef,
    window: Duration,
    cooldown: Duration,
    state: Mutex<GateState>,
}

impl PromptGate {
    pub fn new(prompt: ConfirmationPromptRef, window: Duration, cooldown: Duration) -> Self {
        Self {
            prompt,
            window,
            cooldown,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Returns `None` when the gate refused to prompt.
    pub async fn ask(&self, reason: PromptReason) -> Option<PromptAnswer> {
        let prompted_at = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            if state.in_flight {
                debug!(?reason, "prompt already open");
                return None;
            }
            if let Some(last) = state.last_prompt
                && now.duration_since(last) < self.cooldown
            {
                debug!(?reason, "prompt suppressed by cooldown");
                return None;
            }
            state.in_flight = true;
            state.last_prompt = Some(now);
            now
        };

        let outcome = tokio::time::timeout(self.window, self.prompt.ask(reason))
            .await
            .unwrap_or(PromptOutcome::TimedOut);
        self.state.lock().await.in_flight = false;

        info!(?reason, ?outcome, "confirmation prompt closed");
        Some(PromptAnswer {
            outcome,
            prompted_at,
        })
    }

    pub async fn last_prompt(&self) -> Option<Instant> {
        self.state.lock().await.last_prompt
    }
}

/// Turns a user's answer into a proposal according to the configured policy.
pub struct ConfirmationRouter {
    policy: ConfirmationPolicy,
    reconciler: ReconcilerHandle,
    verification: ManualVerificationClient,
}

impl ConfirmationRouter {
    pub fn new(
        policy: ConfirmationPolicy,
        reconciler: ReconcilerHandle,
        verification: ManualVerificationClient,
    ) -> Self {
        Self {
            policy,
            reconciler,
            verification,
        }
    }

    pub async fn route(&self, answer: PromptAnswer) {
        match answer.outcome {
            PromptOutcome::Confirmed => self.confirmed(answer.prompted_at).await,
            PromptOutcome::Declined => info!("user reports the payment is not finished"),
            PromptOutcome::TimedOut => debug!("confirmation prompt went unanswered"),
        }
    }

    /// The user asserts the payment went through; `prompted_at` is when they were asked.
    pub async fn confirmed(&self, prompted_at: Instant) {
        match self.policy {
            ConfirmationPolicy::AcceptAsSuccess => {
                self.reconciler
                    .propose(Proposal::UserConfirmed { prompted_at })
                    .await;
            }
            ConfirmationPolicy::VerifyFirst => {
                let report = self.verification.check().await;
                debug!(?report, "user confirmation verified against backend");
            }
        }
    }
}

/// Prompts when the tab becomes visible again while the payment is processing.
pub struct VisibilityObserver {
    debounce: Duration,
    generation: Arc<AtomicU64>,
    reconciler: ReconcilerHandle,
    gate: Arc<PromptGate>,
    router: Arc<ConfirmationRouter>,
    scope: Arc<TaskScope>,
}

impl VisibilityObserver {
    pub fn on_event(&self, event: &PageEvent) {
        let PageEvent::VisibilityChanged { visible } = event else {
            return;
        };
        // Any later visibility change supersedes a pending debounce.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !visible {
            return;
        }

        let debounce = self.debounce;
        let current = self.generation.clone();
        let reconciler = self.reconciler.clone();
        let gate = self.gate.clone();
        let router = self.router.clone();
        self.scope.spawn("visibility-debounce", async move {
            tokio::time::sleep(debounce).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            if reconciler.status() != PaymentStatus::Processing {
                return;
            }
            if let Some(answer) = gate.ask(PromptReason::ReturnedToTab).await {
                router.route(answer).await;
            }
        });
    }
}

/// Prompts when nothing happened for a long time while the payment is still pending.
pub struct IdleReturnObserver {
    threshold: Duration,
    poll_interval: Duration,
    tally: SharedTally,
    reconciler: ReconcilerHandle,
    gate: Arc<PromptGate>,
    router: Arc<ConfirmationRouter>,
}

impl IdleReturnObserver {
    pub fn start(self: Arc<Self>, scope: &TaskScope) {
        scope.spawn("idle-return", async move { self.run().await });
    }

    async fn run(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if self.reconciler.status() != PaymentStatus::Pending {
                continue;
            }

            let last_interaction = self.tally.read().await.last_interaction;
            let since = match self.gate.last_prompt().await {
                Some(prompted) if prompted > last_interaction => prompted,
                _ => last_interaction,
            };
            let idle = Instant::now().duration_since(since);
            if idle < self.threshold {
                continue;
            }

            info!(idle_secs = idle.as_secs(), "long idle while payment pending");
            if let Some(answer) = self.gate.ask(PromptReason::LongIdle).await {
                self.router.route(answer).await;
            }
        }
    }
}

/// Counts clicks inside the frame and frame focus events. Log-only: crossing the threshold
/// raises diagnostic confidence, never the status.
pub struct InteractionTallyObserver {
    frame: RwLock<FrameRect>,
    tally: SharedTally,
    threshold: u32,
    elevated: AtomicBool,
}

impl InteractionTallyObserver {
    pub async fn on_event(&self, event: &PageEvent) {
        let interactions = match event {
            PageEvent::Click { x, y } => {
                if !self.frame.read().await.contains(*x, *y) {
                    return;
                }
                let mut tally = self.tally.write().await;
                tally.record_click(Instant::now());
                tally.interactions()
            }
            PageEvent::FrameFocused => {
                let mut tally = self.tally.write().await;
                tally.record_focus(Instant::now());
                tally.interactions()
            }
            PageEvent::FrameResized { width, height } => {
                let mut frame = self.frame.write().await;
                frame.width = *width;
                frame.height = *height;
                return;
            }
            PageEvent::VisibilityChanged { .. } | PageEvent::FrameLoaded => return,
        };

        if interactions >= self.threshold && !self.elevated.swap(true, Ordering::SeqCst) {
            info!(interactions, "user is actively working in the payment frame");
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated.load(Ordering::SeqCst)
    }
}

/// Watches the frame's size and, when the capability exists, its location. Log-only.
pub struct FrameGeometryObserver {
    last_size: Mutex<Option<(f64, f64)>>,
    resizes: AtomicU64,
    probe: Option<FrameProbeRef>,
    probe_interval: Duration,
}

impl FrameGeometryObserver {
    pub async fn on_event(&self, event: &PageEvent) {
        let PageEvent::FrameResized { width, height } = event else {
            return;
        };
        let mut last = self.last_size.lock().await;
        if *last == Some((*width, *height)) {
            return;
        }
        *last = Some((*width, *height));
        let resizes = self.resizes.fetch_add(1, Ordering::SeqCst) + 1;
        info!(width, height, resizes, "payment frame resized; provider flow may have moved on");
    }

    pub fn resize_count(&self) -> u64 {
        self.resizes.load(Ordering::SeqCst)
    }

    pub fn start(&self, scope: &TaskScope) {
        let Some(probe) = self.probe.clone() else {
            debug!("frame location probing not available");
            return;
        };
        let interval = self.probe_interval;
        scope.spawn("frame-probe", async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last: Option<String> = None;
            loop {
                ticker.tick().await;
                match probe.location() {
                    Ok(location) => {
                        if last.as_deref() != Some(location.as_str()) {
                            info!(%location, "payment frame location changed");
                            last = Some(location);
                        }
                    }
                    Err(reason) => {
                        // Cross-origin isolation: expected, stop quietly.
                        debug!(%reason, "frame location not inspectable; probing stopped");
                        return;
                    }
                }
            }
        });
    }
}

/// Shared collaborators of the collectors.
pub struct CollectorDeps {
    pub reconciler: ReconcilerHandle,
    pub gate: Arc<PromptGate>,
    pub router: Arc<ConfirmationRouter>,
    pub tally: SharedTally,
    pub scope: Arc<TaskScope>,
    pub frame: FrameRect,
    pub probe: Option<FrameProbeRef>,
}

/// The enabled subset of the four collectors.
///
/// The idle-return observer reads the tally's last interaction, so clicks and focus events
/// keep it fresh even when the interaction tally collector itself is disabled.
pub struct HeuristicCollectors {
    visibility: Option<VisibilityObserver>,
    idle_return: Option<Arc<IdleReturnObserver>>,
    interactions: Option<InteractionTallyObserver>,
    geometry: Option<FrameGeometryObserver>,
    tally: SharedTally,
}

impl HeuristicCollectors {
    pub fn new(config: &EngineConfig, deps: CollectorDeps) -> Self {
        let toggles = config.collectors;
        let visibility = toggles.visibility.then(|| VisibilityObserver {
            debounce: config.visibility_debounce(),
            generation: Arc::new(AtomicU64::new(0)),
            reconciler: deps.reconciler.clone(),
            gate: deps.gate.clone(),
            router: deps.router.clone(),
            scope: deps.scope.clone(),
        });
        let idle_return = toggles.idle_return.then(|| {
            Arc::new(IdleReturnObserver {
                threshold: config.idle_threshold(),
                poll_interval: config.idle_poll_interval(),
                tally: deps.tally.clone(),
                reconciler: deps.reconciler.clone(),
                gate: deps.gate.clone(),
                router: deps.router.clone(),
            })
        });
        let interactions = toggles.interaction_tally.then(|| InteractionTallyObserver {
            frame: RwLock::new(deps.frame),
            tally: deps.tally.clone(),
            threshold: config.interaction_threshold,
            elevated: AtomicBool::new(false),
        });
        let geometry = toggles.frame_geometry.then(|| FrameGeometryObserver {
            last_size: Mutex::new(Some((deps.frame.width, deps.frame.height))),
            resizes: AtomicU64::new(0),
            probe: deps.probe.clone(),
            probe_interval: config.probe_interval(),
        });

        Self {
            visibility,
            idle_return,
            interactions,
            geometry,
            tally: deps.tally,
        }
    }

    /// Starts the timer-driven collectors inside `scope`.
    pub fn start(&self, scope: &TaskScope) {
        if let Some(idle) = &self.idle_return {
            idle.clone().start(scope);
        }
        if let Some(geometry) = &self.geometry {
            geometry.start(scope);
        }
    }

    pub async fn dispatch(&self, event: &PageEvent) {
        if let Some(visibility) = &self.visibility {
            visibility.on_event(event);
        }
        match &self.interactions {
            Some(interactions) => interactions.on_event(event).await,
            None if matches!(event, PageEvent::Click { .. } | PageEvent::FrameFocused) => {
                self.tally.write().await.touch(Instant::now());
            }
            None => {}
        }
        if let Some(geometry) = &self.geometry {
            geometry.on_event(event).await;
        }
    }

    pub fn interaction_elevated(&self) -> bool {
        self.interactions.as_ref().is_some_and(InteractionTallyObserver::is_elevated)
    }

    pub fn frame_resizes(&self) -> u64 {
        self.geometry.as_ref().map_or(0, FrameGeometryObserver::resize_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::ScriptedPrompt;

    #[tokio::test(start_paused = true)]
    async fn test_gate_times_out_unanswered_prompt() {
        let prompt = Arc::new(ScriptedPrompt::never_answers());
        let gate = PromptGate::new(prompt.clone(), Duration::from_secs(60), Duration::from_secs(30));

        let answer = gate.ask(PromptReason::LongIdle).await.unwrap();
        assert_eq!(answer.outcome, PromptOutcome::TimedOut);
        assert_eq!(prompt.asked(), vec![PromptReason::LongIdle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_cooldown_and_single_flight() {
        let prompt = Arc::new(ScriptedPrompt::answering(PromptOutcome::Declined));
        let gate = Arc::new(PromptGate::new(
            prompt.clone(),
            Duration::from_secs(60),
            Duration::from_secs(30),
        ));

        assert!(gate.ask(PromptReason::ReturnedToTab).await.is_some());
        assert!(gate.ask(PromptReason::ReturnedToTab).await.is_none());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(gate.ask(PromptReason::ReturnedToTab).await.is_some());
        assert_eq!(prompt.asked().len(), 2);

        let slow = Arc::new(ScriptedPrompt::never_answers());
        let gate = Arc::new(PromptGate::new(slow, Duration::from_secs(60), Duration::ZERO));
        let open = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.ask(PromptReason::LongIdle).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(gate.ask(PromptReason::LongIdle).await.is_none());
        assert!(open.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tally_counts_only_clicks_inside_frame() {
        let tally: SharedTally = Arc::new(RwLock::new(InteractionTally::new(Instant::now())));
        let observer = InteractionTallyObserver {
            frame: RwLock::new(FrameRect::new(0.0, 100.0, 400.0, 300.0)),
            tally: tally.clone(),
            threshold: 2,
            elevated: AtomicBool::new(false),
        };

        observer.on_event(&PageEvent::Click { x: 10.0, y: 10.0 }).await;
        assert_eq!(tally.read().await.clicks_inside_frame, 0);

        observer.on_event(&PageEvent::Click { x: 10.0, y: 150.0 }).await;
        assert!(!observer.is_elevated());
        observer.on_event(&PageEvent::FrameFocused).await;
        assert!(observer.is_elevated());

        // Growing the frame brings a previously outside point inside it.
        observer
            .on_event(&PageEvent::FrameResized {
                width: 400.0,
                height: 700.0,
            })
            .await;
        observer.on_event(&PageEvent::Click { x: 10.0, y: 750.0 }).await;

        let tally = tally.read().await;
        assert_eq!(tally.clicks_inside_frame, 2);
        assert_eq!(tally.frame_focus_count, 1);
    }

    #[tokio::test]
    async fn test_geometry_counts_distinct_sizes() {
        let observer = FrameGeometryObserver {
            last_size: Mutex::new(Some((400.0, 600.0))),
            resizes: AtomicU64::new(0),
            probe: None,
            probe_interval: Duration::from_secs(2),
        };
        for (width, height) in [(400.0, 600.0), (400.0, 900.0), (400.0, 900.0), (400.0, 300.0)] {
            observer.on_event(&PageEvent::FrameResized { width, height }).await;
        }
        assert_eq!(observer.resize_count(), 2);
    }
}
