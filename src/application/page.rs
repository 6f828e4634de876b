use super::heuristics::{
    CollectorDeps, ConfirmationRouter, HeuristicCollectors, PromptGate, SharedTally,
};
use super::listener::{EmbeddedChannelListener, MessageDisposition};
use super::reconciler::{PresentationView, Reconciler, ReconcilerHandle, ReconcilerSnapshot};
use super::scope::TaskScope;
use super::verification::{ManualVerificationClient, VerificationReport};
use crate::config::EngineConfig;
use crate::domain::message::OriginAllowList;
use crate::domain::ports::{
    ConfirmationPromptRef, EmbeddedChannelRef, FrameProbeRef, NavigatorRef, StatusVerifierRef,
};
use crate::domain::status::{PaymentContext, PaymentStatus};
use crate::domain::tally::{FrameRect, InteractionTally, PageEvent};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tokio::time::Instant;
use tracing::info;

/// External collaborators of a payment page.
#[derive(Clone)]
pub struct PagePorts {
    pub verifier: StatusVerifierRef,
    pub navigator: NavigatorRef,
    pub channel: EmbeddedChannelRef,
    pub prompt: ConfirmationPromptRef,
    pub probe: Option<FrameProbeRef>,
}

/// One mounted instance of the "pay" page's reconciliation engine.
///
/// Mounting validates the context, spawns the reconciler and the timer-driven collectors
/// inside a fresh [`TaskScope`]. Every exit path releases that scope: [`PaymentPage::unmount`]
/// joins the tasks, dropping the page aborts them.
pub struct PaymentPage {
    context: Arc<PaymentContext>,
    config: Arc<EngineConfig>,
    ports: PagePorts,
    frame: FrameRect,
    scope: Arc<TaskScope>,
    reconciler: ReconcilerHandle,
    listener: EmbeddedChannelListener,
    verification: ManualVerificationClient,
    router: Arc<ConfirmationRouter>,
    collectors: HeuristicCollectors,
    tally: SharedTally,
}

impl PaymentPage {
    pub fn mount(
        context: PaymentContext,
        frame: FrameRect,
        config: EngineConfig,
        ports: PagePorts,
    ) -> Result<Self> {
        context.validate()?;
        config.validate()?;
        Ok(Self::mount_validated(
            Arc::new(context),
            Arc::new(config),
            ports,
            frame,
        ))
    }

    fn mount_validated(
        context: Arc<PaymentContext>,
        config: Arc<EngineConfig>,
        ports: PagePorts,
        frame: FrameRect,
    ) -> Self {
        let scope = Arc::new(TaskScope::new());
        let reconciler =
            Reconciler::spawn(context.clone(), &config, ports.navigator.clone(), &scope);

        let listener = EmbeddedChannelListener::new(
            OriginAllowList::new(config.trusted_origins.iter().cloned()),
            config.host_origin.clone(),
            ports.channel.clone(),
            reconciler.clone(),
        );
        let verification = ManualVerificationClient::new(
            &context.proposal_id,
            ports.verifier.clone(),
            reconciler.clone(),
            config.verification_retry_delay(),
            scope.clone(),
        );
        let router = Arc::new(ConfirmationRouter::new(
            config.confirmation_policy,
            reconciler.clone(),
            verification.clone(),
        ));
        let gate = Arc::new(PromptGate::new(
            ports.prompt.clone(),
            config.prompt_window(),
            config.prompt_cooldown(),
        ));
        let tally: SharedTally = Arc::new(RwLock::new(InteractionTally::new(Instant::now())));

        let collectors = HeuristicCollectors::new(
            &config,
            CollectorDeps {
                reconciler: reconciler.clone(),
                gate,
                router: router.clone(),
                tally: tally.clone(),
                scope: scope.clone(),
                frame,
                probe: ports.probe.clone(),
            },
        );
        collectors.start(&scope);

        info!(
            proposal_id = %context.proposal_id,
            payment_url = %context.payment_url,
            "payment page mounted"
        );

        Self {
            context,
            config,
            ports,
            frame,
            scope,
            reconciler,
            listener,
            verification,
            router,
            collectors,
            tally,
        }
    }

    pub fn context(&self) -> &PaymentContext {
        &self.context
    }

    /// Feeds one cross-origin message event into the page.
    pub async fn post_message(&self, origin: &str, payload: &str) -> MessageDisposition {
        self.listener.on_message(origin, payload).await
    }

    /// Feeds one ambient browser event into the page.
    pub async fn dispatch(&self, event: PageEvent) {
        if event == PageEvent::FrameLoaded {
            self.listener.announce_ready();
        }
        self.collectors.dispatch(&event).await;
    }

    /// The manual-check trigger exposed to the presentation layer.
    pub async fn check_payment(&self) -> VerificationReport {
        self.verification.check().await
    }

    /// Explicit "I have paid" from the user, outside of any prompt.
    pub async fn confirm_paid(&self) {
        self.router.confirmed(Instant::now()).await;
    }

    pub fn status(&self) -> PaymentStatus {
        self.reconciler.status()
    }

    pub fn view(&self) -> watch::Receiver<PresentationView> {
        self.reconciler.view()
    }

    pub async fn snapshot(&self) -> Option<ReconcilerSnapshot> {
        self.reconciler.snapshot().await
    }

    pub async fn tally(&self) -> InteractionTally {
        *self.tally.read().await
    }

    pub fn interaction_elevated(&self) -> bool {
        self.collectors.interaction_elevated()
    }

    pub fn frame_resizes(&self) -> u64 {
        self.collectors.frame_resizes()
    }

    /// Retry path offered after a failure: this page instance is torn down and a fresh
    /// session for the same context is mounted and verified.
    pub async fn retry(self) -> (Self, VerificationReport) {
        let context = self.context.clone();
        let config = self.config.clone();
        let ports = self.ports.clone();
        let frame = self.frame;
        self.unmount().await;

        let page = Self::mount_validated(context, config, ports, frame);
        let report = page.check_payment().await;
        (page, report)
    }

    /// Releases every timer, poller and listener of this page instance.
    pub async fn unmount(self) {
        self.scope.close().await;
        info!(proposal_id = %self.context.proposal_id, "payment page unmounted");
    }
}

impl Drop for PaymentPage {
    fn drop(&mut self) {
        if !self.scope.is_closed() {
            self.scope.abort();
        }
    }
}
