use super::scope::TaskScope;
use crate::config::EngineConfig;
use crate::domain::ports::NavigatorRef;
use crate::domain::reconcile::{Decision, Proposal, StatusCell};
use crate::domain::status::{PaymentContext, PaymentStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 64;

/// What the presentation layer renders: the current status, an error slot and whether a
/// retry affordance should be offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationView {
    pub status: PaymentStatus,
    pub error: Option<String>,
    pub can_retry: bool,
    pub redirect_scheduled: bool,
}

impl Default for PresentationView {
    fn default() -> Self {
        Self {
            status: PaymentStatus::Pending,
            error: None,
            can_retry: false,
            redirect_scheduled: false,
        }
    }
}

/// Point-in-time state of the reconciler, taken after all earlier proposals were applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcilerSnapshot {
    pub status: PaymentStatus,
    pub error: Option<String>,
    pub transitions: u32,
    pub redirect_scheduled: bool,
    pub redirected: bool,
}

enum Command {
    Propose(Proposal),
    Snapshot(oneshot::Sender<ReconcilerSnapshot>),
}

/// Cloneable entry point to the reconciler. Components can only propose; the actor decides.
#[derive(Clone)]
pub struct ReconcilerHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<PresentationView>,
}

impl ReconcilerHandle {
    pub async fn propose(&self, proposal: Proposal) {
        if self.commands.send(Command::Propose(proposal)).await.is_err() {
            debug!("reconciler stopped; proposal dropped");
        }
    }

    /// Returns `None` once the page has been torn down.
    pub async fn snapshot(&self) -> Option<ReconcilerSnapshot> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command::Snapshot(reply)).await.ok()?;
        response.await.ok()
    }

    /// Last published status; may lag proposals still queued.
    pub fn status(&self) -> PaymentStatus {
        self.view.borrow().status
    }

    pub fn view(&self) -> watch::Receiver<PresentationView> {
        self.view.clone()
    }
}

/// The status reconciliation state machine.
///
/// Runs as a single task owning the [`StatusCell`]. On entering `success` it arms a one-shot
/// redirect deadline that is polled in the same loop, so the redirect can never outlive the
/// task nor fire twice.
pub struct Reconciler {
    cell: StatusCell,
    context: Arc<PaymentContext>,
    navigator: NavigatorRef,
    proposal_path: String,
    redirect_delay: Duration,
    redirect_at: Option<Instant>,
    redirected: bool,
    error: Option<String>,
    view: watch::Sender<PresentationView>,
}

impl Reconciler {
    pub fn spawn(
        context: Arc<PaymentContext>,
        config: &EngineConfig,
        navigator: NavigatorRef,
        scope: &TaskScope,
    ) -> ReconcilerHandle {
        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        let (view, view_rx) = watch::channel(PresentationView::default());
        let reconciler = Self {
            cell: StatusCell::new(),
            context,
            navigator,
            proposal_path: config.proposal_path.clone(),
            redirect_delay: config.redirect_delay(),
            redirect_at: None,
            redirected: false,
            error: None,
            view,
        };
        scope.spawn("reconciler", reconciler.run(inbox, scope.shutdown_signal()));

        ReconcilerHandle {
            commands,
            view: view_rx,
        }
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<Command>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let redirect_at = self.redirect_at;
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = sleep_until(redirect_at.unwrap_or_else(Instant::now)), if redirect_at.is_some() => {
                    self.fire_redirect();
                }
                command = inbox.recv() => match command {
                    Some(Command::Propose(proposal)) => self.apply(proposal),
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    None => break,
                },
            }
        }
        debug!(status = %self.cell.status(), "reconciler stopped");
    }

    fn apply(&mut self, proposal: Proposal) {
        let now = Instant::now();
        if matches!(proposal, Proposal::VerificationStarted) && !self.cell.status().is_terminal() {
            self.error = None;
        }

        match self.cell.apply(&proposal, now) {
            Decision::Transition { from, to } => {
                info!(source = proposal.source(), %from, %to, "payment status changed");
                self.enter(to, now);
            }
            Decision::Unchanged => {
                debug!(source = proposal.source(), ?proposal, "proposal left status unchanged");
            }
            Decision::Ignored(reason) => {
                debug!(source = proposal.source(), ?proposal, ?reason, "proposal ignored");
            }
        }

        if let Proposal::VerificationUnavailable { reason } = &proposal
            && !self.cell.status().is_terminal()
        {
            self.error = Some(format!(
                "We could not confirm your payment yet ({reason}). Please check again in a moment."
            ));
        }

        self.publish();
    }

    fn enter(&mut self, status: PaymentStatus, now: Instant) {
        match status {
            PaymentStatus::Success => {
                self.error = None;
                if self.redirect_at.is_none() && !self.redirected {
                    self.redirect_at = Some(now + self.redirect_delay);
                    info!(
                        proposal_id = %self.context.proposal_id,
                        delay_ms = self.redirect_delay.as_millis() as u64,
                        "payment succeeded; redirect scheduled"
                    );
                }
            }
            PaymentStatus::Failed => {
                warn!(proposal_id = %self.context.proposal_id, "payment failed");
                self.error = Some("The payment did not go through. You can retry the payment.".to_string());
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {}
        }
    }

    fn fire_redirect(&mut self) {
        self.redirect_at = None;
        if self.redirected {
            return;
        }
        self.redirected = true;

        let mut params = BTreeMap::new();
        params.insert("proposalId".to_string(), self.context.proposal_id.clone());
        if let Some(invoice_id) = &self.context.invoice_id {
            params.insert("invoiceId".to_string(), invoice_id.clone());
        }
        info!(path = %self.proposal_path, proposal_id = %self.context.proposal_id, "redirecting");
        self.navigator.redirect(&self.proposal_path, &params);
        self.publish();
    }

    fn snapshot(&self) -> ReconcilerSnapshot {
        ReconcilerSnapshot {
            status: self.cell.status(),
            error: self.error.clone(),
            transitions: self.cell.transitions(),
            redirect_scheduled: self.redirect_at.is_some(),
            redirected: self.redirected,
        }
    }

    fn publish(&self) {
        let status = self.cell.status();
        let view = PresentationView {
            status,
            error: self.error.clone(),
            can_retry: status == PaymentStatus::Failed || (!status.is_terminal() && self.error.is_some()),
            redirect_scheduled: self.redirect_at.is_some(),
        };
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}
