use super::reconciler::ReconcilerHandle;
use super::scope::TaskScope;
use crate::domain::ports::StatusVerifierRef;
use crate::domain::reconcile::Proposal;
use crate::domain::status::PaymentStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Outcome of one manual verification, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationReport {
    /// No proposal id; nothing was sent to the backend.
    Skipped,
    /// The backend vouched for a terminal status.
    Settled(PaymentStatus),
    /// The backend knows the payment but it is not finished yet.
    StillPending(PaymentStatus),
    /// The backend declined to answer or could not be reached.
    Unavailable(String),
}

/// On-demand authoritative status check against the backend.
///
/// Never fails past its own boundary: every error ends up as a `pending` retry state and an
/// [`VerificationReport::Unavailable`] for the caller.
///
/// Each check runs as a task of the page scope, so a caller that stops waiting does not cut
/// it short: the started check always reports its result, which keeps the reconciler's count
/// of running checks balanced.
#[derive(Clone)]
pub struct ManualVerificationClient {
    proposal_id: Arc<str>,
    verifier: StatusVerifierRef,
    reconciler: ReconcilerHandle,
    retry_delay: Duration,
    scope: Arc<TaskScope>,
}

impl ManualVerificationClient {
    pub fn new(
        proposal_id: &str,
        verifier: StatusVerifierRef,
        reconciler: ReconcilerHandle,
        retry_delay: Duration,
        scope: Arc<TaskScope>,
    ) -> Self {
        Self {
            proposal_id: Arc::from(proposal_id),
            verifier,
            reconciler,
            retry_delay,
            scope,
        }
    }

    pub async fn check(&self) -> VerificationReport {
        if self.proposal_id.trim().is_empty() {
            debug!("no proposal id; verification skipped");
            return VerificationReport::Skipped;
        }

        let (reply, report) = oneshot::channel();
        let client = self.clone();
        let started = self.scope.spawn("verification", async move {
            let _ = reply.send(client.run().await);
        });
        if !started {
            return page_closed();
        }
        report.await.unwrap_or_else(|_| page_closed())
    }

    async fn run(&self) -> VerificationReport {
        self.reconciler.propose(Proposal::VerificationStarted).await;

        let report = match self.verifier.verify(&self.proposal_id).await {
            Ok(response) => match response.status() {
                Some(status) if status.is_terminal() => {
                    info!(proposal_id = %self.proposal_id, %status, "backend confirmed payment outcome");
                    self.reconciler.propose(Proposal::VerificationSettled(status)).await;
                    return VerificationReport::Settled(status);
                }
                Some(status) => {
                    debug!(proposal_id = %self.proposal_id, %status, "payment not finished yet");
                    VerificationReport::StillPending(status)
                }
                None => VerificationReport::Unavailable("the backend could not confirm the payment".to_string()),
            },
            Err(e) => {
                warn!(proposal_id = %self.proposal_id, error = %e, "verification call failed");
                VerificationReport::Unavailable(e.to_string())
            }
        };

        let demotion = match &report {
            VerificationReport::StillPending(status) => Some(Proposal::VerificationSettled(*status)),
            VerificationReport::Unavailable(reason) => Some(Proposal::VerificationUnavailable {
                reason: reason.clone(),
            }),
            VerificationReport::Skipped | VerificationReport::Settled(_) => None,
        };
        if let Some(proposal) = demotion {
            tokio::time::sleep(self.retry_delay).await;
            self.reconciler.propose(proposal).await;
        }
        report
    }
}

fn page_closed() -> VerificationReport {
    VerificationReport::Unavailable("the payment page is closed".to_string())
}
