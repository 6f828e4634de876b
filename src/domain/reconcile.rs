//! The reconciliation precedence table.
//!
//! Every status change in the engine is a [`Proposal`] applied to a [`StatusCell`]. The
//! cell is the only place that writes a [`PaymentStatus`], and it applies the rules in
//! this order:
//!
//! 1. terminal lock: `success`/`failed` absorb every further proposal;
//! 2. a `PAYMENT_STATUS` channel message with a terminal status wins over everything else;
//! 3. a verification result is authoritative for terminal states, and a non-terminal
//!    result demotes `processing` back to `pending` once no other check is running;
//! 4. a user's "yes, I paid" sets `success` only if no authoritative signal arrived
//!    since the prompt opened;
//! 5. `PAYMENT_STARTED` moves `pending` to `processing` and nothing else.

use super::status::PaymentStatus;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    /// `PAYMENT_STATUS` from a trusted origin.
    ChannelStatus(PaymentStatus),
    /// `PAYMENT_STARTED` from a trusted origin.
    ChannelStarted,
    /// A manual verification call is about to hit the backend.
    VerificationStarted,
    /// The backend answered with `success: true` and this status.
    VerificationSettled(PaymentStatus),
    /// The backend answered `success: false`, or the call failed in transport or parsing.
    VerificationUnavailable { reason: String },
    /// The user answered "yes" to a confirmation prompt opened at `prompted_at`.
    UserConfirmed { prompted_at: Instant },
}

impl Proposal {
    pub fn source(&self) -> &'static str {
        match self {
            Self::ChannelStatus(_) | Self::ChannelStarted => "channel",
            Self::VerificationStarted
            | Self::VerificationSettled(_)
            | Self::VerificationUnavailable { .. } => "verification",
            Self::UserConfirmed { .. } => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    TerminalLock,
    NotPending,
    VerificationInFlight,
    SupersededByAuthoritative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Transition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    Unchanged,
    Ignored(IgnoreReason),
}

/// Single-writer holder of the reconciled status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusCell {
    status: PaymentStatus,
    last_authoritative: Option<Instant>,
    verifications_in_flight: u32,
    transitions: u32,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    pub fn verifications_in_flight(&self) -> u32 {
        self.verifications_in_flight
    }

    pub fn apply(&mut self, proposal: &Proposal, now: Instant) -> Decision {
        if self.status.is_terminal() {
            return Decision::Ignored(IgnoreReason::TerminalLock);
        }

        match proposal {
            Proposal::ChannelStatus(status) => {
                self.last_authoritative = Some(now);
                match status {
                    PaymentStatus::Success | PaymentStatus::Failed => self.move_to(*status),
                    PaymentStatus::Processing => self.start_processing(),
                    PaymentStatus::Pending => match self.status {
                        PaymentStatus::Processing if self.verifications_in_flight > 0 => {
                            Decision::Ignored(IgnoreReason::VerificationInFlight)
                        }
                        _ => self.move_to(PaymentStatus::Pending),
                    },
                }
            }
            Proposal::ChannelStarted => {
                if self.status == PaymentStatus::Pending {
                    self.move_to(PaymentStatus::Processing)
                } else {
                    Decision::Ignored(IgnoreReason::NotPending)
                }
            }
            Proposal::VerificationStarted => {
                self.verifications_in_flight += 1;
                self.start_processing()
            }
            Proposal::VerificationSettled(status) => {
                self.verifications_in_flight = self.verifications_in_flight.saturating_sub(1);
                self.last_authoritative = Some(now);
                if status.is_terminal() {
                    self.move_to(*status)
                } else {
                    self.demote()
                }
            }
            Proposal::VerificationUnavailable { .. } => {
                self.verifications_in_flight = self.verifications_in_flight.saturating_sub(1);
                self.demote()
            }
            Proposal::UserConfirmed { prompted_at } => match self.last_authoritative {
                Some(at) if at >= *prompted_at => {
                    Decision::Ignored(IgnoreReason::SupersededByAuthoritative)
                }
                _ => self.move_to(PaymentStatus::Success),
            },
        }
    }

    fn start_processing(&mut self) -> Decision {
        match self.status {
            PaymentStatus::Pending => self.move_to(PaymentStatus::Processing),
            _ => Decision::Unchanged,
        }
    }

    fn demote(&mut self) -> Decision {
        if self.verifications_in_flight > 0 {
            return Decision::Ignored(IgnoreReason::VerificationInFlight);
        }
        self.move_to(PaymentStatus::Pending)
    }

    fn move_to(&mut self, to: PaymentStatus) -> Decision {
        let from = self.status;
        if from == to {
            return Decision::Unchanged;
        }
        self.status = to;
        self.transitions += 1;
        Decision::Transition { from, to }
    }
}
