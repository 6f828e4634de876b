use super::message::OutboundMessage;
use super::status::PaymentStatus;
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `data` part of a backend verification answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerificationData {
    pub status: PaymentStatus,
}

/// Backend answer to `verify(proposalId)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerificationResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<VerificationData>,
}

impl VerificationResponse {
    pub fn settled(status: PaymentStatus) -> Self {
        Self {
            success: true,
            data: Some(VerificationData { status }),
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            data: None,
        }
    }

    /// The backend status, if the backend actually vouched for one.
    pub fn status(&self) -> Option<PaymentStatus> {
        if self.success {
            self.data.as_ref().map(|d| d.status)
        } else {
            None
        }
    }
}

/// Backend status-check collaborator.
#[async_trait]
pub trait StatusVerifier: Send + Sync {
    /// Fails with `PaymentError::VerificationError` on transport or parse failure.
    async fn verify(&self, proposal_id: &str) -> Result<VerificationResponse>;
}

/// Fire-and-forget navigation.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str, params: &BTreeMap<String, String>);
}

/// Outbound side of the embedded channel.
pub trait EmbeddedChannel: Send + Sync {
    fn post(&self, message: &OutboundMessage);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptReason {
    /// The tab became visible again while the payment was processing.
    ReturnedToTab,
    /// The user has been idle for a long time while the payment is still pending.
    LongIdle,
}

impl PromptReason {
    pub fn question(self) -> &'static str {
        match self {
            Self::ReturnedToTab => "Welcome back! Did you complete your payment?",
            Self::LongIdle => "Have you finished paying in the payment window?",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Confirmed,
    Declined,
    TimedOut,
}

/// Asks the user whether the payment went through. Implementations may take arbitrarily
/// long; callers bound the wait themselves.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn ask(&self, reason: PromptReason) -> PromptOutcome;
}

/// Best-effort inspection of the embedded frame's current location.
///
/// Cross-origin isolation usually forbids this; an `Err` means the capability is absent.
pub trait FrameProbe: Send + Sync {
    fn location(&self) -> std::result::Result<String, String>;
}

pub type StatusVerifierRef = Arc<dyn StatusVerifier>;
pub type NavigatorRef = Arc<dyn Navigator>;
pub type EmbeddedChannelRef = Arc<dyn EmbeddedChannel>;
pub type ConfirmationPromptRef = Arc<dyn ConfirmationPrompt>;
pub type FrameProbeRef = Arc<dyn FrameProbe>;
