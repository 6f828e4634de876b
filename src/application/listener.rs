use super::reconciler::ReconcilerHandle;
use crate::domain::message::{InboundMessage, OriginAllowList, OutboundMessage};
use crate::domain::ports::EmbeddedChannelRef;
use crate::domain::reconcile::Proposal;
use tracing::{debug, info, trace, warn};

/// What happened to one inbound channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Origin not on the allow-list; dropped without any effect.
    Untrusted,
    /// Trusted origin but unparsable payload.
    Malformed,
    /// Turned into a status proposal.
    Forwarded,
    /// Accepted but carries no status meaning.
    Logged,
}

/// Receives cross-origin messages from the embedded payment frame.
pub struct EmbeddedChannelListener {
    allow_list: OriginAllowList,
    host_origin: String,
    channel: EmbeddedChannelRef,
    reconciler: ReconcilerHandle,
}

impl EmbeddedChannelListener {
    pub fn new(
        allow_list: OriginAllowList,
        host_origin: impl Into<String>,
        channel: EmbeddedChannelRef,
        reconciler: ReconcilerHandle,
    ) -> Self {
        Self {
            allow_list,
            host_origin: host_origin.into(),
            channel,
            reconciler,
        }
    }

    pub async fn on_message(&self, origin: &str, payload: &str) -> MessageDisposition {
        if !self.allow_list.is_trusted(origin) {
            trace!(origin, "message from untrusted origin dropped");
            return MessageDisposition::Untrusted;
        }

        let message = match InboundMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(origin, error = %e, "malformed channel message ignored");
                return MessageDisposition::Malformed;
            }
        };

        match message {
            InboundMessage::PaymentStatus { status, data } => {
                debug!(origin, %status, has_data = data.is_some(), "payment status message");
                self.reconciler.propose(Proposal::ChannelStatus(status)).await;
                MessageDisposition::Forwarded
            }
            InboundMessage::PaymentStarted => {
                debug!(origin, "payment started message");
                self.reconciler.propose(Proposal::ChannelStarted).await;
                MessageDisposition::Forwarded
            }
            InboundMessage::ChannelReady => {
                info!(origin, "payment frame reported ready");
                MessageDisposition::Logged
            }
            InboundMessage::Unknown { kind, raw } => {
                debug!(origin, kind = %kind, %raw, "unrecognized channel message");
                MessageDisposition::Logged
            }
        }
    }

    /// Best-effort handshake sent when the embedded content has loaded.
    pub fn announce_ready(&self) {
        let message = OutboundMessage::ParentReady {
            origin: self.host_origin.clone(),
        };
        debug!(origin = %self.host_origin, "sending PARENT_READY");
        self.channel.post(&message);
    }
}
