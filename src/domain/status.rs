use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};

/// Reconciled state of the payment hosted in the embedded frame.
///
/// `Success` and `Failed` are terminal: once entered they never change for the
/// lifetime of a page instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers correlating the page session with a backend transaction.
///
/// Built once from navigation parameters and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentContext {
    /// Required for verification and for the post-payment redirect.
    pub proposal_id: String,
    /// Correlation only; forwarded on redirect when present.
    pub invoice_id: Option<String>,
    /// Address loaded into the embedded frame.
    pub payment_url: String,
}

impl PaymentContext {
    pub fn new(proposal_id: impl Into<String>, payment_url: impl Into<String>) -> Self {
        Self {
            proposal_id: proposal_id.into(),
            invoice_id: None,
            payment_url: payment_url.into(),
        }
    }

    pub fn with_invoice(mut self, invoice_id: impl Into<String>) -> Self {
        self.invoice_id = Some(invoice_id.into());
        self
    }

    /// Builds a context from raw navigation parameters, rejecting a page that cannot
    /// host a payment at all.
    pub fn from_params(
        proposal_id: Option<&str>,
        invoice_id: Option<&str>,
        payment_url: Option<&str>,
    ) -> Result<Self> {
        let proposal_id = non_empty(proposal_id).ok_or(PaymentError::MissingPaymentContext("proposalId"))?;
        let payment_url = non_empty(payment_url).ok_or(PaymentError::MissingPaymentContext("paymentUrl"))?;
        Ok(Self {
            proposal_id: proposal_id.to_string(),
            invoice_id: non_empty(invoice_id).map(str::to_string),
            payment_url: payment_url.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.proposal_id.trim().is_empty() {
            return Err(PaymentError::MissingPaymentContext("proposalId"));
        }
        if self.payment_url.trim().is_empty() {
            return Err(PaymentError::MissingPaymentContext("paymentUrl"));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
        assert!(PaymentStatus::Success.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&PaymentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let status: PaymentStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, PaymentStatus::Failed);
    }

    #[test]
    fn test_context_from_params() {
        let context =
            PaymentContext::from_params(Some("P1"), Some(""), Some("https://pay.example/P1")).unwrap();
        assert_eq!(context.proposal_id, "P1");
        assert_eq!(context.invoice_id, None);
    }

    #[test]
    fn test_context_missing_fields() {
        assert!(matches!(
            PaymentContext::from_params(None, None, Some("https://pay.example/P1")),
            Err(PaymentError::MissingPaymentContext("proposalId"))
        ));
        assert!(matches!(
            PaymentContext::from_params(Some("P1"), None, Some("  ")),
            Err(PaymentError::MissingPaymentContext("paymentUrl"))
        ));
    }
}
