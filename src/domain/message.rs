use super::status::PaymentStatus;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message received from the embedded payment frame, after origin authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `PAYMENT_STATUS`: authoritative when terminal, advisory otherwise.
    PaymentStatus {
        status: PaymentStatus,
        data: Option<Value>,
    },
    /// `PAYMENT_STARTED`: the user began the provider flow.
    PaymentStarted,
    /// `IFRAME_LOADED`: the provider content announced itself.
    ChannelReady,
    /// Any other `type`; kept for diagnostics only.
    Unknown { kind: String, raw: Value },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

impl InboundMessage {
    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| PaymentError::MalformedMessage(format!("not JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawMessage = serde_json::from_value(value.clone())
            .map_err(|e| PaymentError::MalformedMessage(e.to_string()))?;

        match raw.kind.as_str() {
            "PAYMENT_STATUS" => {
                let status = raw.status.ok_or_else(|| {
                    PaymentError::MalformedMessage("PAYMENT_STATUS without status".to_string())
                })?;
                let status: PaymentStatus = serde_json::from_value(status)
                    .map_err(|e| PaymentError::MalformedMessage(format!("bad status: {e}")))?;
                Ok(Self::PaymentStatus {
                    status,
                    data: raw.data,
                })
            }
            "PAYMENT_STARTED" => Ok(Self::PaymentStarted),
            "IFRAME_LOADED" => Ok(Self::ChannelReady),
            _ => Ok(Self::Unknown {
                kind: raw.kind,
                raw: value,
            }),
        }
    }
}

/// Messages the host posts into the embedded channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    ParentReady { origin: String },
}

/// Fixed set of trusted provider origin prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAllowList {
    prefixes: Vec<String>,
}

impl OriginAllowList {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.trim().is_empty())
                .collect(),
        }
    }

    /// An origin is trusted when it starts with one of the configured prefixes. A prefix
    /// that ends in the host must be followed by a port or nothing, so `https://pay.example`
    /// does not admit `https://pay.example.evil.com`.
    pub fn is_trusted(&self, origin: &str) -> bool {
        self.prefixes.iter().any(|prefix| prefix_matches(prefix, origin))
    }
}

fn prefix_matches(prefix: &str, origin: &str) -> bool {
    let Some(rest) = origin.strip_prefix(prefix) else {
        return false;
    };
    if rest.is_empty() || !ends_in_host(prefix) {
        return true;
    }
    rest.starts_with(':') || rest.starts_with('/')
}

/// True when nothing follows the host part of `prefix`.
fn ends_in_host(prefix: &str) -> bool {
    let authority = prefix.split_once("://").map_or(prefix, |(_, rest)| rest);
    !authority.is_empty() && !authority.contains(['/', ':'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_payment_status() {
        let msg =
            InboundMessage::parse(r#"{"type":"PAYMENT_STATUS","status":"success","data":{"ref":"x"}}"#)
                .unwrap();
        assert_eq!(
            msg,
            InboundMessage::PaymentStatus {
                status: PaymentStatus::Success,
                data: Some(json!({"ref": "x"})),
            }
        );
    }

    #[test]
    fn test_parse_started_and_loaded() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"PAYMENT_STARTED"}"#).unwrap(),
            InboundMessage::PaymentStarted
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"IFRAME_LOADED"}"#).unwrap(),
            InboundMessage::ChannelReady
        );
    }

    #[test]
    fn test_parse_unknown_kind_is_kept() {
        let msg = InboundMessage::parse(r#"{"type":"RESIZE","height":420}"#).unwrap();
        match msg {
            InboundMessage::Unknown { kind, raw } => {
                assert_eq!(kind, "RESIZE");
                assert_eq!(raw["height"], 420);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_malformed() {
        for payload in [
            "not json",
            r#"{"status":"success"}"#,
            r#"{"type":"PAYMENT_STATUS"}"#,
            r#"{"type":"PAYMENT_STATUS","status":"refunded"}"#,
            r#"["PAYMENT_STATUS"]"#,
        ] {
            assert!(
                matches!(InboundMessage::parse(payload), Err(PaymentError::MalformedMessage(_))),
                "payload should be rejected: {payload}"
            );
        }
    }

    #[test]
    fn test_outbound_handshake_shape() {
        let msg = OutboundMessage::ParentReady {
            origin: "https://app.example".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "PARENT_READY", "origin": "https://app.example"})
        );
    }

    #[test]
    fn test_allow_list() {
        let allow = OriginAllowList::new(["https://pay.example", ""]);
        assert!(allow.is_trusted("https://pay.example"));
        assert!(allow.is_trusted("https://pay.example:8443"));
        assert!(!allow.is_trusted("https://evil.example"));
        assert!(!allow.is_trusted(""));
    }

    #[test]
    fn test_host_prefix_rejects_lookalike_domains() {
        let allow = OriginAllowList::new(["https://pay.example", "https://checkout.example/"]);
        assert!(!allow.is_trusted("https://pay.example.evil.com"));
        assert!(!allow.is_trusted("https://pay.examples.net"));
        assert!(allow.is_trusted("https://pay.example/embed"));
        assert!(allow.is_trusted("https://checkout.example/session/1"));
        assert!(!allow.is_trusted("https://checkout.example.evil.com"));
    }
}
