use crate::domain::tally::PageEvent;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ScriptEventKind {
    Message,
    Visible,
    Hidden,
    Click,
    Focus,
    Resize,
    Loaded,
    Check,
    Confirm,
}

/// One row of an event script: `at_ms, event, origin, payload`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptStep {
    /// Offset from the start of the replay.
    pub at_ms: u64,
    pub event: ScriptEventKind,
    pub origin: Option<String>,
    pub payload: Option<String>,
}

/// What a script step asks the page to do.
#[derive(Debug, PartialEq, Clone)]
pub enum ScriptAction {
    Message { origin: String, payload: String },
    Page(PageEvent),
    Check,
    Confirm,
}

impl ScriptStep {
    pub fn action(&self) -> Result<ScriptAction> {
        let action = match self.event {
            ScriptEventKind::Message => ScriptAction::Message {
                origin: self.origin.clone().unwrap_or_default(),
                payload: self.payload.clone().ok_or_else(|| {
                    PaymentError::MalformedMessage("message step without payload".to_string())
                })?,
            },
            ScriptEventKind::Visible => ScriptAction::Page(PageEvent::VisibilityChanged { visible: true }),
            ScriptEventKind::Hidden => ScriptAction::Page(PageEvent::VisibilityChanged { visible: false }),
            ScriptEventKind::Click => {
                let (x, y) = self.pair()?;
                ScriptAction::Page(PageEvent::Click { x, y })
            }
            ScriptEventKind::Focus => ScriptAction::Page(PageEvent::FrameFocused),
            ScriptEventKind::Resize => {
                let (width, height) = self.pair()?;
                ScriptAction::Page(PageEvent::FrameResized { width, height })
            }
            ScriptEventKind::Loaded => ScriptAction::Page(PageEvent::FrameLoaded),
            ScriptEventKind::Check => ScriptAction::Check,
            ScriptEventKind::Confirm => ScriptAction::Confirm,
        };
        Ok(action)
    }

    /// Parses a `"<a> <b>"` payload, used for click coordinates and frame sizes.
    fn pair(&self) -> Result<(f64, f64)> {
        let raw = self.payload.as_deref().unwrap_or_default();
        let mut parts = raw.split_whitespace().map(str::parse::<f64>);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Ok(a)), Some(Ok(b)), None) => Ok((a, b)),
            _ => Err(PaymentError::MalformedMessage(format!(
                "expected two numbers, got {raw:?}"
            ))),
        }
    }
}

/// Reads event script steps from a CSV source.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the steps; a bad row yields an error and reading continues.
    pub fn steps(self) -> impl Iterator<Item = Result<ScriptStep>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
