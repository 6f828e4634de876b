use crate::domain::message::OutboundMessage;
use crate::domain::ports::{
    ConfirmationPrompt, EmbeddedChannel, FrameProbe, Navigator, PromptOutcome, PromptReason,
    StatusVerifier, VerificationResponse,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One backend answer, or a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedAnswer {
    Respond(VerificationResponse),
    Fail(String),
}

/// Backend double answering from a script, then repeating a fallback answer.
pub struct ScriptedVerifier {
    script: tokio::sync::Mutex<VecDeque<ScriptedAnswer>>,
    fallback: ScriptedAnswer,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn new<I>(script: I, fallback: ScriptedAnswer) -> Self
    where
        I: IntoIterator<Item = ScriptedAnswer>,
    {
        Self {
            script: tokio::sync::Mutex::new(script.into_iter().collect()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(answer: ScriptedAnswer) -> Self {
        Self::new([], answer)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusVerifier for ScriptedVerifier {
    async fn verify(&self, _proposal_id: &str) -> Result<VerificationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let answer = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match answer {
            ScriptedAnswer::Respond(response) => Ok(response),
            ScriptedAnswer::Fail(reason) => Err(PaymentError::VerificationError(reason)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub path: String,
    pub params: BTreeMap<String, String>,
}

/// Navigator that only records where it was sent.
#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<Redirect>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<Redirect> {
        lock(&self.redirects).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str, params: &BTreeMap<String, String>) {
        lock(&self.redirects).push(Redirect {
            path: path.to_string(),
            params: params.clone(),
        });
    }
}

/// Outbound channel that records every posted message.
#[derive(Default)]
pub struct RecordingChannel {
    posted: Mutex<Vec<OutboundMessage>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posted(&self) -> Vec<OutboundMessage> {
        lock(&self.posted).clone()
    }
}

impl EmbeddedChannel for RecordingChannel {
    fn post(&self, message: &OutboundMessage) {
        lock(&self.posted).push(message.clone());
    }
}

/// Prompt double. Answers from a script, then with the fallback; a `None` fallback leaves
/// the prompt open forever. `think_time` delays every answer.
pub struct ScriptedPrompt {
    script: Mutex<VecDeque<PromptOutcome>>,
    fallback: Option<PromptOutcome>,
    think_time: Duration,
    asked: Mutex<Vec<PromptReason>>,
}

impl ScriptedPrompt {
    pub fn new<I>(script: I, fallback: Option<PromptOutcome>) -> Self
    where
        I: IntoIterator<Item = PromptOutcome>,
    {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            think_time: Duration::ZERO,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(outcome: PromptOutcome) -> Self {
        Self::new([], Some(outcome))
    }

    pub fn answering_after(outcome: PromptOutcome, think_time: Duration) -> Self {
        Self {
            think_time,
            ..Self::answering(outcome)
        }
    }

    pub fn never_answers() -> Self {
        Self::new([], None)
    }

    pub fn asked(&self) -> Vec<PromptReason> {
        lock(&self.asked).clone()
    }
}

#[async_trait]
impl ConfirmationPrompt for ScriptedPrompt {
    async fn ask(&self, reason: PromptReason) -> PromptOutcome {
        lock(&self.asked).push(reason);
        let scripted = lock(&self.script).pop_front();
        if !self.think_time.is_zero() {
            tokio::time::sleep(self.think_time).await;
        }
        match scripted.or(self.fallback) {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }
}

/// Frame probe replaying a list of observations; an exhausted script behaves like a
/// cross-origin frame.
pub struct ScriptedProbe {
    observations: Mutex<VecDeque<std::result::Result<String, String>>>,
}

impl ScriptedProbe {
    pub fn new<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<String, String>>,
    {
        Self {
            observations: Mutex::new(observations.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        lock(&self.observations).len()
    }
}

impl FrameProbe for ScriptedProbe {
    fn location(&self) -> std::result::Result<String, String> {
        lock(&self.observations)
            .pop_front()
            .unwrap_or_else(|| Err("blocked by cross-origin policy".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::PaymentStatus;

    #[tokio::test]
    async fn test_scripted_verifier_then_fallback() {
        let verifier = ScriptedVerifier::new(
            [ScriptedAnswer::Fail("timeout".to_string())],
            ScriptedAnswer::Respond(VerificationResponse::settled(PaymentStatus::Success)),
        );

        assert!(matches!(
            verifier.verify("P1").await,
            Err(PaymentError::VerificationError(_))
        ));
        let response = verifier.verify("P1").await.unwrap();
        assert_eq!(response.status(), Some(PaymentStatus::Success));
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_prompt_records_reasons() {
        let prompt = ScriptedPrompt::new([PromptOutcome::Confirmed], Some(PromptOutcome::Declined));
        assert_eq!(prompt.ask(PromptReason::LongIdle).await, PromptOutcome::Confirmed);
        assert_eq!(prompt.ask(PromptReason::ReturnedToTab).await, PromptOutcome::Declined);
        assert_eq!(
            prompt.asked(),
            vec![PromptReason::LongIdle, PromptReason::ReturnedToTab]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_prompt_answers_after_think_time() {
        let prompt = ScriptedPrompt::answering_after(PromptOutcome::Confirmed, Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        assert_eq!(prompt.ask(PromptReason::ReturnedToTab).await, PromptOutcome::Confirmed);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn test_probe_degrades_to_blocked() {
        let probe = ScriptedProbe::new([Ok("https://pay.example/step-1".to_string())]);
        assert_eq!(probe.location().unwrap(), "https://pay.example/step-1");
        assert!(probe.location().is_err());
        assert_eq!(probe.remaining(), 0);
    }
}
