#![allow(dead_code)]

use payrecon::application::page::{PagePorts, PaymentPage};
use payrecon::config::EngineConfig;
use payrecon::domain::ports::{FrameProbeRef, VerificationResponse};
use payrecon::domain::status::{PaymentContext, PaymentStatus};
use payrecon::domain::tally::FrameRect;
use payrecon::infrastructure::in_memory::{
    RecordingChannel, RecordingNavigator, ScriptedAnswer, ScriptedPrompt, ScriptedVerifier,
};
use std::sync::Arc;

pub const TRUSTED_ORIGIN: &str = "https://pay.example";
pub const EVIL_ORIGIN: &str = "https://evil.example";

pub struct Harness {
    pub page: PaymentPage,
    pub verifier: Arc<ScriptedVerifier>,
    pub navigator: Arc<RecordingNavigator>,
    pub channel: Arc<RecordingChannel>,
    pub prompt: Arc<ScriptedPrompt>,
}

pub fn context() -> PaymentContext {
    PaymentContext::new("P1", "https://pay.example/P1")
}

pub fn frame() -> FrameRect {
    FrameRect::new(0.0, 0.0, 800.0, 600.0)
}

pub fn status_message(status: &str) -> String {
    format!(r#"{{"type":"PAYMENT_STATUS","status":"{status}"}}"#)
}

pub const STARTED_MESSAGE: &str = r#"{"type":"PAYMENT_STARTED"}"#;

pub fn settled(status: PaymentStatus) -> ScriptedAnswer {
    ScriptedAnswer::Respond(VerificationResponse::settled(status))
}

pub fn mount(config: EngineConfig, verifier: ScriptedVerifier, prompt: ScriptedPrompt) -> Harness {
    mount_with_probe(config, verifier, prompt, None)
}

pub fn mount_with_probe(
    config: EngineConfig,
    verifier: ScriptedVerifier,
    prompt: ScriptedPrompt,
    probe: Option<FrameProbeRef>,
) -> Harness {
    let verifier = Arc::new(verifier);
    let navigator = Arc::new(RecordingNavigator::new());
    let channel = Arc::new(RecordingChannel::new());
    let prompt = Arc::new(prompt);

    let page = PaymentPage::mount(
        context(),
        frame(),
        config,
        PagePorts {
            verifier: verifier.clone(),
            navigator: navigator.clone(),
            channel: channel.clone(),
            prompt: prompt.clone(),
            probe,
        },
    )
    .expect("valid payment context");

    Harness {
        page,
        verifier,
        navigator,
        channel,
        prompt,
    }
}

/// Page with a backend that never settles and a user who never answers.
pub fn quiet_page() -> Harness {
    mount(
        EngineConfig::default(),
        ScriptedVerifier::always(settled(PaymentStatus::Pending)),
        ScriptedPrompt::never_answers(),
    )
}
