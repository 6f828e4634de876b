use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use payrecon::application::page::{PagePorts, PaymentPage};
use payrecon::config::EngineConfig;
use payrecon::domain::message::OutboundMessage;
use payrecon::domain::ports::{PromptOutcome, VerificationResponse};
use payrecon::domain::status::{PaymentContext, PaymentStatus};
use payrecon::domain::tally::FrameRect;
use payrecon::infrastructure::in_memory::{
    RecordingChannel, RecordingNavigator, Redirect, ScriptedAnswer, ScriptedPrompt,
    ScriptedVerifier,
};
use payrecon::interfaces::csv::event_reader::{EventReader, ScriptAction};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// What the scripted backend answers to every verification call.
#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Success,
    Failed,
    Pending,
    Unavailable,
}

/// How the scripted user answers confirmation prompts.
#[derive(Clone, Copy, ValueEnum)]
enum Answer {
    Yes,
    No,
    Ignore,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Event script CSV file (at_ms,event,origin,payload)
    script: PathBuf,

    #[arg(long)]
    proposal_id: Option<String>,

    #[arg(long)]
    invoice_id: Option<String>,

    #[arg(long)]
    payment_url: Option<String>,

    /// Answer of the backend status check.
    #[arg(long, value_enum, default_value_t = Backend::Pending)]
    backend: Backend,

    /// Answer to confirmation prompts.
    #[arg(long, value_enum, default_value_t = Answer::Ignore)]
    answer: Answer,

    /// Time to keep the page mounted after the last step. Defaults to the redirect delay
    /// plus half a second.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// JSON engine configuration (optional).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct Summary {
    proposal_id: String,
    status: PaymentStatus,
    error: Option<String>,
    redirects: Vec<Redirect>,
    outbound: Vec<OutboundMessage>,
    prompts: usize,
    verifications: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    let context = PaymentContext::from_params(
        cli.proposal_id.as_deref(),
        cli.invoice_id.as_deref(),
        cli.payment_url.as_deref(),
    )
    .into_diagnostic()?;

    let verifier = Arc::new(ScriptedVerifier::always(match cli.backend {
        Backend::Success => ScriptedAnswer::Respond(VerificationResponse::settled(PaymentStatus::Success)),
        Backend::Failed => ScriptedAnswer::Respond(VerificationResponse::settled(PaymentStatus::Failed)),
        Backend::Pending => ScriptedAnswer::Respond(VerificationResponse::settled(PaymentStatus::Pending)),
        Backend::Unavailable => ScriptedAnswer::Fail("backend unreachable".to_string()),
    }));
    let prompt = Arc::new(match cli.answer {
        Answer::Yes => ScriptedPrompt::answering(PromptOutcome::Confirmed),
        Answer::No => ScriptedPrompt::answering(PromptOutcome::Declined),
        Answer::Ignore => ScriptedPrompt::never_answers(),
    });
    let navigator = Arc::new(RecordingNavigator::new());
    let channel = Arc::new(RecordingChannel::new());

    let settle = Duration::from_millis(
        cli.settle_ms
            .unwrap_or(config.redirect_delay_ms.saturating_add(500)),
    );
    let page = PaymentPage::mount(
        context,
        FrameRect::new(0.0, 0.0, 800.0, 600.0),
        config,
        PagePorts {
            verifier: verifier.clone(),
            navigator: navigator.clone(),
            channel: channel.clone(),
            prompt: prompt.clone(),
            probe: None,
        },
    )
    .into_diagnostic()?;
    let page = Arc::new(page);

    // Replay the script. Checks and confirmations run alongside later rows.
    let file = File::open(&cli.script).into_diagnostic()?;
    let reader = EventReader::new(file);
    let mut running = JoinSet::new();
    let started = Instant::now();
    for step_result in reader.steps() {
        let step = match step_result {
            Ok(step) => step,
            Err(e) => {
                eprintln!("Error reading event: {}", e);
                continue;
            }
        };
        let action = match step.action() {
            Ok(action) => action,
            Err(e) => {
                eprintln!("Error reading event: {}", e);
                continue;
            }
        };

        tokio::time::sleep_until(started + Duration::from_millis(step.at_ms)).await;
        match action {
            ScriptAction::Message { origin, payload } => {
                page.post_message(&origin, &payload).await;
            }
            ScriptAction::Page(event) => page.dispatch(event).await,
            ScriptAction::Check => {
                let page = page.clone();
                running.spawn(async move {
                    page.check_payment().await;
                });
            }
            ScriptAction::Confirm => {
                let page = page.clone();
                running.spawn(async move { page.confirm_paid().await });
            }
        }
    }

    while running.join_next().await.is_some() {}
    tokio::time::sleep(settle).await;

    let snapshot = page.snapshot().await;
    let summary = Summary {
        proposal_id: page.context().proposal_id.clone(),
        status: snapshot.as_ref().map_or(page.status(), |s| s.status),
        error: snapshot.and_then(|s| s.error),
        redirects: navigator.redirects(),
        outbound: channel.posted(),
        prompts: prompt.asked().len(),
        verifications: verifier.calls(),
    };
    if let Ok(page) = Arc::try_unwrap(page) {
        page.unmount().await;
    }

    println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
    Ok(())
}
