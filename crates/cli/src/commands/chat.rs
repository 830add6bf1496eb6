//! `parlance chat`: single-message or interactive conversation.

use super::{PartnerArgs, Session};
use parlance::{fixtures, render};
use parlance_agent::context::protocol::parse_reply;
use parlance_agent::{ChatPipeline, Scenario};
use parlance_config::AppConfig;
use parlance_core::error::ProviderError;
use parlance_core::message::Role;
use parlance_core::partner::LogEntry;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

pub async fn run(
    target: PartnerArgs,
    scenario: Scenario,
    message: Option<String>,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = target.load()?;
    let config = AppConfig::load()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("   ⏳ {}", render::retry_line(&event));
        }
    });

    let pipeline = ChatPipeline::from_config(&config)
        .with_observer(tx)
        .with_cancellation(cancel.clone());

    match message {
        Some(msg) => turn(&pipeline, &mut session, &scenario, &msg).await?,
        None => interactive(&pipeline, &mut session, &scenario, &cancel).await?,
    }

    if save {
        fixtures::save_partner(&session.partner_path, &session.partner)?;
        println!(
            "💾 Saved {} entries to {}",
            session.partner.log.len(),
            session.partner_path.display()
        );
    }

    Ok(())
}

async fn interactive(
    pipeline: &ChatPipeline,
    session: &mut Session,
    scenario: &Scenario,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("💬 Talking to {} ({})", session.partner.name, scenario.label());
    println!("   Type 'exit' or press Ctrl-C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = cancel.cancelled() => break,
        };
        let Some(line) = line else { break };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match turn(pipeline, session, scenario, input).await {
            Ok(()) => {}
            Err(ProviderError::Cancelled) => break,
            Err(e) => eprintln!("   ❌ {e}"),
        }
    }

    println!();
    Ok(())
}

/// One exchange. Settings are reloaded so edits apply without a restart.
async fn turn(
    pipeline: &ChatPipeline,
    session: &mut Session,
    scenario: &Scenario,
    message: &str,
) -> Result<(), ProviderError> {
    let config = AppConfig::load().map_err(|e| ProviderError::NotConfigured(e.to_string()))?;

    let reply = pipeline
        .reply(&config, &session.partner, session.sources(), scenario, message)
        .await?;

    for segment in parse_reply(&reply.content) {
        println!("{}: {}", session.partner.name, render::segment_line(&segment));
    }
    if !reply.retries.is_empty() {
        eprintln!("   (answered after {} retries)", reply.retries.len());
    }

    let log = &mut session.partner.log;
    if !log.last().is_some_and(|e| e.role == Role::User && e.content == message) {
        log.push(LogEntry::user(message));
    }
    log.push(LogEntry::assistant(reply.content));
    Ok(())
}
