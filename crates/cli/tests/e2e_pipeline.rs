//! End-to-end tests: fixture files through composition, the resilient
//! executor and reply rendering, against a scripted transport.

use parlance::fixtures::{self, Library};
use parlance::render;
use parlance_agent::context::protocol::{parse_reply, SegmentBody, Tag};
use parlance_agent::{ChatPipeline, Scenario};
use parlance_config::AppConfig;
use parlance_core::error::ProviderError;
use parlance_core::message::Role;
use parlance_core::partner::{HostChat, LogEntry, Partner};
use parlance_providers::transport::TransportError;
use parlance_providers::{CooldownRegistry, HttpResponse, ResilientExecutor, ScriptedTransport};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────────

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

struct Loaded {
    partner: Partner,
    library: Library,
    host_chat: Vec<String>,
}

fn load() -> Loaded {
    Loaded {
        partner: fixtures::load_partner(&fixture("mira.json")).unwrap(),
        library: fixtures::load_library(Some(&fixture("library.json"))).unwrap(),
        host_chat: fixtures::load_host_chat(Some(&fixture("host_chat.json")))
            .unwrap()
            .unwrap(),
    }
}

fn config() -> AppConfig {
    let mut config = AppConfig {
        api_url: Some("https://api.example.com/v1".into()),
        api_key: Some("sk-test".into()),
        selected_model: Some("deepseek-chat".into()),
        ..AppConfig::default()
    };
    config.prompt.host_chat.enabled = true;
    config.prompt.host_chat.tags = vec!["status".into()];
    config
}

fn completion(content: &str) -> HttpResponse {
    let body = serde_json::json!({
        "model": "deepseek-chat",
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 120, "completion_tokens": 12, "total_tokens": 132 }
    });
    HttpResponse::new(200, body.to_string())
}

fn pipeline(
    script: Vec<Result<HttpResponse, TransportError>>,
) -> (ChatPipeline, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(script));
    let executor = ResilientExecutor::new(transport.clone(), Arc::new(CooldownRegistry::default()));
    (ChatPipeline::new(Arc::new(executor)), transport)
}

// ── E2E: Composition from fixtures ───────────────────────────────────────

#[test]
fn e2e_fixture_prompt_has_every_section() {
    let loaded = load();
    let host: &dyn HostChat = &loaded.host_chat;
    let composed = ChatPipeline::compose(
        &config(),
        &loaded.partner,
        loaded.library.sources(Some(host)),
        &Scenario::Chat,
        "just got home",
    );

    let system = composed.system_prompt();
    assert!(system.contains("[Recent Events]\nAlex just finished a double shift"));
    assert!(system.contains("[About the User]\nAlex: Works night shifts"));
    assert!(system.contains("[Knowledge about Mira]\n- The cat: Mira's cat is called Pepper."));
    assert!(system.contains("[World Knowledge]\n- Town: The town is Lumen"));
    assert!(system.contains("[Stickers]\nYou may send only these stickers, by exact name: wave, sigh"));
    // The partner turned music off.
    assert!(!system.contains("[music:"));

    // Marker entry excluded; both sides of it kept.
    assert_eq!(composed.window_len, 4);
    assert_eq!(composed.messages.len(), 6);
    assert!(composed.messages.iter().all(|m| !m.content.starts_with("[[summary]]")));
    assert_eq!(composed.messages[5].role, Role::User);
    assert_eq!(composed.messages[5].content, "just got home");
}

#[test]
fn e2e_resubmitted_turn_is_not_duplicated() {
    let mut loaded = load();
    loaded.partner.log.push(LogEntry::user("just got home"));

    let composed = ChatPipeline::compose(
        &config(),
        &loaded.partner,
        loaded.library.sources(None),
        &Scenario::Chat,
        "just got home",
    );

    assert!(!composed.user_appended);
    let users = composed
        .messages
        .iter()
        .filter(|m| m.content == "just got home")
        .count();
    assert_eq!(users, 1);
}

// ── E2E: Reply through the executor ──────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_rate_limited_then_rendered() {
    let (pipeline, transport) = pipeline(vec![
        Ok(HttpResponse::new(429, r#"{"error":{"message":"Rate limit reached"}}"#)
            .with_header("retry-after", "2")),
        Ok(completion("welcome home!|||[sticker:wave]|||[quote:just got home]sit down, I'll call you")),
    ]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = pipeline.with_observer(tx);
    let loaded = load();

    let reply = pipeline
        .reply(&config(), &loaded.partner, loaded.library.sources(None), &Scenario::Chat, "just got home")
        .await
        .expect("reply should succeed after one retry");

    assert_eq!(transport.calls(), 2);
    assert_eq!(reply.retries.len(), 1);
    assert!(reply.retries[0].delay_ms >= 2000);
    assert_eq!(reply.usage.as_ref().map(|u| u.total_tokens), Some(132));

    let event = rx.try_recv().unwrap();
    assert!(render::retry_line(&event).ends_with("(HTTP 429)"));

    let segments = parse_reply(&reply.content);
    assert_eq!(segments.len(), 3);
    assert_eq!(
        segments[1].body,
        SegmentBody::Tag(Tag::Sticker { name: "wave".into() })
    );
    assert_eq!(segments[2].quote.as_deref(), Some("just got home"));
    assert_eq!(
        render::segment_line(&segments[2]),
        "> just got home\nsit down, I'll call you"
    );
}

#[tokio::test(start_paused = true)]
async fn e2e_exhausted_retries_surface_readable_error() {
    let busy = || {
        Ok(HttpResponse::new(503, r#"{"error":{"message":"Service busy"}}"#)
            .with_header("x-request-id", "req-42"))
    };
    let (pipeline, transport) = pipeline(vec![busy(), busy(), busy(), busy()]);
    let loaded = load();

    let err = pipeline
        .reply(&config(), &loaded.partner, loaded.library.sources(None), &Scenario::Chat, "hello?")
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 4);
    assert_eq!(err.status_code(), Some(503));
    let text = err.to_string();
    assert!(text.contains("HTTP 503, after 3 retries"));
    assert!(text.contains("Service busy"));
    assert!(text.contains("[request id: req-42]"));
}

#[tokio::test]
async fn e2e_call_scenario_uses_partner_endpoint() {
    let (pipeline, transport) = pipeline(vec![Ok(completion("hey, you picked up"))]);
    let mut loaded = load();
    loaded.partner.custom_api = Some(parlance_core::partner::CustomApi {
        enabled: true,
        api_url: Some("https://relay.example.net/v1".into()),
        api_key: Some("sk-partner".into()),
        model: None,
    });

    let scenario = Scenario::VoiceCall {
        initiator: parlance_agent::CallInitiator::Partner,
    };
    pipeline
        .reply(&config(), &loaded.partner, loaded.library.sources(None), &scenario, "hello?")
        .await
        .unwrap();

    let sent = &transport.requests()[0];
    assert_eq!(sent.url, "https://relay.example.net/v1/chat/completions");
    let body = sent.body.as_ref().unwrap();
    assert_eq!(body["model"], "deepseek-chat");
    let system = body["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("[Voice Call]\nMira called the user"));
    assert!(!system.contains("[Stickers]"));
}

#[tokio::test]
async fn e2e_unconfigured_partner_never_hits_network() {
    let (pipeline, transport) = pipeline(vec![]);
    let loaded = load();

    let err = pipeline
        .reply(&AppConfig::default(), &loaded.partner, loaded.library.sources(None), &Scenario::Chat, "hi")
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::NotConfigured(_)));
    assert_eq!(transport.calls(), 0);
}

// ── E2E: Saving the log ──────────────────────────────────────────────────

#[test]
fn e2e_saved_partner_round_trips_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mira.json");
    let mut partner = load().partner;
    partner.log.push(LogEntry::user("night!"));

    fixtures::save_partner(&path, &partner).unwrap();
    let reloaded = fixtures::load_partner(&path).unwrap();

    assert_eq!(reloaded.log.len(), partner.log.len());
    assert!(reloaded.log[2].summary_marker);
    assert_eq!(reloaded.overrides.music, Some(false));
}
