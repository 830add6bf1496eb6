//! `parlance prompt`: show what a turn would send.

use super::PartnerArgs;
use parlance_agent::{ChatPipeline, Scenario};
use parlance_config::AppConfig;

pub async fn run(
    target: PartnerArgs,
    scenario: Scenario,
    message: String,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = target.load()?;
    let config = AppConfig::load()?;

    let composed = ChatPipeline::compose(
        &config,
        &session.partner,
        session.sources(),
        &scenario,
        &message,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&composed)?);
        return Ok(());
    }

    for m in &composed.messages {
        println!("── {} ──", m.role.as_str());
        println!("{}", m.content);
        println!();
    }

    println!("📏 Scenario:       {}", scenario.label());
    println!("   Window entries: {}", composed.window_len);
    println!("   System tokens:  ~{}", composed.system_tokens);
    println!("   Total tokens:   ~{}", composed.total_tokens);
    if !composed.user_appended {
        println!("   (log already ends with this message; not appended again)");
    }

    Ok(())
}
