//! `parlance models`: list what the endpoint offers.

use parlance::fixtures;
use parlance_agent::ChatPipeline;
use parlance_config::AppConfig;
use std::path::PathBuf;

pub async fn run(partner: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let partner = partner.as_deref().map(fixtures::load_partner).transpose()?;

    let pipeline = ChatPipeline::from_config(&config);
    let models = pipeline.list_models(&config, partner.as_ref()).await?;

    if models.is_empty() {
        println!("   ⚠️  The endpoint returned no models");
        return Ok(());
    }

    println!("📋 {} models available:", models.len());
    let selected = config.selected_model.as_deref();
    for model in &models {
        let marker = if Some(model.as_str()) == selected { "✅" } else { "  " };
        println!("   {marker} {model}");
    }

    Ok(())
}
