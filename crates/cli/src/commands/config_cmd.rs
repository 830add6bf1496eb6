//! `parlance config`: configuration management commands.

use parlance_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    match config.resolve_endpoint(None) {
        Ok(endpoint) => {
            if endpoint.api_key.is_none() {
                warnings.push("No API key set (set PARLANCE_API_KEY or OPENAI_API_KEY)".to_string());
            }
        }
        Err(e) if e.is_missing_setting() => warnings.push(e.to_string()),
        Err(e) => return Err(e.into()),
    }
    if config.retry.max_retries == 0 {
        warnings.push("retry.max_retries is 0: rate limits will fail immediately".to_string());
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Endpoint:  {}", config.api_url.as_deref().unwrap_or("(not set)"));
    println!("   Model:     {}", config.selected_model.as_deref().unwrap_or("(not set)"));
    println!(
        "   Retries:   {} (base {}ms, max {}ms, cooldown per {:?})",
        config.retry.max_retries,
        config.retry.base_delay_ms,
        config.retry.max_delay_ms,
        config.retry.cooldown_scope
    );
    println!(
        "   History:   {} entries after a summary, {} without",
        config.history.continuity_tail, config.history.fallback_tail
    );

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);

    if let Ok(endpoint) = config.resolve_connection(None) {
        println!("# requests go to {}/chat/completions", endpoint.base_url);
    }
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let config_path = dir.join("config.toml");

    if config_path.exists() && !force {
        println!("   ⚠️  {} already exists (use --force to overwrite)", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("   ✅ Wrote {}", config_path.display());
    println!("   Set api_url, api_key and selected_model, then run `parlance config validate`.");
    Ok(())
}
