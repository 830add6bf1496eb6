//! Parlance CLI: the main entry point.
//!
//! Commands:
//! - `chat`    Talk to a partner, once or interactively
//! - `prompt`  Show the payload a turn would send, without sending it
//! - `models`  List the models an endpoint offers
//! - `config`  Show, validate or create the configuration file

use clap::{Parser, Subcommand};

mod commands;

use commands::{PartnerArgs, ScenarioArgs};

#[derive(Parser)]
#[command(
    name = "parlance",
    about = "Parlance: companion chat partners over any OpenAI-compatible API",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a partner
    Chat {
        #[command(flatten)]
        target: PartnerArgs,

        #[command(flatten)]
        scenario: ScenarioArgs,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Write the updated log back to the partner file
        #[arg(long)]
        save: bool,
    },

    /// Print the composed request for one turn
    Prompt {
        #[command(flatten)]
        target: PartnerArgs,

        #[command(flatten)]
        scenario: ScenarioArgs,

        /// The user message of the turn
        #[arg(short, long)]
        message: String,

        /// Print the messages as JSON
        #[arg(long)]
        json: bool,
    },

    /// List models offered by the configured endpoint
    Models {
        /// Use this partner's custom API, if it has one
        #[arg(short, long)]
        partner: Option<std::path::PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Check the configuration and endpoint settings
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            target,
            scenario,
            message,
            save,
        } => commands::chat::run(target, scenario.scenario(), message, save).await?,
        Commands::Prompt {
            target,
            scenario,
            message,
            json,
        } => commands::prompt::run(target, scenario.scenario(), message, json).await?,
        Commands::Models { partner } => commands::models::run(partner).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_agent::{CallInitiator, Scenario};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn chat_defaults_to_text_scenario() {
        let cli = parse(&["parlance", "chat", "--partner", "mira.json", "-m", "hi"]);
        let Commands::Chat { scenario, message, save, .. } = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(scenario.scenario(), Scenario::Chat);
        assert_eq!(message.as_deref(), Some("hi"));
        assert!(!save);
    }

    #[test]
    fn call_flags_select_call_scenario() {
        let cli = parse(&[
            "parlance", "chat", "-p", "mira.json", "--call", "video", "--partner-initiated",
        ]);
        let Commands::Chat { scenario, .. } = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(
            scenario.scenario(),
            Scenario::VideoCall {
                initiator: CallInitiator::Partner
            }
        );
    }

    #[test]
    fn song_needs_artist() {
        assert!(Cli::try_parse_from(["parlance", "chat", "-p", "m.json", "--song", "Yellow"]).is_err());

        let cli = parse(&[
            "parlance", "prompt", "-p", "m.json", "--song", "Yellow", "--artist", "Coldplay", "-m", "this part",
        ]);
        let Commands::Prompt { scenario, .. } = cli.command else {
            panic!("expected prompt");
        };
        assert_eq!(scenario.scenario().label(), "co_listening");
    }

    #[test]
    fn call_and_song_conflict() {
        let result = Cli::try_parse_from([
            "parlance", "chat", "-p", "m.json", "--call", "voice", "--song", "a", "--artist", "b",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn partner_initiated_requires_call() {
        assert!(Cli::try_parse_from(["parlance", "chat", "-p", "m.json", "--partner-initiated"]).is_err());
    }
}
