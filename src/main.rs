use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colorbook::core::config::{Config, DEFAULT_CONFIG_PATH};
use colorbook::core::io::FileStore;
use colorbook::core::state::Step;
use colorbook::services::credentials::{self, CredentialGate};
use colorbook::services::outline::PAGE_COUNT;
use colorbook::services::relay::{self, RelayHandle};
use colorbook::services::session::Session;
use colorbook::services::workflow::PipelineDriver;
use colorbook::services::{document, setup};
use colorbook::ui::{self, CharacterAction, PreviewAction};
use colorbook::utils::time::{Sleeper, TokioSleeper};
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "colorbook", version, about = "Create custom coloring books for your kids")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Walk through the coloring book maker (default)
    Make,
    /// Run the provider relay as a standalone HTTP server
    Serve {
        /// Overrides `relay.bind`
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::load_or_create(&cli.config)?;

    match cli.command.unwrap_or(Command::Make) {
        Command::Make => make(config).await,
        Command::Serve { bind } => serve(config, bind).await,
    }
}

async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let addr = bind.unwrap_or(config.relay.bind);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    println!("Relay listening on http://{}", listener.local_addr()?);
    relay::serve(listener, config.relay.upstream).await?;
    Ok(())
}

/// Base URL of the relay used by the fal and Replicate transports.
/// A self-hosted relay keeps running for as long as the returned handle lives.
async fn start_relay(config: &Config) -> Result<(String, Option<RelayHandle>)> {
    if config.image.provider == "openai" {
        return Ok((String::new(), None));
    }
    if config.relay.self_host {
        let handle = relay::spawn("127.0.0.1:0", config.relay.upstream.clone())
            .await
            .context("Failed to start the local relay")?;
        return Ok((handle.url.clone(), Some(handle)));
    }

    let url = url::Url::parse(&config.relay.url)
        .with_context(|| format!("Invalid relay url: {}", config.relay.url))?;
    info!("Using relay at {}", url);
    Ok((url.as_str().trim_end_matches('/').to_string(), None))
}

async fn make(config: Config) -> Result<()> {
    config.ensure_directories()?;
    ui::banner();

    let gate = CredentialGate::new(Arc::new(FileStore::new(&config.credentials_file)));
    gate.init()
        .await
        .context("Failed to load saved credentials")?;
    let required = credentials::required_for(&config.image.provider);
    let mut session = Session::new(gate.missing(&required).await?.is_empty());

    let (relay_url, _relay) = start_relay(&config).await?;
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);

    loop {
        match session.step() {
            Step::Setup => {
                setup::run_setup(&gate, &required).await?;
                session.credentials_saved()?;
            }
            Step::Characters => match ui::choose_characters(session.characters_mut())? {
                CharacterAction::Next => {
                    if let Err(e) = session.confirm_characters() {
                        ui::show_error(&e.to_string());
                    }
                }
                CharacterAction::AddCustom => {}
                CharacterAction::ChangeKey => {
                    let kind = ui::choose_credential_to_change(&required)?;
                    gate.clear(kind).await?;
                    session.credentials_cleared()?;
                }
            },
            Step::Story => {
                if let Some(message) = session.last_error() {
                    ui::show_error(message);
                }
                let previous = session.story_idea().to_string();
                let Some(idea) = ui::ask_story_idea(&previous)? else {
                    session.back_to_characters()?;
                    continue;
                };

                let keys = gate.provider_keys().await?;
                let driver = PipelineDriver::from_config(&config, &keys, &relay_url, sleeper.clone())?;
                ui::print_cost_estimate(PAGE_COUNT, driver.provider());

                let observer = ui::ProgressObserver::new();
                // Run failures are kept on the session and shown on the next pass.
                let outcome = session.generate(&idea, &driver, &observer).await.map(|_| ());
                if let Err(e) = outcome {
                    if session.last_error().is_none() {
                        ui::show_error(&e.to_string());
                    }
                }
            }
            Step::Generating => return Err(anyhow!("Generation was interrupted")),
            Step::Preview => {
                let story = session
                    .story()
                    .ok_or_else(|| anyhow!("No story to preview"))?;
                ui::show_preview(story);

                match ui::preview_action()? {
                    PreviewAction::Save => {
                        let path = document::save(story, &config.output_folder).await?;
                        println!("Saved to {}", path.display());
                        ui::print_printing_tips();
                    }
                    PreviewAction::NewStory => session.new_story()?,
                    PreviewAction::Quit => break,
                }
            }
        }
    }

    Ok(())
}
