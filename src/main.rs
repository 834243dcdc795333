use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use parley::app::run_chat;
use parley::audio::capture::list_devices;
use parley::audio::output::list_output_devices;
use parley::cli::{Cli, Commands, ConfigAction, KeyAction};
use parley::config::Config;
use parley::credential::{CredentialStore, EnvOverride, FileCredentialStore, mask_key};
use parley::defaults;
use parley::telemetry::init_tracing;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet, cli.log_file.as_deref())
        .context("Failed to initialize logging")?;
    let color = !cli.no_color && std::io::stdout().is_terminal();

    match cli.command {
        None | Some(Commands::Chat) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(device) = cli.device {
                config.audio.input_device = Some(device);
            }
            if let Some(device) = cli.output_device {
                config.audio.output_device = Some(device);
            }
            if let Some(model) = cli.model {
                config.session.model = model;
            }
            if let Some(voice) = cli.voice {
                config.session.voice = voice;
            }
            config.validate()?;
            if rustls::crypto::ring::default_provider()
                .install_default()
                .is_err()
            {
                tracing::debug!("TLS crypto provider already installed");
            }
            tracing::info!(
                version = %parley::version_string(),
                model = %config.session.model,
                "starting chat"
            );

            if color {
                println!("{}", "parley: Enter toggles the microphone, q quits".dimmed());
            } else {
                println!("parley: Enter toggles the microphone, q quits");
            }
            run_chat(config, color).await?;
        }
        Some(Commands::Key { action }) => {
            handle_key_command(action)?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "parley",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn config_path(custom_path: Option<&Path>) -> Result<PathBuf> {
    match custom_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Config::default_path()?),
    }
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // An explicit path must exist
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path()?)?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

fn credential_store() -> Result<EnvOverride<FileCredentialStore>> {
    Ok(EnvOverride::new(FileCredentialStore::new(
        FileCredentialStore::default_path()?,
    )))
}

fn read_key_from_stdin() -> Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        print!("Gemini API key: ");
        std::io::stdout().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn handle_key_command(action: KeyAction) -> Result<()> {
    let mut store = credential_store()?;
    match action {
        KeyAction::Set { key } => {
            let key = match key {
                Some(key) => key,
                None => read_key_from_stdin()?,
            };
            store.set(&key)?;
            println!("{}", "API key saved".green());
            if store.is_env_supplied() {
                println!(
                    "Note: {} is set and takes precedence over the stored key",
                    defaults::CREDENTIAL_ENV
                );
            }
        }
        KeyAction::Show => match store.get() {
            Some(key) => {
                let source = if store.is_env_supplied() {
                    defaults::CREDENTIAL_ENV.to_string()
                } else {
                    FileCredentialStore::default_path()?.display().to_string()
                };
                println!("{}  {}", mask_key(&key), format!("({})", source).dimmed());
            }
            None => {
                eprintln!("No API key configured. Run `parley key set`.");
                std::process::exit(1);
            }
        },
        KeyAction::Clear => {
            store.remove()?;
            println!("Stored API key removed");
        }
    }
    Ok(())
}

/// List available audio input and output devices.
fn list_audio_devices() -> Result<()> {
    let inputs = list_devices()?;
    let outputs = list_output_devices()?;

    if inputs.is_empty() && outputs.is_empty() {
        eprintln!("No audio devices found");
        std::process::exit(1);
    }

    println!("Input devices:");
    for (idx, device) in inputs.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    println!("Output devices:");
    for (idx, device) in outputs.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path(custom_path)?.display());
        }
    }
    Ok(())
}
