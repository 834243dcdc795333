//! Command-line interface for parley
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Realtime voice chat with Gemini Live
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Realtime voice chat with Gemini Live")]
pub struct Cli {
    /// Subcommand to execute (default: chat)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: session events, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs as JSON lines to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Microphone device name (see `parley devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Speaker device name
    #[arg(long, value_name = "DEVICE")]
    pub output_device: Option<String>,

    /// Live model (e.g., gemini-2.5-flash-native-audio-preview-09-2025)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Prebuilt voice for replies (e.g., Zephyr, Puck, Kore)
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a voice chat (Enter toggles the microphone, q quits)
    Chat,

    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// List audio input and output devices
    Devices,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// API key actions
#[derive(Subcommand, Debug)]
pub enum KeyAction {
    /// Store an API key (reads from stdin when omitted)
    Set {
        /// The Gemini API key
        key: Option<String>,
    },
    /// Show where the active key comes from (masked)
    Show,
    /// Remove the stored key
    Clear,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["parley"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.device.is_none());
        assert!(cli.output_device.is_none());
        assert!(cli.model.is_none());
        assert!(cli.voice.is_none());
        assert!(cli.log_file.is_none());
        assert!(!cli.quiet);
        assert!(!cli.no_color);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["parley", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_with_options() {
        let cli = Cli::try_parse_from([
            "parley",
            "--device",
            "pipewire",
            "--output-device",
            "USB Headset",
            "--model",
            "gemini-live-2.5-flash",
            "--voice",
            "Puck",
        ])
        .unwrap();

        assert_eq!(cli.device.as_deref(), Some("pipewire"));
        assert_eq!(cli.output_device.as_deref(), Some("USB Headset"));
        assert_eq!(cli.model.as_deref(), Some("gemini-live-2.5-flash"));
        assert_eq!(cli.voice.as_deref(), Some("Puck"));
    }

    #[test]
    fn test_parse_chat() {
        let cli = Cli::try_parse_from(["parley", "chat"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Chat)));
    }

    #[test]
    fn test_parse_devices() {
        let cli = Cli::try_parse_from(["parley", "devices"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Devices)));
    }

    #[test]
    fn test_parse_key_set_with_value() {
        let cli = Cli::try_parse_from(["parley", "key", "set", "AIzaTest"]).unwrap();
        match cli.command {
            Some(Commands::Key {
                action: KeyAction::Set { key },
            }) => assert_eq!(key.as_deref(), Some("AIzaTest")),
            other => panic!("Expected key set, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_key_set_from_stdin() {
        let cli = Cli::try_parse_from(["parley", "key", "set"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Key {
                action: KeyAction::Set { key: None }
            })
        ));
    }

    #[test]
    fn test_parse_key_show_and_clear() {
        let show = Cli::try_parse_from(["parley", "key", "show"]).unwrap();
        assert!(matches!(
            show.command,
            Some(Commands::Key {
                action: KeyAction::Show
            })
        ));
        let clear = Cli::try_parse_from(["parley", "key", "clear"]).unwrap();
        assert!(matches!(
            clear.command,
            Some(Commands::Key {
                action: KeyAction::Clear
            })
        ));
    }

    #[test]
    fn test_key_requires_subcommand() {
        let err = Cli::try_parse_from(["parley", "key"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["parley", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Path
            })
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["parley", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        ));
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from([
            "parley",
            "devices",
            "--config",
            "/tmp/config.toml",
            "--log-file",
            "/tmp/parley.jsonl",
            "-q",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/parley.jsonl")));
        assert!(cli.quiet);
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let err = Cli::try_parse_from(["parley", "invalid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["parley", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
