use crate::defaults;
use crate::error::{ParleyError, Result};
use crate::remote::client::SessionSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub session: SessionConfig,
}

/// Audio device selection. `None` means the preferred or system default device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AudioConfig {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

/// Remote session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub model: String,
    pub voice: String,
    pub persona: String,
    pub endpoint: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            persona: defaults::DEFAULT_PERSONA.to_string(),
            endpoint: defaults::DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ParleyError::ConfigFileNotFound {
                path: path.display().to_string(),
            },
            _ => ParleyError::Io(e),
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(ParleyError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(ParleyError::Config(e)) => Err(ParleyError::ConfigParse {
                message: format!("{}: {}", path.display(), e),
            }),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PARLEY_MODEL → session.model
    /// - PARLEY_VOICE → session.voice
    /// - PARLEY_INPUT_DEVICE → audio.input_device
    /// - PARLEY_OUTPUT_DEVICE → audio.output_device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("PARLEY_MODEL")
            && !model.is_empty()
        {
            self.session.model = model;
        }

        if let Ok(voice) = std::env::var("PARLEY_VOICE")
            && !voice.is_empty()
        {
            self.session.voice = voice;
        }

        if let Ok(device) = std::env::var("PARLEY_INPUT_DEVICE")
            && !device.is_empty()
        {
            self.audio.input_device = Some(device);
        }

        if let Ok(device) = std::env::var("PARLEY_OUTPUT_DEVICE")
            && !device.is_empty()
        {
            self.audio.output_device = Some(device);
        }

        self
    }

    /// Reject values that would only fail later, mid-session.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("session.model", &self.session.model),
            ("session.voice", &self.session.voice),
            ("session.persona", &self.session.persona),
            ("session.endpoint", &self.session.endpoint),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ParleyError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        let endpoint = &self.session.endpoint;
        if !(endpoint.starts_with("wss://") || endpoint.starts_with("ws://")) {
            return Err(ParleyError::ConfigInvalidValue {
                key: "session.endpoint".to_string(),
                message: format!("expected a ws:// or wss:// URL, got {}", endpoint),
            });
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            model: self.session.model.clone(),
            voice: self.session.voice.clone(),
            persona: self.session.persona.clone(),
            endpoint: self.session.endpoint.clone(),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ParleyError::Other(e.to_string()))
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/parley/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(defaults::APP_DIR).join("config.toml"))
            .ok_or_else(|| ParleyError::Other("Could not determine config directory".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_parley_env() {
        remove_env("PARLEY_MODEL");
        remove_env("PARLEY_VOICE");
        remove_env("PARLEY_INPUT_DEVICE");
        remove_env("PARLEY_OUTPUT_DEVICE");
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.input_device, None);
        assert_eq!(config.audio.output_device, None);

        assert_eq!(config.session.model, defaults::DEFAULT_MODEL);
        assert_eq!(config.session.voice, "Zephyr");
        assert!(config.session.endpoint.starts_with("wss://"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_config(
            r#"
            [audio]
            input_device = "pipewire"
            output_device = "USB Headset"

            [session]
            model = "gemini-live-2.5-flash"
            voice = "Puck"
            persona = "Reply in French."
            endpoint = "ws://127.0.0.1:9000/live"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.input_device, Some("pipewire".to_string()));
        assert_eq!(config.audio.output_device, Some("USB Headset".to_string()));
        assert_eq!(config.session.model, "gemini-live-2.5-flash");
        assert_eq!(config.session.voice, "Puck");
        assert_eq!(config.session.persona, "Reply in French.");
        assert_eq!(config.session.endpoint, "ws://127.0.0.1:9000/live");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_config(
            r#"
            [session]
            voice = "Kore"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.session.voice, "Kore");
        assert_eq!(config.session.model, defaults::DEFAULT_MODEL);
        assert_eq!(config.session.persona, defaults::DEFAULT_PERSONA);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_session_settings_mirror_config() {
        let mut config = Config::default();
        config.session.voice = "Charon".to_string();
        let settings = config.session_settings();
        assert_eq!(settings.voice, "Charon");
        assert_eq!(settings.model, config.session.model);
        assert_eq!(settings.endpoint, config.session.endpoint);
    }

    #[test]
    fn test_env_override_model_and_voice() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parley_env();

        set_env("PARLEY_MODEL", "gemini-live-test");
        set_env("PARLEY_VOICE", "Aoede");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.session.model, "gemini-live-test");
        assert_eq!(config.session.voice, "Aoede");
        assert_eq!(config.audio.input_device, None); // Not overridden

        clear_parley_env();
    }

    #[test]
    fn test_env_override_devices() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parley_env();

        set_env("PARLEY_INPUT_DEVICE", "hw:1,0");
        set_env("PARLEY_OUTPUT_DEVICE", "pulse");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.input_device, Some("hw:1,0".to_string()));
        assert_eq!(config.audio.output_device, Some("pulse".to_string()));

        clear_parley_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parley_env();

        set_env("PARLEY_MODEL", "");
        let config = Config::default().with_env_overrides();

        // Empty string should not override default
        assert_eq!(config.session.model, defaults::DEFAULT_MODEL);

        clear_parley_env();
    }

    #[test]
    fn test_validate_rejects_empty_voice() {
        let mut config = Config::default();
        config.session.voice = "  ".to_string();

        match config.validate() {
            Err(ParleyError::ConfigInvalidValue { key, .. }) => assert_eq!(key, "session.voice"),
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_http_endpoint() {
        let mut config = Config::default();
        config.session.endpoint = "https://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ParleyError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_config(
            r#"
            [audio
            input_device = "broken
        "#,
        );

        assert!(matches!(
            Config::load(temp_file.path()),
            Err(ParleyError::Config(_))
        ));
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path().unwrap();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("parley"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("missing.toml"));

        assert!(matches!(
            result,
            Err(ParleyError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_or_default_reports_invalid_toml() {
        let temp_file = write_config("[session\nmodel = 3");

        assert!(matches!(
            Config::load_or_default(temp_file.path()),
            Err(ParleyError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = Config::default();
        config.audio.input_device = Some("pipewire".to_string());

        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
