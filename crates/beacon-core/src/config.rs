use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BeaconError, Result};
use crate::types::Locale;

/// Top-level configuration for the Beacon application.
///
/// Loaded from `~/.beacon/config.toml` by default. Every section falls back
/// to its defaults, so a partial file is always valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub location: LocationConfig,
}

impl BeaconConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BeaconConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.assistant.system_prompt.trim().is_empty() {
            return Err(BeaconError::Config(
                "assistant.system_prompt must not be empty".to_string(),
            ));
        }
        let default_locale = Locale::new(self.assistant.default_locale.clone())?;
        for code in &self.assistant.supported_locales {
            Locale::new(code.clone())?;
        }
        if !self.assistant.supported_locales.is_empty()
            && !self
                .assistant
                .supported_locales
                .iter()
                .any(|c| c == default_locale.as_str())
        {
            return Err(BeaconError::Config(format!(
                "assistant.default_locale '{}' is not in supported_locales",
                default_locale
            )));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(BeaconError::Config(
                "backend.base_url must not be empty".to_string(),
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(BeaconError::Config(
                "backend.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let (Some(lat), Some(lon)) = (self.location.latitude, self.location.longitude) {
            crate::types::Coordinates::new(lat, lon)?;
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the conversation database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Local profile the conversation is scoped to.
    pub profile: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.beacon/data".to_string(),
            log_level: "info".to_string(),
            profile: "default".to_string(),
        }
    }
}

/// Conversation and assistant persona settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Instruction sent as the first message of every backend request.
    pub system_prompt: String,
    /// Greeting seeded into an empty session, keyed by locale code or
    /// primary language subtag.
    pub greetings: BTreeMap<String, String>,
    /// Locale used until the user picks another one.
    pub default_locale: String,
    /// Locales offered for selection. Empty means any valid code.
    pub supported_locales: Vec<String>,
    /// Hold submissions so that only one backend request runs at a time.
    pub serialize_submissions: bool,
    /// Maximum accepted length of a single user message, in characters.
    /// Zero disables the limit.
    pub max_message_chars: usize,
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an emergency assistance guide. \
Give short, calm, step-by-step instructions that keep the person safe. \
Always remind them to contact their local emergency number when life or property is at risk. \
Answer in the language the person writes in.";

impl Default for AssistantConfig {
    fn default() -> Self {
        let greetings = [
            (
                "en",
                "Hello, I'm your emergency assistant. Tell me what is happening and I'll guide you.",
            ),
            (
                "es",
                "Hola, soy tu asistente de emergencias. Cuéntame qué está pasando y te guiaré.",
            ),
            (
                "fr",
                "Bonjour, je suis votre assistant d'urgence. Dites-moi ce qui se passe et je vous guiderai.",
            ),
            (
                "pt",
                "Olá, sou o seu assistente de emergência. Diga-me o que está acontecendo e eu vou orientá-lo.",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greetings,
            default_locale: "en".to_string(),
            supported_locales: vec![
                "en".to_string(),
                "es".to_string(),
                "fr".to_string(),
                "pt".to_string(),
            ],
            serialize_submissions: false,
            max_message_chars: 4000,
        }
    }
}

impl AssistantConfig {
    /// Greeting for `locale`: exact code first, then the primary language,
    /// then the default locale, then English.
    pub fn greeting_for(&self, locale: &Locale) -> String {
        self.greetings
            .get(locale.as_str())
            .or_else(|| self.greetings.get(&locale.language()))
            .or_else(|| self.greetings.get(&self.default_locale))
            .or_else(|| self.greetings.get("en"))
            .cloned()
            .unwrap_or_else(|| "Hello, how can I help you?".to_string())
    }

    /// Whether `locale` may be selected.
    pub fn supports(&self, locale: &Locale) -> bool {
        self.supported_locales.is_empty()
            || self
                .supported_locales
                .iter()
                .any(|c| c == locale.as_str() || *c == locale.language())
    }
}

/// Dialogue backend connection settings (OpenAI-compatible chat API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Sampling temperature, if the backend should not use its default.
    pub temperature: Option<f32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.1".to_string(),
            api_key_env: "BEACON_API_KEY".to_string(),
            timeout_secs: 60,
            temperature: Some(0.3),
        }
    }
}

/// Platform speech commands. Empty means the capability is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speech-to-text command; `{lang}` is replaced by the locale. The
    /// command prints one transcript on stdout and exits.
    pub stt_command: Vec<String>,
    /// Text-to-speech command; `{lang}` is replaced by the locale and the
    /// text is written to its stdin.
    pub tts_command: Vec<String>,
    /// Upper bound for a single recognition attempt, in seconds.
    pub recognition_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_command: Vec::new(),
            tts_command: Vec::new(),
            recognition_timeout_secs: 15,
        }
    }
}

/// Geolocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Whether the user allows location sharing at all.
    pub enabled: bool,
    /// Fixed latitude reported by the location bridge.
    pub latitude: Option<f64>,
    /// Fixed longitude reported by the location bridge.
    pub longitude: Option<f64>,
    /// Upper bound for a single position lookup, in seconds.
    pub timeout_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latitude: None,
            longitude: None,
            timeout_secs: 10,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_temp_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = BeaconConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.profile, "default");
        assert!(!config.assistant.serialize_submissions);
        assert!(config.speech.stt_command.is_empty());
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
[general]
data_dir = "/tmp/beacon"
log_level = "debug"
profile = "kitchen-tablet"

[assistant]
system_prompt = "Be brief."
default_locale = "es"
supported_locales = ["en", "es"]
serialize_submissions = true
max_message_chars = 500

[assistant.greetings]
en = "Hi"
es = "Hola"

[backend]
base_url = "https://example.test/v1"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
timeout_secs = 20

[speech]
stt_command = ["whisper-listen", "--lang", "{lang}"]
tts_command = ["espeak-ng", "-v", "{lang}"]

[location]
enabled = true
latitude = 48.8566
longitude = 2.3522
"#;
        let file = create_temp_config(content);
        let config = BeaconConfig::load(file.path()).unwrap();
        assert_eq!(config.general.profile, "kitchen-tablet");
        assert_eq!(config.assistant.system_prompt, "Be brief.");
        assert!(config.assistant.serialize_submissions);
        assert_eq!(config.assistant.max_message_chars, 500);
        assert_eq!(config.assistant.greetings.get("es").unwrap(), "Hola");
        assert_eq!(config.backend.model, "gpt-4o-mini");
        assert_eq!(config.backend.timeout_secs, 20);
        assert_eq!(config.speech.stt_command.len(), 3);
        assert_eq!(config.location.latitude, Some(48.8566));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"
"#;
        let file = create_temp_config(content);
        let config = BeaconConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.assistant.default_locale, "en");
        assert_eq!(config.backend.timeout_secs, 60);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = BeaconConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.beacon/data");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = create_temp_config("[assistant]\nsystem_prompt = \"   \"\n");
        assert!(matches!(
            BeaconConfig::load(file.path()),
            Err(BeaconError::Config(_))
        ));

        let file = create_temp_config("[backend]\ntimeout_secs = 0\n");
        assert!(BeaconConfig::load(file.path()).is_err());

        let file = create_temp_config("[location]\nlatitude = 120.0\nlongitude = 0.0\n");
        assert!(matches!(
            BeaconConfig::load(file.path()),
            Err(BeaconError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn test_zero_message_limit_is_unlimited() {
        let file = create_temp_config("[assistant]\nmax_message_chars = 0\n");
        let config = BeaconConfig::load(file.path()).unwrap();
        assert_eq!(config.assistant.max_message_chars, 0);
    }

    #[test]
    fn test_default_locale_must_be_supported() {
        let mut config = BeaconConfig::default();
        config.assistant.default_locale = "de".to_string();
        assert!(config.validate().is_err());

        config.assistant.supported_locales.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = BeaconConfig::default();
        config.save(&path).unwrap();

        let reloaded = BeaconConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.data_dir, config.general.data_dir);
        assert_eq!(reloaded.assistant.greetings, config.assistant.greetings);
        assert_eq!(reloaded.backend.model, config.backend.model);
    }

    #[test]
    fn test_greeting_fallback_chain() {
        let config = AssistantConfig::default();
        let es = Locale::new("es").unwrap();
        assert!(config.greeting_for(&es).starts_with("Hola"));

        let pt_br = Locale::new("pt-BR").unwrap();
        assert!(config.greeting_for(&pt_br).starts_with("Olá"));

        let unknown = Locale::new("sw").unwrap();
        assert!(config.greeting_for(&unknown).starts_with("Hello"));

        let empty = AssistantConfig {
            greetings: BTreeMap::new(),
            ..AssistantConfig::default()
        };
        assert_eq!(empty.greeting_for(&es), "Hello, how can I help you?");
    }

    #[test]
    fn test_supports_locale() {
        let config = AssistantConfig::default();
        assert!(config.supports(&Locale::new("en").unwrap()));
        assert!(config.supports(&Locale::new("pt-BR").unwrap()));
        assert!(!config.supports(&Locale::new("de").unwrap()));

        let open = AssistantConfig {
            supported_locales: vec![],
            ..AssistantConfig::default()
        };
        assert!(open.supports(&Locale::new("de").unwrap()));
    }
}
