//! Configuration management
//!
//! Model routing, gateway limits, planner behaviour and storage location,
//! persisted as TOML in the platform config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::orchestrator::router::Purpose;

pub const DEFAULT_MAX_TOKENS: u32 = 1500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// OpenRouter API settings
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    /// Model assignments per purpose
    #[serde(default)]
    pub models: ModelsConfig,
    /// Limits applied to every model call
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Model assignments for the four call purposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Weakness analysis, grading, quiz error analysis
    #[serde(default = "default_analyzer_model")]
    pub analyzer: String,
    /// Subtopic maps, quizzes, practice problems
    #[serde(default = "default_generator_model")]
    pub generator: String,
    /// Lessons, curriculum design, adaptive decisions
    #[serde(default = "default_tutor_model")]
    pub tutor: String,
    #[serde(default = "default_motivator_model")]
    pub motivator: String,
}

fn default_analyzer_model() -> String {
    "google/gemini-2.0-flash-exp".to_string()
}

fn default_generator_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_tutor_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

fn default_motivator_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            analyzer: default_analyzer_model(),
            generator: default_generator_model(),
            tutor: default_tutor_model(),
            motivator: default_motivator_model(),
        }
    }
}

impl ModelsConfig {
    /// Get model for a purpose name
    pub fn get(&self, role: &str) -> Option<&str> {
        let purpose: Purpose = role.parse().ok()?;
        Some(match purpose {
            Purpose::Analysis => &self.analyzer,
            Purpose::Generation => &self.generator,
            Purpose::Tutoring => &self.tutor,
            Purpose::Motivation => &self.motivator,
        })
    }

    /// Set model for a purpose name
    pub fn set(&mut self, role: &str, model: String) -> bool {
        let Ok(purpose) = role.parse::<Purpose>() else {
            return false;
        };
        match purpose {
            Purpose::Analysis => self.analyzer = model,
            Purpose::Generation => self.generator = model,
            Purpose::Tutoring => self.tutor = model,
            Purpose::Motivation => self.motivator = model,
        }
        true
    }

    /// List all configurable purposes
    pub fn roles() -> &'static [&'static str] {
        &["analyzer", "generator", "tutor", "motivator"]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_base_url() -> String {
    crate::agent::llm::OPENROUTER_BASE_URL.to_string()
}

fn default_referer() -> String {
    "https://github.com/tutor-agent".to_string()
}

fn default_title() -> String {
    "Tutor Agent".to_string()
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            referer: default_referer(),
            title: default_title(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-call timeout; an expired call is reported as a gateway failure
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Run draft/optimize/validate on the first pass too, seeded with a
    /// weakness analysis derived from prior mastery instead of a model call
    #[serde(default)]
    pub full_plan_on_first_pass: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database; defaults to `<data_dir>/progress.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Resolved SQLite database path
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("progress.db")),
        }
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "tutor-agent", "tutor-agent")
        .context("Failed to get project directories")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Print the current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("Model routing");
    println!("  {:<12} {}", "purpose", "model");
    for role in ModelsConfig::roles() {
        println!("  {:<12} {}", role, config.models.get(role).unwrap_or("-"));
    }
    println!();
    println!("Gateway");
    println!("  base url       {}", config.openrouter.base_url);
    println!("  max tokens     {}", config.gateway.max_tokens);
    println!("  timeout        {}s", config.gateway.request_timeout_secs);
    println!("  connect        {}s", config.gateway.connect_timeout_secs);
    println!();
    println!("Planner");
    println!("  full plan on first pass: {}", config.planner.full_plan_on_first_pass);
    println!();
    println!("Storage");
    println!("  database       {}", config.database_path()?.display());
    println!();
    println!("Config file: {}", config_path()?.display());
    Ok(())
}

/// Set API key
pub fn set_api_key(key: &str) -> Result<()> {
    crate::security::keyring::set_api_key(key)?;
    println!("API key stored securely.");
    Ok(())
}

/// Change the model serving one purpose and persist it
pub fn set_model(config: &mut Config, role: &str, model: &str) -> Result<()> {
    if !config.models.set(role, model.to_string()) {
        anyhow::bail!(
            "Unknown purpose '{}'. Available: {}",
            role,
            ModelsConfig::roles().join(", ")
        );
    }
    config.save()?;
    println!("Model for '{}' set to {}", role, model);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.gateway.max_tokens, 1500);
        assert_eq!(config.gateway.request_timeout_secs, 120);
        assert_eq!(config.gateway.connect_timeout_secs, 10);
        assert!(!config.planner.full_plan_on_first_pass);
        assert_eq!(config.models.analyzer, "google/gemini-2.0-flash-exp");
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [models]
            tutor = "openai/gpt-4.1"

            [planner]
            full_plan_on_first_pass = true

            [gateway]
            connect_timeout_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.models.tutor, "openai/gpt-4.1");
        assert_eq!(config.models.generator, "openai/gpt-4o-mini");
        assert!(config.planner.full_plan_on_first_pass);
        assert_eq!(config.gateway.connect_timeout_secs, 3);
        assert_eq!(config.gateway.request_timeout_secs, 120);
    }

    #[test]
    fn test_models_get_set_by_purpose_name() {
        let mut models = ModelsConfig::default();
        assert_eq!(models.get("generator"), Some("openai/gpt-4o-mini"));
        assert_eq!(models.get("analysis"), Some("google/gemini-2.0-flash-exp"));
        assert!(models.set("MOTIVATOR", "x/y".to_string()));
        assert_eq!(models.motivator, "x/y");
        assert!(!models.set("vision", "x/z".to_string()));
        assert_eq!(models.get("vision"), None);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.gateway.request_timeout_secs = 30;
        config.storage.database_path = Some(dir.path().join("p.db"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.database_path().unwrap(), dir.path().join("p.db"));
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
    }
}
