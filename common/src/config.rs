use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot find config directory")]
    NoConfigDir,
    #[error("Failed to read config file: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },
    #[error("Failed to parse TOML config: {source}")]
    TomlParse {
        #[from]
        source: toml::de::Error,
    },
}

/// Slide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub image_size: String,
    pub temperature: f32,
    /// Owner of the deck history file.
    pub user_id: String,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Upper bound handed to the budget guard. `None` means unlimited.
    pub token_budget: Option<u32>,
    pub stuck_timeout_secs: u64,
    /// Seed for fallback layouts; random when unset.
    pub layout_seed: Option<u64>,
    /// Per-request HTTP timeout. Unset means the call may take as long as it takes.
    pub request_timeout_secs: Option<u64>,
}

impl Default for SlideConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join("slide"))
            .unwrap_or_else(|| PathBuf::from(".slide"));
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1792x1024".to_string(),
            temperature: 0.7,
            user_id: "default".to_string(),
            data_dir,
            output_dir: PathBuf::from("slides"),
            token_budget: None,
            stuck_timeout_secs: 300,
            layout_seed: None,
            request_timeout_secs: None,
        }
    }
}

impl SlideConfig {
    /// Get config file path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        Ok(dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("slide"))
    }

    /// Load configuration from the user config directory, then apply the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let dir = Self::config_dir()?;
        let mut config = Self::default();
        for name in ["config.json", "config.toml"] {
            let path = dir.join(name);
            if path.exists() {
                config = Self::load_from_file(&path)?;
                tracing::info!("Loaded configuration from {}", path.display());
                break;
            }
        }
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(serde_json::from_str(&contents)?)
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(base) = var("OPENAI_BASE_URL") {
            self.api_base = base;
        }
        if let Some(model) = var("SLIDE_MODEL") {
            self.text_model = model;
        }
        if let Some(model) = var("SLIDE_IMAGE_MODEL") {
            self.image_model = model;
        }
        if let Some(dir) = var("SLIDE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(budget) = var("SLIDE_TOKEN_BUDGET") {
            match budget.parse() {
                Ok(budget) => self.token_budget = Some(budget),
                Err(e) => tracing::warn!("Ignoring SLIDE_TOKEN_BUDGET={}: {}", budget, e),
            }
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf, ConfigError> {
        let dir = Self::config_dir()?;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    /// Location of the per-user deck history document.
    pub fn archive_path(&self) -> PathBuf {
        let slug = crate::file_utils::create_slug(&self.user_id);
        let name = if slug.is_empty() { "default" } else { slug.as_str() };
        self.data_dir.join("decks").join(format!("{name}.json"))
    }

    /// Copy suitable for printing; the api key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.api_key = copy.api_key.as_ref().map(|key| {
            let chars: Vec<char> = key.chars().collect();
            let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
            format!("****{tail}")
        });
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("SLIDE_MODEL", "gpt-4o"),
            ("SLIDE_TOKEN_BUDGET", "5000"),
        ]);
        let mut config = SlideConfig::default();
        config.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.text_model, "gpt-4o");
        assert_eq!(config.token_budget, Some(5000));
        assert_eq!(config.image_model, "dall-e-3");
    }

    #[test]
    fn test_bad_budget_is_ignored() {
        let mut config = SlideConfig::default();
        config.apply_vars(|key| (key == "SLIDE_TOKEN_BUDGET").then(|| "lots".to_string()));
        assert_eq!(config.token_budget, None);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "text_model = \"gpt-4.1\"\nstuck_timeout_secs = 60\n").unwrap();

        let config = SlideConfig::load_from_file(&path).unwrap();
        assert_eq!(config.text_model, "gpt-4.1");
        assert_eq!(config.stuck_timeout_secs, 60);
        assert_eq!(config.user_id, "default");
    }

    #[test]
    fn test_redacted_masks_key() {
        let config = SlideConfig {
            api_key: Some("sk-abcdef123456".to_string()),
            ..SlideConfig::default()
        };
        assert_eq!(config.redacted().api_key.as_deref(), Some("****3456"));
    }

    #[test]
    fn test_archive_path_is_per_user() {
        let config = SlideConfig {
            user_id: "Ada Lovelace".to_string(),
            data_dir: PathBuf::from("/data"),
            ..SlideConfig::default()
        };
        assert_eq!(
            config.archive_path(),
            PathBuf::from("/data/decks/ada-lovelace.json")
        );
    }
}
