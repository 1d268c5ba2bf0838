use super::Config;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::Path;

impl Config {
    /// Load `~/.cogito/config.toml`, writing a default file on first run.
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let cogito_dir = home.join(".cogito");
        let config_path = cogito_dir.join("config.toml");

        if !cogito_dir.exists() {
            fs::create_dir_all(&cogito_dir).context("Failed to create .cogito directory")?;
        }

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let mut config = Self {
                config_path,
                ..Self::default()
            };
            config.save()?;
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load a config file from an explicit path; env overrides apply on top.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = path.to_path_buf();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}
