use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use waterguard_core::protocol::objects::MAX_INSTANCE;
use waterguard_core::{HubConfig, NotificationConfig, PollConfig};

/// Directory name used under the platform config directory
const APP_CONFIG_DIR: &str = "waterguard";

/// Prefix for environment overrides, e.g. `WATERGUARD_HUB__HOST`
const ENV_PREFIX: &str = "WATERGUARD_";

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Hub settings given on the command line
#[derive(Debug, Default, Clone)]
pub struct HubOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub device_id: Option<u32>,
}

impl AppConfig {
    /// Apply CLI argument overrides to the configuration
    pub fn apply_cli_overrides(&mut self, overrides: &HubOverrides) {
        if let Some(host) = &overrides.host {
            self.hub.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.hub.port = port;
        }
        if let Some(device_id) = overrides.device_id {
            self.hub.device_id = device_id;
        }
    }
}

/// Configuration manager that handles XDG-compliant paths and layered configuration
pub struct ConfigManager {
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a ConfigManager with a specific path (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn get_config_path(&self) -> PathBuf {
        self.config_path.clone()
    }

    fn default_config_path() -> PathBuf {
        #[cfg(not(target_os = "windows"))]
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
            && !xdg_config.is_empty()
        {
            return PathBuf::from(xdg_config)
                .join(APP_CONFIG_DIR)
                .join("config.toml");
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_CONFIG_DIR)
            .join("config.toml")
    }

    /// Load configuration with layered priority: ENV > File > Defaults
    ///
    /// Command-line flags are applied afterwards by the caller.
    pub fn load(&self) -> Result<AppConfig> {
        let mut figment = Figment::new();

        // Layer 1: Defaults
        figment = figment.merge(Serialized::defaults(AppConfig::default()));

        // Layer 2: Config file (if exists)
        if self.config_path.exists() {
            figment = figment.merge(Toml::file(&self.config_path));
        }

        // Layer 3: Environment variables
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().context("Failed to load configuration")
    }

    /// Get a configuration value by key (dot notation)
    pub fn get(&self, key: &str) -> Result<String> {
        let config = self.load()?;
        let value = toml::Value::try_from(&config)?;

        let mut current = &value;
        for part in key.split('.') {
            match current {
                toml::Value::Table(table) => {
                    current = table
                        .get(part)
                        .ok_or_else(|| anyhow::anyhow!("Key '{}' not found", key))?;
                }
                _ => anyhow::bail!("Invalid key path: {}", key),
            }
        }

        match current {
            toml::Value::String(s) => Ok(s.clone()),
            toml::Value::Integer(i) => Ok(i.to_string()),
            toml::Value::Boolean(b) => Ok(b.to_string()),
            _ => anyhow::bail!("Value at '{}' is not a simple type", key),
        }
    }

    /// Set a configuration value by key (dot notation) and save the file
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parsed = Self::parse_config_value(key, value)?;

        let mut config = if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            toml::from_str(&content)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("Invalid key path: {}", key))?;

        let toml::Value::Table(root) = &mut config else {
            anyhow::bail!("Configuration file is not a table");
        };
        let section = root
            .entry(section.to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        let toml::Value::Table(table) = section else {
            anyhow::bail!("Cannot set '{}': parent is not a table", key);
        };
        table.insert(field.to_string(), parsed);

        // Reject files the loader would not accept
        let _: AppConfig = config.clone().try_into()?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        fs::write(&self.config_path, toml::to_string_pretty(&config)?)
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }

    /// All effective values, flattened to dot notation
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let config = self.load()?;
        let value = toml::Value::try_from(&config)?;
        let mut items = Vec::new();
        if let toml::Value::Table(root) = value {
            for (section, inner) in root {
                if let toml::Value::Table(table) = inner {
                    for (field, value) in table {
                        let rendered = match value {
                            toml::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        items.push((format!("{section}.{field}"), rendered));
                    }
                }
            }
        }
        Ok(items)
    }

    fn parse_config_value(key: &str, value: &str) -> Result<toml::Value> {
        let parsed = match key {
            "hub.host" => {
                if value.trim().is_empty() {
                    anyhow::bail!("hub.host must not be empty");
                }
                toml::Value::String(value.to_string())
            }
            "hub.port" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Invalid port '{value}'"))?;
                toml::Value::Integer(port.into())
            }
            "hub.device_id" => {
                let id: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid device id '{value}'"))?;
                if id > MAX_INSTANCE {
                    anyhow::bail!("hub.device_id must not exceed {MAX_INSTANCE}");
                }
                toml::Value::Integer(id.into())
            }
            "poll.scan_interval" | "poll.fast_poll_interval" | "poll.wireless_poll_interval" => {
                let secs: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid interval '{value}' for {key}"))?;
                toml::Value::Integer(secs.into())
            }
            "poll.poll_wireless"
            | "notifications.enabled"
            | "notifications.persistent"
            | "notifications.mobile" => {
                let flag: bool = value
                    .parse()
                    .with_context(|| format!("Expected true or false for {key}"))?;
                toml::Value::Boolean(flag)
            }
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        };
        Ok(parsed)
    }
}

/// Load the configuration from the default location
pub fn get_config() -> Result<AppConfig> {
    ConfigManager::new().load()
}
